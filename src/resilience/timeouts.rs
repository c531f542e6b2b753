//! Timeout enforcement.
//!
//! # Responsibilities
//! - Race a protected call against its deadline
//! - Cancel the call cleanly on timeout
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - A timed-out call is dropped, so a late result can never be observed,
//!   recorded, or acted on
//! - Timeout errors are distinct from the operation's own errors

use std::future::Future;
use std::time::Duration;

/// The deadline elapsed before the call completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineExceeded;

/// Await `future` for at most `deadline`.
pub async fn with_deadline<F>(deadline: Duration, future: F) -> Result<F::Output, DeadlineExceeded>
where
    F: Future,
{
    tokio::time::timeout(deadline, future)
        .await
        .map_err(|_| DeadlineExceeded)
}
