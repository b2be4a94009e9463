// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deadline combinator.
//!
//! The operation is spawned, so an elapsed deadline only disregards its
//! result — side effects of the underlying work still complete. The timer
//! is dropped as soon as the inner operation settles first.

use one_error::{ErrorKind, OneError, Result, codes};
use std::time::Duration;

/// Sentinel for "no deadline": `timeout(NEVER, op)` is a pass-through.
pub const NEVER: u64 = u64::MAX;

/// Await `op` for at most `ms` milliseconds.
///
/// `ms == 0` is rejected outright — a zero deadline is always a caller
/// bug, not a race to lose.
///
/// # Errors
///
/// `USS-TO1` for a zero deadline, `USS-TO2` when the deadline elapses,
/// otherwise whatever `op` fails with.
pub async fn timeout<T, F>(ms: u64, op: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    if ms == 0 {
        return Err(OneError::new(
            ErrorKind::Timeout,
            codes::USS_TO1,
            "timeout of 0 ms is not allowed",
        ));
    }
    if ms == NEVER {
        return op.await;
    }

    let handle = tokio::spawn(op);
    match tokio::time::timeout(Duration::from_millis(ms), handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(OneError::new(
            ErrorKind::Serializer,
            codes::USS_SER1,
            format!("timed operation failed to complete: {join_err}"),
        )),
        Err(_) => Err(OneError::new(
            ErrorKind::Timeout,
            codes::USS_TO2,
            format!("operation timed out after {ms} ms"),
        )),
    }
}
