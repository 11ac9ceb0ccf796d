use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crate::error::ApiError;

/// Runs `query` on a worker thread and waits at most `timeout` for its answer.
///
/// A query that outlives the timeout keeps running; its result is discarded.
pub(crate) fn bounded<T, F>(timeout: Duration, query: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    thread::Builder::new()
        .name("domtray-query".to_string())
        .spawn(move || {
            let _ = tx.send(query());
        })
        .map_err(|err| ApiError::Failed(format!("cannot spawn query worker: {err}")))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(ApiError::TimedOut(timeout)),
        Err(RecvTimeoutError::Disconnected) => {
            Err(ApiError::Failed("query worker exited without answer".to_string()))
        }
    }
}
