//! Restart supervision for the background oracle pipeline

use futures_util::future::select_all;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, warn};

use crate::ledger::Backoff;

/// A named long-running task
pub type Worker = (&'static str, JoinHandle<()>);

/// Run the workers produced by `start`, restarting the whole set with backoff
/// as soon as any one of them ends.
///
/// Pipeline workers live for the whole process, so a clean exit is treated
/// the same as a panic: the survivors are aborted and `start` is called
/// again. Returns only if `start` produces no workers.
pub async fn supervise<F>(mut start: F, mut backoff: Backoff)
where
    F: FnMut() -> Vec<Worker>,
{
    loop {
        let (names, handles): (Vec<&'static str>, Vec<JoinHandle<()>>) =
            start().into_iter().unzip();
        if handles.is_empty() {
            warn!("no pipeline workers to supervise; stopping supervisor");
            return;
        }

        let (result, index, remaining) = select_all(handles).await;
        for handle in remaining {
            handle.abort();
        }

        let task = names.get(index).copied().unwrap_or("unknown");
        match result {
            Ok(()) => warn!(task, "oracle pipeline task exited; restarting pipeline"),
            Err(join_error) if join_error.is_panic() => {
                error!(task, "oracle pipeline task panicked; restarting pipeline")
            }
            Err(join_error) => {
                error!(task, error = %join_error, "oracle pipeline task failed; restarting pipeline")
            }
        }

        let delay = backoff.next_delay();
        warn!(
            restart_count = backoff.attempt(),
            delay_ms = delay.as_millis() as u64,
            "oracle pipeline restart backoff"
        );
        sleep(delay).await;
    }
}
