/*
 * Runs a merge on a background thread. The thread owns a snapshot of the request and
 * talks to the owner only through a progress channel and a shared cancellation flag;
 * the tree and selection stay on the owner thread.
 */
use super::merge_writer::{
    MergeError, MergeOutcome, MergeProgressOperations, MergeRequest, MergeWriterOperations,
    Result,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/*
 * One progress message from the worker. `finished` is set on the final message of a
 * completed merge; a cancelled merge never sends it.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeProgressUpdate {
    pub index: usize,
    pub total: usize,
    pub label: String,
    pub finished: bool,
}

struct ChannelProgress {
    sender: Sender<MergeProgressUpdate>,
    cancel: Arc<AtomicBool>,
}

impl ChannelProgress {
    fn send(&self, update: MergeProgressUpdate) {
        // The owner may have dropped the job without waiting.
        let _ = self.sender.send(update);
    }
}

impl MergeProgressOperations for ChannelProgress {
    fn report(&self, index: usize, total: usize, label: &str) {
        self.send(MergeProgressUpdate {
            index,
            total,
            label: format!("Processing {label}"),
            finished: false,
        });
    }

    fn finish(&self, total: usize) {
        self.send(MergeProgressUpdate {
            index: total,
            total,
            label: "Merge complete!".to_string(),
            finished: true,
        });
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

pub struct MergeJob {
    cancel: Arc<AtomicBool>,
    progress_rx: Receiver<MergeProgressUpdate>,
    handle: Option<JoinHandle<Result<MergeOutcome>>>,
}

impl MergeJob {
    pub fn cancel(&self) {
        log::debug!("MergeJob: Cancellation requested.");
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    // Returns all progress messages received since the last call.
    pub fn drain_progress(&self) -> Vec<MergeProgressUpdate> {
        self.progress_rx.try_iter().collect()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    // Blocks until the worker is done and returns its result.
    pub fn wait(mut self) -> Result<MergeOutcome> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(MergeError::Worker("merge thread panicked".to_string()))),
            None => Err(MergeError::Worker("merge result already taken".to_string())),
        }
    }
}

/*
 * Starts `writer.merge(request)` on a new thread. An empty request is rejected before
 * any thread is spawned.
 */
pub fn spawn_merge(
    writer: Arc<dyn MergeWriterOperations>,
    request: MergeRequest,
) -> Result<MergeJob> {
    if request.files.is_empty() {
        return Err(MergeError::EmptySelection);
    }
    let cancel = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();
    let progress = ChannelProgress {
        sender: tx,
        cancel: cancel.clone(),
    };

    let handle = thread::Builder::new()
        .name("merge-worker".to_string())
        .spawn(move || writer.merge(&request, &progress))?;
    log::debug!("MergeJob: Worker thread started.");

    Ok(MergeJob {
        cancel,
        progress_rx: rx,
        handle: Some(handle),
    })
}
