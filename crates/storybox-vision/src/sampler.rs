//! The vision sampler task.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use storybox_services::{CameraSource, VisionDescriber};

/// Prompt hint for the describe call.
pub const DESCRIBE_HINT: &str = "Precisely describe the objects in the scene and their \
     relationships in one brief sentence. Do NOT mention desk surface, wall, or background.";

const STREAM_CAPACITY: usize = 64;

/// A reconciled scene description.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisionUpdate {
    /// Start stamp of the describe request that produced this description.
    pub stamp: u64,
    /// The description text.
    pub description: String,
}

/// Handle to a running sampler task.
///
/// Dropping the handle does not stop the task; cancel the token passed to
/// [`VisionSampler::spawn`] to tear it down. After cancellation no further
/// updates are delivered, and outstanding describe calls are aborted.
pub struct VisionSampler {
    raw_tx: broadcast::Sender<VisionUpdate>,
    stable_tx: broadcast::Sender<VisionUpdate>,
    pending_rx: watch::Receiver<usize>,
}

impl VisionSampler {
    /// Start sampling. One describe call is issued per camera trigger;
    /// multiple calls may be in flight concurrently.
    pub fn spawn(
        camera: Arc<dyn CameraSource>,
        describer: Arc<dyn VisionDescriber>,
        cancel: CancellationToken,
    ) -> Self {
        let (raw_tx, _) = broadcast::channel(STREAM_CAPACITY);
        let (stable_tx, _) = broadcast::channel(STREAM_CAPACITY);
        let (pending_tx, pending_rx) = watch::channel(0usize);

        let _ = tokio::spawn(run_sampler(
            camera,
            describer,
            cancel,
            raw_tx.clone(),
            stable_tx.clone(),
            pending_tx,
        ));

        Self {
            raw_tx,
            stable_tx,
            pending_rx,
        }
    }

    /// Subscribe to every reconciled description change.
    pub fn subscribe_raw(&self) -> broadcast::Receiver<VisionUpdate> {
        self.raw_tx.subscribe()
    }

    /// Subscribe to settled descriptions (in-flight count zero, value changed).
    pub fn subscribe_stable(&self) -> broadcast::Receiver<VisionUpdate> {
        self.stable_tx.subscribe()
    }

    /// Observe the number of describe calls currently in flight.
    pub fn pending_count(&self) -> watch::Receiver<usize> {
        self.pending_rx.clone()
    }
}

#[allow(clippy::too_many_lines)]
async fn run_sampler(
    camera: Arc<dyn CameraSource>,
    describer: Arc<dyn VisionDescriber>,
    cancel: CancellationToken,
    raw_tx: broadcast::Sender<VisionUpdate>,
    stable_tx: broadcast::Sender<VisionUpdate>,
    pending_tx: watch::Sender<usize>,
) {
    // Completion messages from describe tasks: (stamp, Some(description)) on
    // success, (stamp, None) on failure. Failures carry no information but
    // must still settle the in-flight counter.
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(u64, Option<String>)>();
    let mut triggers = camera.frames().fuse();

    let mut next_stamp: u64 = 0;
    let mut in_flight: usize = 0;
    let mut best: Option<VisionUpdate> = None;
    let mut last_raw: Option<String> = None;
    let mut last_stable: Option<String> = None;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!(in_flight, "vision sampler torn down");
                break;
            }
            trigger = triggers.next(), if !triggers.is_done() => {
                let Some(()) = trigger else { continue };
                next_stamp += 1;
                let stamp = next_stamp;
                let frame = camera.capture();
                in_flight += 1;
                let _ = pending_tx.send(in_flight);

                let describer = describer.clone();
                let done_tx = done_tx.clone();
                let call_cancel = cancel.clone();
                let _ = tokio::spawn(async move {
                    let result = tokio::select! {
                        () = call_cancel.cancelled() => return,
                        result = describer.describe(&frame, DESCRIBE_HINT) => result,
                    };
                    let description = match result {
                        Ok(description) => Some(description),
                        Err(err) => {
                            warn!(stamp, error = %err, "vision describe failed");
                            None
                        }
                    };
                    let _ = done_tx.send((stamp, description));
                });
            }
            Some((stamp, description)) = done_rx.recv() => {
                in_flight -= 1;
                let _ = pending_tx.send(in_flight);

                if let Some(description) = description {
                    // Highest start stamp wins; a result that lost the race
                    // to a newer one is discarded.
                    let newer = best.as_ref().is_none_or(|b| stamp > b.stamp);
                    if newer {
                        best = Some(VisionUpdate { stamp, description });
                    } else {
                        debug!(stamp, "discarding out-of-order vision result");
                    }
                }

                if let Some(best) = &best {
                    if last_raw.as_deref() != Some(&best.description) {
                        last_raw = Some(best.description.clone());
                        let _ = raw_tx.send(best.clone());
                    }
                    if in_flight == 0 && last_stable.as_deref() != Some(&best.description) {
                        last_stable = Some(best.description.clone());
                        let _ = stable_tx.send(best.clone());
                    }
                }
            }
            else => break,
        }
    }
}
