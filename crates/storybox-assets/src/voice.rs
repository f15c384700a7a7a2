//! FIFO voice playback over parallel synthesis.
//!
//! Utterances play in the order they were queued regardless of how long each
//! one takes to synthesize. A failed synthesis is logged and skipped; its
//! done signal still fires so callers sequencing on it are never stuck.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use storybox_services::{AudioClip, AudioSink, SpeechSynthesizer};

struct QueuedUtterance {
    /// Resolves with the synthesized clip, or `None` when synthesis failed.
    clip_rx: oneshot::Receiver<Option<AudioClip>>,
    /// Fired exactly once when playback of this utterance ends (or is skipped).
    done_tx: oneshot::Sender<()>,
}

/// Queue-based speech player.
pub struct VoiceQueue {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    queue_tx: mpsc::UnboundedSender<QueuedUtterance>,
}

impl VoiceQueue {
    /// Start the playback task. Cancelling the token stops playback; queued
    /// utterances are dropped and their done signals resolve by closure.
    pub fn spawn(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        sink: Arc<dyn AudioSink>,
        cancel: CancellationToken,
    ) -> Self {
        let (queue_tx, mut queue_rx) = mpsc::unbounded_channel::<QueuedUtterance>();

        let _ = tokio::spawn(async move {
            loop {
                let utterance = tokio::select! {
                    () = cancel.cancelled() => break,
                    next = queue_rx.recv() => match next {
                        Some(utterance) => utterance,
                        None => break,
                    },
                };

                let clip = tokio::select! {
                    () = cancel.cancelled() => break,
                    clip = utterance.clip_rx => clip,
                };
                match clip {
                    Ok(Some(clip)) => {
                        let played = tokio::select! {
                            () = cancel.cancelled() => break,
                            played = sink.play(clip) => played,
                        };
                        if let Err(err) = played {
                            warn!(error = %err, "audio playback failed, skipping utterance");
                        }
                    }
                    Ok(None) | Err(_) => {
                        warn!("utterance skipped (synthesis failed or dropped)");
                    }
                }
                let _ = utterance.done_tx.send(());
            }
        });

        Self {
            synthesizer,
            queue_tx,
        }
    }

    /// Queue an utterance. Synthesis starts immediately and may overlap with
    /// other utterances; playback order equals enqueue order. The returned
    /// receiver resolves when this utterance finishes playing (a closed
    /// receiver means the queue was torn down).
    pub fn enqueue(&self, text: &str, voice_id: &str) -> oneshot::Receiver<()> {
        let (done_tx, done_rx) = oneshot::channel();
        let (clip_tx, clip_rx) = oneshot::channel();

        let synthesizer = self.synthesizer.clone();
        let text = text.to_owned();
        let voice_id = voice_id.to_owned();
        let _ = tokio::spawn(async move {
            let clip = match synthesizer.synthesize(&text, &voice_id).await {
                Ok(clip) => Some(clip),
                Err(err) => {
                    warn!(error = %err, voice_id, "speech synthesis failed");
                    None
                }
            };
            let _ = clip_tx.send(clip);
        });

        if self.queue_tx.send(QueuedUtterance { clip_rx, done_tx }).is_err() {
            warn!("voice queue is stopped, dropping utterance");
        }
        done_rx
    }
}
