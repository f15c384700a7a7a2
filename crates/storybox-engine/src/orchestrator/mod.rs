//! Stage orchestration.
//!
//! One [`StageOrchestrator`] drives a whole session. It observes stage
//! changes on the store and, per stage, spawns that stage's background tasks
//! under a fresh cancellation token. Every stage switch cancels the previous
//! stage's tasks and bumps the stage epoch; state writes from tasks belonging
//! to a superseded epoch are silently discarded, so a late asset render or
//! vision update can never leak into the next stage.

mod customizing;
mod editing;
mod interview;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use storybox_assets::{AssetPipeline, VoiceQueue};
use storybox_core::{ServiceError, Stage, StoryboxError, StorySession};
use storybox_services::{RealtimeChannel, RealtimeEvent, SpeechRecognizer, TextCompleter};
use storybox_tools::{StoryTool, ToolRegistry};
use storybox_vision::VisionSampler;

use crate::store::StoryStateStore;
use crate::trailer::TrailerSequencer;

/// A pre-arranged audience guest. Backgrounds are generated at editing-stage
/// entry; the seed only fixes identity and voice.
#[derive(Clone, Debug)]
pub struct GuestSeed {
    /// Guest display name.
    pub name: String,
    /// Gender, passed to background generation.
    pub gender: String,
    /// Vendor voice used when this guest speaks.
    pub voice_id: String,
}

/// External collaborators the orchestrator drives.
pub struct Collaborators {
    /// Realtime conversational agent.
    pub channel: Arc<dyn RealtimeChannel>,
    /// Text generation service.
    pub text: Arc<dyn TextCompleter>,
    /// Push-to-talk capture for guest interviews.
    pub recognizer: Arc<dyn SpeechRecognizer>,
    /// Running vision sampler.
    pub vision: VisionSampler,
    /// Image generation and refinement.
    pub assets: Arc<AssetPipeline>,
    /// Running voice playback queue.
    pub voices: Arc<VoiceQueue>,
    /// Audience roster for the editing stage.
    pub guest_seeds: Vec<GuestSeed>,
}

pub(crate) struct Inner {
    pub(crate) store: Arc<StoryStateStore>,
    pub(crate) registry: Arc<ToolRegistry>,
    pub(crate) channel: Arc<dyn RealtimeChannel>,
    pub(crate) text: Arc<dyn TextCompleter>,
    pub(crate) recognizer: Arc<dyn SpeechRecognizer>,
    pub(crate) vision: VisionSampler,
    pub(crate) assets: Arc<AssetPipeline>,
    pub(crate) voices: Arc<VoiceQueue>,
    pub(crate) guest_seeds: Vec<GuestSeed>,
    /// Conversation notes carried across tool calls and interview turns.
    pub(crate) history: Mutex<Vec<String>>,
    /// Serializes tool-surface commits so a superseded stage's derivation can
    /// never land after the live stage's.
    derive_lock: tokio::sync::Mutex<()>,
    epoch: AtomicU64,
    stage_cancel: Mutex<CancellationToken>,
    interview_cancel: Mutex<CancellationToken>,
    pub(crate) interview_target: Mutex<Option<String>>,
    root: CancellationToken,
}

impl Inner {
    /// Cancel the previous stage's tasks and open a new epoch.
    fn begin_epoch(&self) -> (u64, CancellationToken) {
        let fresh = self.root.child_token();
        let stale = {
            let mut guard = self.stage_cancel.lock();
            std::mem::replace(&mut *guard, fresh.clone())
        };
        stale.cancel();
        self.abort_interview_turn();
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        (epoch, fresh)
    }

    pub(crate) fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Cancel any in-flight interview turn and hand back a token for the next.
    pub(crate) fn abort_interview_turn(&self) -> CancellationToken {
        let fresh = self.root.child_token();
        let stale = {
            let mut guard = self.interview_cancel.lock();
            std::mem::replace(&mut *guard, fresh.clone())
        };
        stale.cancel();
        fresh
    }

    /// Apply a session update only if `epoch` is still the live stage epoch.
    /// Returns the post-update session, or `None` for a discarded write.
    pub(crate) fn guarded_update(
        &self,
        epoch: u64,
        mutate: impl FnOnce(&mut StorySession),
    ) -> Option<StorySession> {
        let mut applied = false;
        let after = self.store.update(|session| {
            if self.epoch.load(Ordering::SeqCst) == epoch {
                mutate(session);
                applied = true;
            }
        });
        if applied {
            Some(after)
        } else {
            debug!(epoch, "discarding write from a superseded stage");
            None
        }
    }

    /// Commit a derived tool surface and its instructions, skipping both when
    /// `epoch` was superseded. Drafting, commit, and instruction push happen
    /// under one lock so concurrent derivations cannot interleave.
    pub(crate) async fn commit_surface(
        &self,
        epoch: u64,
        tools: Vec<Arc<dyn StoryTool>>,
        instructions: String,
    ) -> Result<(), ServiceError> {
        let _guard = self.derive_lock.lock().await;
        if self.current_epoch() != epoch {
            debug!(epoch, "skipping tool commit from a superseded stage");
            return Ok(());
        }
        for tool in tools {
            self.registry.add_draft(tool);
        }
        let _ = self.registry.commit().await?;
        self.registry.update_instructions(&instructions).await
    }

    pub(crate) fn change_stage(&self, stage: Stage) {
        let _ = self.store.update(|session| session.stage = stage);
    }

    async fn enter_stage(self: &Arc<Self>, stage: Stage) {
        let (epoch, cancel) = self.begin_epoch();
        info!(%stage, epoch, "entering stage");
        match stage {
            Stage::New => self.change_stage(Stage::Customizing),
            Stage::Customizing => customizing::enter(self, epoch, cancel),
            Stage::Editing => editing::enter(self, epoch, cancel),
            Stage::Trailer => {
                self.channel.mute_microphone().await;
                TrailerSequencer::new(
                    self.store.clone(),
                    self.text.clone(),
                    self.assets.clone(),
                    self.voices.clone(),
                    cancel,
                )
                .start();
            }
        }
    }
}

/// Drives the session through its stages.
pub struct StageOrchestrator {
    inner: Arc<Inner>,
}

impl StageOrchestrator {
    /// Build an orchestrator over a store and its collaborators. Nothing runs
    /// until [`StageOrchestrator::start`].
    #[must_use]
    pub fn new(
        store: Arc<StoryStateStore>,
        collaborators: Collaborators,
        root: CancellationToken,
    ) -> Self {
        let registry = Arc::new(ToolRegistry::new(collaborators.channel.clone()));
        Self {
            inner: Arc::new(Inner {
                store,
                registry,
                channel: collaborators.channel,
                text: collaborators.text,
                recognizer: collaborators.recognizer,
                vision: collaborators.vision,
                assets: collaborators.assets,
                voices: collaborators.voices,
                guest_seeds: collaborators.guest_seeds,
                history: Mutex::new(Vec::new()),
                derive_lock: tokio::sync::Mutex::new(()),
                epoch: AtomicU64::new(0),
                stage_cancel: Mutex::new(root.child_token()),
                interview_cancel: Mutex::new(root.child_token()),
                interview_target: Mutex::new(None),
                root,
            }),
        }
    }

    /// The session store this orchestrator writes to.
    #[must_use]
    pub fn store(&self) -> &Arc<StoryStateStore> {
        &self.inner.store
    }

    /// The live tool registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.inner.registry
    }

    /// Begin orchestrating: observe stage changes, relay tool invocations,
    /// and move a fresh session from `new` into `customizing`.
    pub fn start(&self) {
        spawn_stage_loop(self.inner.clone());
        spawn_dispatch_loop(self.inner.clone());
    }

    /// Start a push-to-talk interview turn aimed at `guest_name`.
    ///
    /// Interrupts the agent, mutes its microphone, and aborts any interview
    /// turn still in flight. Outside the editing stage this is a no-op.
    pub async fn begin_guest_interview(&self, guest_name: &str) -> Result<(), StoryboxError> {
        interview::begin(&self.inner, guest_name).await
    }

    /// End the push-to-talk capture and run the interview turn with whatever
    /// was recognized. An empty transcript skips the turn.
    pub async fn finish_guest_interview(&self) -> Result<(), StoryboxError> {
        interview::finish(&self.inner).await
    }

    /// Manually advance the trailer to the next beat, wrapping at the end.
    pub fn advance_trailer(&self) {
        crate::trailer::advance(&self.inner.store);
    }

    /// Manually rewind the trailer to the previous beat.
    pub fn rewind_trailer(&self) {
        crate::trailer::rewind(&self.inner.store);
    }

    /// Reset the session and restart the cycle from character customizing.
    pub fn end_story(&self) {
        self.inner.history.lock().clear();
        let _ = self.inner.store.update(|session| *session = StorySession::default());
    }
}

fn spawn_stage_loop(inner: Arc<Inner>) {
    let _ = tokio::spawn(async move {
        let stages = inner.store.observe_stage();
        futures::pin_mut!(stages);
        loop {
            let stage = tokio::select! {
                () = inner.root.cancelled() => break,
                next = stages.next() => match next {
                    Some(stage) => stage,
                    None => break,
                },
            };
            inner.enter_stage(stage).await;
        }
        debug!("stage loop stopped");
    });
}

fn spawn_dispatch_loop(inner: Arc<Inner>) {
    let _ = tokio::spawn(async move {
        let mut events = inner.channel.events();
        loop {
            let event = tokio::select! {
                () = inner.root.cancelled() => break,
                event = events.next() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            let RealtimeEvent::ToolInvocation {
                call_id,
                name,
                arguments,
            } = event
            else {
                continue;
            };

            let registry = inner.registry.clone();
            let channel = inner.channel.clone();
            let _ = tokio::spawn(async move {
                let output = match registry.dispatch(&name, arguments).await {
                    Ok(output) => output,
                    Err(err) => {
                        warn!(tool = %name, error = %err, "tool invocation failed");
                        err.to_string()
                    }
                };
                if let Err(err) = channel.send_tool_result(&call_id, &output).await {
                    warn!(tool = %name, error = %err, "failed to deliver tool result");
                }
            });
        }
        debug!("dispatch loop stopped");
    });
}

/// Forward settled vision descriptions into the session and to the agent.
/// Used by the customizing and editing stages.
pub(crate) fn spawn_vision_updates(inner: &Arc<Inner>, epoch: u64, cancel: CancellationToken) {
    let mut stable = inner.vision.subscribe_stable();
    let inner = inner.clone();
    let _ = tokio::spawn(async move {
        loop {
            let update = tokio::select! {
                () = cancel.cancelled() => break,
                update = stable.recv() => match update {
                    Ok(update) => update,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "vision updates lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            if inner
                .guarded_update(epoch, |session| {
                    session.vision.clone_from(&update.description);
                })
                .is_none()
            {
                break;
            }
            let message = format!("Now I'm showing you: {}", update.description);
            if let Err(err) = inner.channel.send_user_message(&message).await {
                warn!(error = %err, "failed to forward vision update");
            }
        }
    });
}
