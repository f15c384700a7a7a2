//! Shared fakes for engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use tokio::sync::{Notify, broadcast, mpsc, oneshot};
use tokio_stream::wrappers::{BroadcastStream, UnboundedReceiverStream};
use tokio_util::sync::CancellationToken;

use storybox_assets::{AssetPipeline, VoiceQueue};
use storybox_core::{RetryConfig, ServiceError, ToolSchema};
use storybox_engine::{Collaborators, GuestSeed, StageOrchestrator, StoryStateStore};
use storybox_services::{
    AudioClip, AudioSink, CameraSource, ChatMessage, Frame, ImageGenerator, ImageSize,
    RealtimeChannel, RealtimeEvent, SpeechRecognizer, SpeechSynthesizer, TextCompleter,
    TextStream, VisionDescriber,
};
use storybox_vision::VisionSampler;

// ─────────────────────────────────────────────────────────────────────────────
// Agent channel
// ─────────────────────────────────────────────────────────────────────────────

/// Channel fake recording everything the engine pushes; tests inject agent
/// events through [`FakeChannel::emit`].
pub struct FakeChannel {
    pub tool_pushes: Mutex<Vec<Vec<ToolSchema>>>,
    pub instructions: Mutex<Vec<String>>,
    pub user_messages: Mutex<Vec<String>>,
    pub tool_results: Mutex<Vec<(String, String)>>,
    pub responses_requested: AtomicUsize,
    pub interrupts: AtomicUsize,
    pub mutes: AtomicUsize,
    pub unmutes: AtomicUsize,
    events_tx: broadcast::Sender<RealtimeEvent>,
}

impl FakeChannel {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(64);
        Self {
            tool_pushes: Mutex::new(Vec::new()),
            instructions: Mutex::new(Vec::new()),
            user_messages: Mutex::new(Vec::new()),
            tool_results: Mutex::new(Vec::new()),
            responses_requested: AtomicUsize::new(0),
            interrupts: AtomicUsize::new(0),
            mutes: AtomicUsize::new(0),
            unmutes: AtomicUsize::new(0),
            events_tx,
        }
    }

    pub fn emit(&self, event: RealtimeEvent) {
        let _ = self.events_tx.send(event);
    }
}

#[async_trait]
impl RealtimeChannel for FakeChannel {
    async fn set_tools(&self, tools: Vec<ToolSchema>) -> Result<(), ServiceError> {
        self.tool_pushes.lock().push(tools);
        Ok(())
    }

    async fn update_instructions(&self, text: &str) -> Result<(), ServiceError> {
        self.instructions.lock().push(text.to_owned());
        Ok(())
    }

    async fn send_user_message(&self, text: &str) -> Result<(), ServiceError> {
        self.user_messages.lock().push(text.to_owned());
        Ok(())
    }

    async fn create_response(&self) -> Result<(), ServiceError> {
        let _ = self.responses_requested.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn interrupt(&self) -> Result<(), ServiceError> {
        let _ = self.interrupts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn mute_microphone(&self) {
        let _ = self.mutes.fetch_add(1, Ordering::SeqCst);
    }

    async fn unmute_microphone(&self) {
        let _ = self.unmutes.fetch_add(1, Ordering::SeqCst);
    }

    async fn send_tool_result(&self, call_id: &str, output: &str) -> Result<(), ServiceError> {
        self.tool_results
            .lock()
            .push((call_id.to_owned(), output.to_owned()));
        Ok(())
    }

    fn events(&self) -> BoxStream<'static, RealtimeEvent> {
        BroadcastStream::new(self.events_tx.subscribe())
            .filter_map(|event| async move { event.ok() })
            .boxed()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Camera and vision
// ─────────────────────────────────────────────────────────────────────────────

/// Camera whose material-change triggers are fired by the test.
pub struct TriggerCamera {
    trigger_tx: mpsc::UnboundedSender<()>,
    triggers: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
}

impl TriggerCamera {
    pub fn new() -> Self {
        let (trigger_tx, rx) = mpsc::unbounded_channel();
        Self {
            trigger_tx,
            triggers: Mutex::new(Some(rx)),
        }
    }

    pub fn trigger(&self) {
        let _ = self.trigger_tx.send(());
    }
}

impl CameraSource for TriggerCamera {
    fn frames(&self) -> BoxStream<'static, ()> {
        let rx = self.triggers.lock().take().expect("frames taken twice");
        UnboundedReceiverStream::new(rx).boxed()
    }

    fn capture(&self) -> Frame {
        Frame {
            data: "frame".to_owned(),
        }
    }
}

/// Describer that always sees the same scene.
pub struct FixedDescriber(pub &'static str);

#[async_trait]
impl VisionDescriber for FixedDescriber {
    async fn describe(&self, _frame: &Frame, _hint: &str) -> Result<String, ServiceError> {
        Ok(self.0.to_owned())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Text generation
// ─────────────────────────────────────────────────────────────────────────────

/// Text fake routing by the request's system prompt, so concurrently issued
/// generations never race over a shared reply queue.
#[derive(Default)]
pub struct StudioText {
    /// Reply for the `start_story` summary (raw JSON).
    pub story_json: String,
    /// When set, the story summary stalls until notified.
    pub story_gate: Option<Arc<Notify>>,
    /// Reply for the voice casting pass (raw JSON).
    pub casting_json: String,
    /// Reply for interview turns (raw JSON).
    pub interview_json: String,
    /// Chunked stream for the trailer script.
    pub trailer_chunks: Vec<String>,
    /// Chunked stream for guest backgrounds.
    pub guest_chunks: Vec<String>,
}

const REACTIONS_JSON: &str =
    r#"{"reactions":[{"username":"viewer1","message":"woah (o_o)"},{"username":"viewer2","message":"FIRST!!"}]}"#;

#[async_trait]
impl TextCompleter for StudioText {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError> {
        // Only the refinement pass uses plain completion.
        let request = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        Ok(format!("refined: {request}"))
    }

    async fn complete_json(&self, messages: &[ChatMessage]) -> Result<String, ServiceError> {
        let prompt = messages.first().map(|m| m.content.as_str()).unwrap_or("");
        if prompt.contains("story writer") {
            if let Some(gate) = &self.story_gate {
                gate.notified().await;
            }
            return Ok(self.story_json.clone());
        }
        if prompt.contains("Bullet Screen") {
            return Ok(REACTIONS_JSON.to_owned());
        }
        if prompt.contains("casting director") {
            return Ok(self.casting_json.clone());
        }
        if prompt.contains("audience interview") {
            return Ok(self.interview_json.clone());
        }
        Err(ServiceError::other("unscripted completion"))
    }

    fn complete_stream(&self, messages: &[ChatMessage]) -> TextStream {
        let prompt = messages.first().map(|m| m.content.as_str()).unwrap_or("");
        let chunks = if prompt.contains("screenwriter") {
            self.trailer_chunks.clone()
        } else if prompt.contains("collaborative storytelling") {
            self.guest_chunks.clone()
        } else {
            Vec::new()
        };
        futures::stream::iter(chunks.into_iter().map(Ok)).boxed()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Images
// ─────────────────────────────────────────────────────────────────────────────

/// Image generator resolved by hand, keyed by prompt substring.
#[derive(Default)]
pub struct ManualImages {
    waiters: Mutex<Vec<(String, oneshot::Sender<String>)>>,
}

impl ManualImages {
    /// Resolve the pending render whose prompt contains `needle`.
    pub async fn resolve(&self, needle: &str, url: &str) {
        loop {
            let waiter = {
                let mut waiters = self.waiters.lock();
                waiters
                    .iter()
                    .position(|(prompt, _)| prompt.contains(needle))
                    .map(|pos| waiters.remove(pos))
            };
            if let Some((_, tx)) = waiter {
                let _ = tx.send(url.to_owned());
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    pub fn pending(&self) -> usize {
        self.waiters.lock().len()
    }
}

#[async_trait]
impl ImageGenerator for ManualImages {
    async fn generate(&self, prompt: &str, _size: ImageSize) -> Result<String, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().push((prompt.to_owned(), tx));
        rx.await.map_err(|_| ServiceError::Cancelled)
    }
}

/// Image generator that resolves immediately.
pub struct InstantImages;

#[async_trait]
impl ImageGenerator for InstantImages {
    async fn generate(&self, prompt: &str, _size: ImageSize) -> Result<String, ServiceError> {
        Ok(format!("https://img.test/{}", prompt.len()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Speech
// ─────────────────────────────────────────────────────────────────────────────

/// Synthesizer that records (text, voice) pairs and resolves immediately.
#[derive(Default)]
pub struct InstantSynth {
    pub calls: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl SpeechSynthesizer for InstantSynth {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<AudioClip, ServiceError> {
        self.calls.lock().push((text.to_owned(), voice_id.to_owned()));
        Ok(AudioClip {
            bytes: text.as_bytes().to_vec(),
        })
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub played: Mutex<Vec<String>>,
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn play(&self, clip: AudioClip) -> Result<(), ServiceError> {
        self.played
            .lock()
            .push(String::from_utf8_lossy(&clip.bytes).into_owned());
        Ok(())
    }
}

#[derive(Default)]
pub struct ScriptedRecognizer {
    pub transcript: Mutex<String>,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

#[async_trait]
impl SpeechRecognizer for ScriptedRecognizer {
    async fn start(&self) -> Result<(), ServiceError> {
        let _ = self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<String, ServiceError> {
        let _ = self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(self.transcript.lock().clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────────────────────────

pub struct Harness {
    pub orchestrator: StageOrchestrator,
    pub channel: Arc<FakeChannel>,
    pub camera: Arc<TriggerCamera>,
    pub images: Arc<ManualImages>,
    pub synth: Arc<InstantSynth>,
    pub sink: Arc<RecordingSink>,
    pub recognizer: Arc<ScriptedRecognizer>,
    pub root: CancellationToken,
}

pub fn guest_seeds() -> Vec<GuestSeed> {
    vec![
        GuestSeed {
            name: "Alice".to_owned(),
            gender: "female".to_owned(),
            voice_id: "voice-alice".to_owned(),
        },
        GuestSeed {
            name: "Bob".to_owned(),
            gender: "male".to_owned(),
            voice_id: "voice-bob".to_owned(),
        },
    ]
}

pub fn harness(text: StudioText) -> Harness {
    let root = CancellationToken::new();
    let channel = Arc::new(FakeChannel::new());
    let camera = Arc::new(TriggerCamera::new());
    let images = Arc::new(ManualImages::default());
    let synth = Arc::new(InstantSynth::default());
    let sink = Arc::new(RecordingSink::default());
    let recognizer = Arc::new(ScriptedRecognizer::default());
    let text: Arc<dyn TextCompleter> = Arc::new(text);

    let vision = VisionSampler::spawn(
        camera.clone(),
        Arc::new(FixedDescriber("a red stapler")),
        root.child_token(),
    );
    let assets = Arc::new(AssetPipeline::new(
        images.clone(),
        text.clone(),
        RetryConfig {
            base_delay_ms: 1,
            max_delay_ms: 2,
            ..RetryConfig::default()
        },
    ));
    let voices = Arc::new(VoiceQueue::spawn(
        synth.clone(),
        sink.clone(),
        root.child_token(),
    ));

    let store = Arc::new(StoryStateStore::default());
    let orchestrator = StageOrchestrator::new(
        store,
        Collaborators {
            channel: channel.clone(),
            text,
            recognizer: recognizer.clone(),
            vision,
            assets,
            voices,
            guest_seeds: guest_seeds(),
        },
        root.clone(),
    );

    Harness {
        orchestrator,
        channel,
        camera,
        images,
        synth,
        sink,
        recognizer,
        root,
    }
}

/// Poll `cond` until it holds or the (virtual) deadline passes.
pub async fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
