//! Collaborator traits.
//!
//! Each trait is the capability surface the engine consumes; wire formats
//! and vendor SDKs stay behind the implementations. All methods suspend at
//! I/O boundaries only.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use storybox_core::ServiceError;
use storybox_core::ToolSchema;

use crate::messages::ChatMessage;

/// An opaque captured camera frame (typically a data URL).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Encoded image payload.
    pub data: String,
}

/// A synthesized audio clip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioClip {
    /// Encoded audio payload.
    pub bytes: Vec<u8>,
}

/// Requested output dimensions for image generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl ImageSize {
    /// Character portrait card.
    pub const PORTRAIT: Self = Self {
        width: 480,
        height: 400,
    };
    /// Story scene illustration.
    pub const SCENE: Self = Self {
        width: 768,
        height: 432,
    };
    /// Widescreen trailer frame.
    pub const TRAILER: Self = Self {
        width: 1792,
        height: 1024,
    };
}

/// A stream of text chunks from a completion service.
pub type TextStream = BoxStream<'static, Result<String, ServiceError>>;

// ─────────────────────────────────────────────────────────────────────────────
// Capture and description
// ─────────────────────────────────────────────────────────────────────────────

/// Camera with a material-change detector.
///
/// The change-detection algorithm itself is the implementation's business;
/// the engine only sees "the frame changed" triggers and captures on demand.
pub trait CameraSource: Send + Sync {
    /// Stream of "the frame changed materially" triggers.
    fn frames(&self) -> BoxStream<'static, ()>;

    /// Capture the current frame.
    fn capture(&self) -> Frame;
}

/// Vision-capable model describing a captured frame.
#[async_trait]
pub trait VisionDescriber: Send + Sync {
    /// Describe the frame in one brief sentence.
    async fn describe(&self, frame: &Frame, hint: &str) -> Result<String, ServiceError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Generation
// ─────────────────────────────────────────────────────────────────────────────

/// Image generation service.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate an image, returning its URL or data URL.
    async fn generate(&self, prompt: &str, size: ImageSize) -> Result<String, ServiceError>;
}

/// Text generation / refinement service.
#[async_trait]
pub trait TextCompleter: Send + Sync {
    /// Plain completion.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError>;

    /// Completion in structured-JSON response mode.
    async fn complete_json(&self, messages: &[ChatMessage]) -> Result<String, ServiceError>;

    /// Streaming completion in structured-JSON response mode. Chunks are
    /// raw text fragments; feed them to a [`crate::JsonArrayStream`].
    fn complete_stream(&self, messages: &[ChatMessage]) -> TextStream;
}

/// Speech synthesis service.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` with the given vendor voice.
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<AudioClip, ServiceError>;
}

/// Audio playback device. Resolves when the clip finishes playing.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play a clip to completion.
    async fn play(&self, clip: AudioClip) -> Result<(), ServiceError>;
}

/// Push-to-talk speech capture for guest interviews.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Start capturing.
    async fn start(&self) -> Result<(), ServiceError>;

    /// Stop capturing and return the recognized transcript (may be empty).
    async fn stop(&self) -> Result<String, ServiceError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Realtime agent channel
// ─────────────────────────────────────────────────────────────────────────────

/// Events emitted by the realtime conversational agent.
#[derive(Clone, Debug, PartialEq)]
pub enum RealtimeEvent {
    /// Incremental agent speech transcript.
    AgentTranscriptDelta {
        /// Transcript fragment.
        text: String,
    },
    /// A completed user speech transcript.
    UserTranscriptDone {
        /// Full utterance text.
        text: String,
    },
    /// The agent invoked a tool.
    ToolInvocation {
        /// Correlation ID for the result.
        call_id: String,
        /// Tool name.
        name: String,
        /// Raw JSON arguments.
        arguments: Value,
    },
}

/// Bidirectional channel to the realtime conversational agent.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Replace the agent's tool set (schemas only).
    async fn set_tools(&self, tools: Vec<ToolSchema>) -> Result<(), ServiceError>;

    /// Replace the agent's system instructions.
    async fn update_instructions(&self, text: &str) -> Result<(), ServiceError>;

    /// Append a user message to the conversation.
    async fn send_user_message(&self, text: &str) -> Result<(), ServiceError>;

    /// Ask the agent to respond now.
    async fn create_response(&self) -> Result<(), ServiceError>;

    /// Cut off the agent's current speech.
    async fn interrupt(&self) -> Result<(), ServiceError>;

    /// Stop forwarding microphone audio to the agent.
    async fn mute_microphone(&self);

    /// Resume forwarding microphone audio.
    async fn unmute_microphone(&self);

    /// Deliver a tool result for a pending invocation.
    async fn send_tool_result(&self, call_id: &str, output: &str) -> Result<(), ServiceError>;

    /// Subscribe to channel events.
    fn events(&self) -> BoxStream<'static, RealtimeEvent>;
}
