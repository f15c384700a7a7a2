//! # storybox-services
//!
//! Trait definitions for every external collaborator the engine talks to —
//! camera, vision description, image generation, text completion, speech
//! synthesis and recognition, and the realtime agent channel — plus the
//! incremental JSON array parser used to consume streamed generation output
//! before the document finishes.
//!
//! No vendor bindings live here. Production code provides HTTP-backed
//! implementations; tests provide fakes.

#![deny(unsafe_code)]

pub mod json_stream;
pub mod messages;
pub mod traits;

pub use json_stream::JsonArrayStream;
pub use messages::{ChatMessage, Role, assistant, system, user};
pub use traits::{
    AudioClip, AudioSink, CameraSource, Frame, ImageGenerator, ImageSize, RealtimeChannel,
    RealtimeEvent, SpeechRecognizer, SpeechSynthesizer, TextCompleter, TextStream, VisionDescriber,
};
