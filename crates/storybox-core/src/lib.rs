//! # storybox-core
//!
//! Foundation types, errors, and utilities for the storybox engine.
//!
//! This crate provides the shared vocabulary that all other storybox crates
//! depend on:
//!
//! - **Session model**: [`StorySession`] and its parts — stage, characters,
//!   scenes, guests, and trailer beats
//! - **Branded IDs**: [`CharacterId`] as a newtype for type safety
//! - **Errors**: [`StoryboxError`] hierarchy via `thiserror`
//! - **Retry**: exponential backoff with jitter for external generation calls
//! - **Decode**: defensive JSON decoding with typed fallbacks
//! - **Settings**: figment-loaded endpoints and credentials

#![deny(unsafe_code)]

pub mod decode;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod retry;
pub mod session;
pub mod settings;
pub mod tools;

pub use decode::{Decoded, decode_with_fallback};
pub use errors::{ServiceError, SettingsError, StoryboxError, ToolError};
pub use ids::CharacterId;
pub use retry::{RetryConfig, RetryDecision, retry_with_backoff};
pub use session::{
    AssetSlot, Reaction, Stage, StoryCharacter, StoryGuest, StoryScene, StorySession, StoryStyle,
    TrailerBeat, VoiceTrack,
};
pub use settings::{Credential, StoryboxSettings};
pub use tools::{ParameterSchema, ToolSchema};
