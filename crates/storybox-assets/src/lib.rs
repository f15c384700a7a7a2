//! # storybox-assets
//!
//! Turns scene and character descriptions into generated assets:
//!
//! - [`AssetPipeline`]: image rendering with retry/backoff and placeholder
//!   fallback, plus the few-shot refinement pre-pass that rewrites a raw
//!   scene idea into a fully-specified visual description
//! - [`VoiceQueue`]: speech synthesis may run concurrently and complete out
//!   of order, but playback is strictly FIFO by enqueue order

#![deny(unsafe_code)]

pub mod pipeline;
pub mod voice;

pub use pipeline::{AssetPipeline, PLACEHOLDER_IMAGE};
pub use voice::VoiceQueue;
