//! # storybox-engine
//!
//! The story orchestration engine:
//!
//! - [`StoryStateStore`]: the watch-backed session record with
//!   distinct-by-key observation
//! - [`StageOrchestrator`]: per-stage tool surfaces, background tasks, and
//!   the epoch guard that keeps superseded stages from writing
//! - [`TrailerSequencer`]: streamed script generation, per-beat asset
//!   fan-out, and readiness-gated playback
//! - [`prompts`]: every template the generation services see
//! - [`voices`]: the fixed voice actor roster
//!
//! External collaborators (camera, models, speech) enter through the trait
//! objects in `storybox-services`; the engine owns no I/O of its own.

#![deny(unsafe_code)]

pub mod orchestrator;
pub mod prompts;
pub mod store;
pub mod trailer;
pub mod voices;

pub use orchestrator::{Collaborators, GuestSeed, StageOrchestrator};
pub use store::StoryStateStore;
pub use trailer::TrailerSequencer;
