//! # storybox-vision
//!
//! Converts camera-change triggers into textual scene descriptions and
//! exposes two streams:
//!
//! - **raw**: the winning description so far, reconciled by the
//!   highest-start-stamp-wins rule so out-of-order completions never flicker
//!   an older description over a newer one
//! - **stable**: emits only when no description requests are in flight and
//!   the winning description changed — the only point at which it is safe to
//!   bake the description into a tool/instruction snapshot

#![deny(unsafe_code)]

pub mod sampler;

pub use sampler::{DESCRIBE_HINT, VisionSampler, VisionUpdate};
