//! # storybox-tools
//!
//! The callable half of the tool system: the [`StoryTool`] trait every tool
//! implements, a closure adapter for building tools inline, and the
//! [`ToolRegistry`] with draft/commit semantics — the orchestrator redrafts
//! the whole tool surface from the current session snapshot every time
//! tracked state changes, then commits it atomically.

#![deny(unsafe_code)]

pub mod registry;
pub mod traits;

pub use registry::ToolRegistry;
pub use traits::{FnTool, StoryTool, parse_args};
