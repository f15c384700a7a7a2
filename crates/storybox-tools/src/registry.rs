//! Tool registry with draft/commit semantics.
//!
//! The orchestrator stages tool definitions into a draft set and commits the
//! whole set at once. Commit atomically replaces the live set and pushes the
//! schemas to the agent channel, so the agent never observes a half-updated
//! tool surface. Invocations already in flight against the previous set run
//! to completion on the `Arc`s they cloned; new dispatches only resolve
//! against the committed set.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use storybox_core::errors::{ServiceError, ToolError};
use storybox_services::RealtimeChannel;

use crate::traits::StoryTool;

#[derive(Default)]
struct Inner {
    drafts: Vec<Arc<dyn StoryTool>>,
    live: HashMap<String, Arc<dyn StoryTool>>,
    generation: u64,
    last_instructions: Option<String>,
}

/// Per-turn set of callable tools, swapped atomically on commit.
pub struct ToolRegistry {
    channel: Arc<dyn RealtimeChannel>,
    inner: Mutex<Inner>,
}

impl ToolRegistry {
    /// Create an empty registry bound to an agent channel.
    pub fn new(channel: Arc<dyn RealtimeChannel>) -> Self {
        Self {
            channel,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Stage a tool into the pending draft set.
    pub fn add_draft(&self, tool: Arc<dyn StoryTool>) {
        self.inner.lock().drafts.push(tool);
    }

    /// Atomically replace the live set with the drafted set and push the new
    /// schemas to the agent channel. Returns the new generation number.
    pub async fn commit(&self) -> Result<u64, ServiceError> {
        let (schemas, generation) = {
            let mut inner = self.inner.lock();
            let drafts = std::mem::take(&mut inner.drafts);
            inner.live = drafts
                .into_iter()
                .map(|tool| (tool.schema().name.clone(), tool))
                .collect();
            inner.generation += 1;
            let mut schemas: Vec<_> = inner.live.values().map(|t| t.schema().clone()).collect();
            schemas.sort_by(|a, b| a.name.cmp(&b.name));
            (schemas, inner.generation)
        };
        debug!(generation, tools = schemas.len(), "tool set committed");
        self.channel.set_tools(schemas).await?;
        Ok(generation)
    }

    /// Push new system instructions, skipping the push when the text is
    /// byte-identical to the last pushed instructions.
    pub async fn update_instructions(&self, text: &str) -> Result<(), ServiceError> {
        {
            let mut inner = self.inner.lock();
            if inner.last_instructions.as_deref() == Some(text) {
                return Ok(());
            }
            inner.last_instructions = Some(text.to_owned());
        }
        self.channel.update_instructions(text).await
    }

    /// Generation of the currently live tool set.
    pub fn live_generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Names of the live tools, sorted.
    pub fn live_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.inner.lock().live.keys().cloned().collect();
        names.sort();
        names
    }

    /// Invoke a live tool by name.
    pub async fn dispatch(&self, name: &str, args: Value) -> Result<String, ToolError> {
        let tool = self
            .inner
            .lock()
            .live
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::UnknownTool {
                name: name.to_owned(),
            })?;
        tool.invoke(args).await
    }

    /// Invoke a live tool, rejecting calls bound to a superseded generation.
    pub async fn dispatch_at(
        &self,
        generation: u64,
        name: &str,
        args: Value,
    ) -> Result<String, ToolError> {
        let live = self.live_generation();
        if generation != live {
            return Err(ToolError::StaleGeneration {
                requested: generation,
                live,
            });
        }
        self.dispatch(name, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use futures::StreamExt;
    use futures::stream::BoxStream;
    use parking_lot::Mutex as PlMutex;
    use storybox_core::tools::{ParameterSchema, ToolSchema};
    use storybox_services::RealtimeEvent;

    use crate::traits::FnTool;

    /// Channel fake recording what the registry pushes.
    #[derive(Default)]
    struct RecordingChannel {
        tool_pushes: PlMutex<Vec<Vec<ToolSchema>>>,
        instruction_pushes: PlMutex<Vec<String>>,
    }

    #[async_trait]
    impl RealtimeChannel for RecordingChannel {
        async fn set_tools(&self, tools: Vec<ToolSchema>) -> Result<(), ServiceError> {
            self.tool_pushes.lock().push(tools);
            Ok(())
        }

        async fn update_instructions(&self, text: &str) -> Result<(), ServiceError> {
            self.instruction_pushes.lock().push(text.to_owned());
            Ok(())
        }

        async fn send_user_message(&self, _text: &str) -> Result<(), ServiceError> {
            Ok(())
        }

        async fn create_response(&self) -> Result<(), ServiceError> {
            Ok(())
        }

        async fn interrupt(&self) -> Result<(), ServiceError> {
            Ok(())
        }

        async fn mute_microphone(&self) {}

        async fn unmute_microphone(&self) {}

        async fn send_tool_result(&self, _call_id: &str, _output: &str) -> Result<(), ServiceError> {
            Ok(())
        }

        fn events(&self) -> BoxStream<'static, RealtimeEvent> {
            futures::stream::empty().boxed()
        }
    }

    fn noop_tool(name: &str) -> Arc<dyn StoryTool> {
        let reply = format!("{name} ran");
        FnTool::new(name, "test tool", ParameterSchema::empty(), move |_args| {
            let reply = reply.clone();
            async move { Ok(reply) }
        })
    }

    #[tokio::test]
    async fn commit_replaces_the_live_set_atomically() {
        let channel = Arc::new(RecordingChannel::default());
        let registry = ToolRegistry::new(channel.clone());

        registry.add_draft(noop_tool("create_character"));
        let _ = registry.commit().await.unwrap();
        assert_eq!(registry.live_names(), vec!["create_character"]);

        registry.add_draft(noop_tool("add_next_scene"));
        registry.add_draft(noop_tool("convert_to_trailer"));
        let _ = registry.commit().await.unwrap();

        // The pre-commit tool no longer exists; the committed ones do.
        let err = registry
            .dispatch("create_character", Value::Null)
            .await
            .unwrap_err();
        assert_matches!(err, ToolError::UnknownTool { name } if name == "create_character");
        let out = registry.dispatch("add_next_scene", Value::Null).await.unwrap();
        assert_eq!(out, "add_next_scene ran");

        // Each commit pushed the full schema list to the channel.
        let pushes = channel.tool_pushes.lock();
        assert_eq!(pushes.len(), 2);
        assert_eq!(pushes[1].len(), 2);
        assert_eq!(pushes[1][0].name, "add_next_scene");
    }

    #[tokio::test]
    async fn drafts_are_invisible_until_commit() {
        let channel = Arc::new(RecordingChannel::default());
        let registry = ToolRegistry::new(channel);

        registry.add_draft(noop_tool("start_story"));
        let err = registry.dispatch("start_story", Value::Null).await.unwrap_err();
        assert_matches!(err, ToolError::UnknownTool { .. });

        let _ = registry.commit().await.unwrap();
        assert!(registry.dispatch("start_story", Value::Null).await.is_ok());
    }

    #[tokio::test]
    async fn stale_generation_dispatch_is_rejected() {
        let channel = Arc::new(RecordingChannel::default());
        let registry = ToolRegistry::new(channel);

        registry.add_draft(noop_tool("start_story"));
        let gen1 = registry.commit().await.unwrap();

        registry.add_draft(noop_tool("start_story"));
        let gen2 = registry.commit().await.unwrap();
        assert!(gen2 > gen1);

        let err = registry
            .dispatch_at(gen1, "start_story", Value::Null)
            .await
            .unwrap_err();
        assert_matches!(err, ToolError::StaleGeneration { requested, live }
            if requested == gen1 && live == gen2);

        assert!(registry.dispatch_at(gen2, "start_story", Value::Null).await.is_ok());
    }

    #[tokio::test]
    async fn identical_instructions_push_once() {
        let channel = Arc::new(RecordingChannel::default());
        let registry = ToolRegistry::new(channel.clone());

        registry.update_instructions("You are hosting a workshop.").await.unwrap();
        registry.update_instructions("You are hosting a workshop.").await.unwrap();
        registry.update_instructions("You are a storyteller.").await.unwrap();

        let pushes = channel.instruction_pushes.lock();
        assert_eq!(
            *pushes,
            vec![
                "You are hosting a workshop.".to_owned(),
                "You are a storyteller.".to_owned()
            ]
        );
    }

    #[tokio::test]
    async fn in_flight_invocation_survives_commit() {
        let channel = Arc::new(RecordingChannel::default());
        let registry = Arc::new(ToolRegistry::new(channel));

        // A slow tool that waits long enough for a commit to land mid-flight.
        let slow = FnTool::new("slow_tool", "slow", ParameterSchema::empty(), |_| async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok("finished".to_owned())
        });
        registry.add_draft(slow);
        let _ = registry.commit().await.unwrap();

        let in_flight = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.dispatch("slow_tool", Value::Null).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let _ = registry.commit().await.unwrap(); // empty set replaces it

        // The started call still resolves; new calls fail.
        assert_eq!(in_flight.await.unwrap().unwrap(), "finished");
        assert!(registry.dispatch("slow_tool", Value::Null).await.is_err());
    }
}
