//! The [`StoryTool`] trait and the closure adapter.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;

use storybox_core::errors::ToolError;
use storybox_core::tools::{ParameterSchema, ToolSchema};

/// A named operation the conversational agent may invoke.
///
/// Handlers receive parsed JSON arguments and return the message the agent
/// should relay to the user. Handlers may have side effects on the session.
#[async_trait]
pub trait StoryTool: Send + Sync {
    /// The schema pushed to the agent channel on commit.
    fn schema(&self) -> &ToolSchema;

    /// Execute the tool.
    async fn invoke(&self, args: Value) -> Result<String, ToolError>;
}

type Handler = Box<dyn Fn(Value) -> BoxFuture<'static, Result<String, ToolError>> + Send + Sync>;

/// A [`StoryTool`] built from a closure.
pub struct FnTool {
    schema: ToolSchema,
    handler: Handler,
}

impl FnTool {
    /// Build a tool from a name, description, parameter schema, and handler.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ParameterSchema,
        handler: F,
    ) -> Arc<dyn StoryTool>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        Arc::new(Self {
            schema: ToolSchema {
                name: name.into(),
                description: description.into(),
                parameters,
            },
            handler: Box::new(move |args| Box::pin(handler(args))),
        })
    }
}

#[async_trait]
impl StoryTool for FnTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        (self.handler)(args).await
    }
}

/// Parse tool arguments into a typed parameter struct.
pub fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|err| ToolError::InvalidArguments {
        tool: tool.to_owned(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct CreateArgs {
        daily_object: String,
        character_name: String,
    }

    #[tokio::test]
    async fn fn_tool_invokes_handler_with_args() {
        let tool = FnTool::new(
            "create_character",
            "Create a character in the story",
            ParameterSchema::object(&[
                ("dailyObject", "the object shown"),
                ("characterName", "the character's name"),
            ]),
            |args| async move {
                let args: CreateArgs = parse_args("create_character", args)?;
                Ok(format!("{} represents {}", args.daily_object, args.character_name))
            },
        );

        let out = tool
            .invoke(serde_json::json!({
                "dailyObject": "rubber duck",
                "characterName": "Ducky"
            }))
            .await
            .unwrap();
        assert_eq!(out, "rubber duck represents Ducky");
    }

    #[tokio::test]
    async fn bad_args_surface_as_invalid_arguments() {
        let tool = FnTool::new(
            "create_character",
            "Create a character",
            ParameterSchema::empty(),
            |args| async move {
                let _: CreateArgs = parse_args("create_character", args)?;
                Ok(String::new())
            },
        );
        let err = tool.invoke(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }
}
