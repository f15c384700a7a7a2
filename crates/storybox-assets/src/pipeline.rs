//! Image generation and refinement.

use std::sync::Arc;

use tracing::warn;

use storybox_core::{RetryConfig, ServiceError, retry_with_backoff};
use storybox_services::{ChatMessage, ImageGenerator, ImageSize, TextCompleter, assistant, system, user};

/// Shown when image generation fails terminally.
pub const PLACEHOLDER_IMAGE: &str = "https://placehold.co/400?text=Sketching...";

/// Generation front-end shared by every stage.
pub struct AssetPipeline {
    images: Arc<dyn ImageGenerator>,
    text: Arc<dyn TextCompleter>,
    retry: RetryConfig,
}

impl AssetPipeline {
    /// Build a pipeline over the given services.
    pub fn new(
        images: Arc<dyn ImageGenerator>,
        text: Arc<dyn TextCompleter>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            images,
            text,
            retry,
        }
    }

    /// Render an illustration, appending an optional style modifier.
    ///
    /// Rate limits are retried with backoff; terminal failure surfaces a
    /// placeholder so the calling pipeline keeps moving.
    pub async fn render_image(
        &self,
        description: &str,
        style: Option<&str>,
        size: ImageSize,
    ) -> String {
        let prompt = match style {
            Some(style) => format!("{description} {style}"),
            None => description.to_owned(),
        };
        let result = retry_with_backoff(&self.retry, ServiceError::retry_decision, || {
            self.images.generate(&prompt, size)
        })
        .await;
        match result {
            Ok(url) => url,
            Err(err) => {
                warn!(error = %err, "image generation failed, using placeholder");
                PLACEHOLDER_IMAGE.to_owned()
            }
        }
    }

    /// Rewrite a raw scene idea into a fully-specified visual description.
    ///
    /// `examples` are prior (request, refined) pairs — at most two — used as
    /// in-context examples for style consistency. On failure the raw
    /// `fallback` text is returned unchanged; this never errors.
    pub async fn refine(
        &self,
        system_prompt: &str,
        examples: &[(String, String)],
        request: &str,
        fallback: &str,
    ) -> String {
        let mut messages: Vec<ChatMessage> = vec![system(system_prompt)];
        for (raw, refined) in examples.iter().take(2) {
            messages.push(user(raw.clone()));
            messages.push(assistant(refined.clone()));
        }
        messages.push(user(request));

        match self.text.complete(&messages).await {
            Ok(refined) if !refined.trim().is_empty() => refined,
            Ok(_) => fallback.to_owned(),
            Err(err) => {
                warn!(error = %err, "refinement failed, keeping raw description");
                fallback.to_owned()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use storybox_services::TextStream;

    struct FlakyGenerator {
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl ImageGenerator for FlakyGenerator {
        async fn generate(&self, prompt: &str, _size: ImageSize) -> Result<String, ServiceError> {
            if self.failures_left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                n.checked_sub(1)
            }).is_ok()
            {
                return Err(ServiceError::RateLimited {
                    retry_after_ms: 1,
                    message: "429".into(),
                });
            }
            Ok(format!("https://img/{}", prompt.len()))
        }
    }

    struct ScriptedCompleter {
        replies: Mutex<Vec<Result<String, ServiceError>>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    #[async_trait]
    impl TextCompleter for ScriptedCompleter {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError> {
            self.seen.lock().push(messages.to_vec());
            self.replies.lock().remove(0)
        }

        async fn complete_json(&self, messages: &[ChatMessage]) -> Result<String, ServiceError> {
            self.complete(messages).await
        }

        fn complete_stream(&self, _messages: &[ChatMessage]) -> TextStream {
            futures::stream::empty().boxed()
        }
    }

    fn pipeline(generator: FlakyGenerator, completer: Arc<ScriptedCompleter>) -> AssetPipeline {
        AssetPipeline::new(
            Arc::new(generator),
            completer,
            RetryConfig {
                base_delay_ms: 1,
                max_delay_ms: 2,
                ..RetryConfig::default()
            },
        )
    }

    fn scripted(replies: Vec<Result<String, ServiceError>>) -> Arc<ScriptedCompleter> {
        Arc::new(ScriptedCompleter {
            replies: Mutex::new(replies),
            seen: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn rate_limits_are_retried() {
        let pipeline = pipeline(
            FlakyGenerator {
                failures_left: AtomicU32::new(2),
            },
            scripted(Vec::new()),
        );
        let url = pipeline
            .render_image("a duck", Some("claymation style"), ImageSize::SCENE)
            .await;
        assert!(url.starts_with("https://img/"));
    }

    #[tokio::test]
    async fn terminal_failure_yields_placeholder() {
        let pipeline = pipeline(
            FlakyGenerator {
                failures_left: AtomicU32::new(u32::MAX),
            },
            scripted(Vec::new()),
        );
        let url = pipeline.render_image("a duck", None, ImageSize::SCENE).await;
        assert_eq!(url, PLACEHOLDER_IMAGE);
    }

    #[tokio::test]
    async fn refine_sends_few_shot_pairs_in_order() {
        let completer = scripted(vec![Ok("a duck under dramatic storm light".into())]);
        let pipeline = pipeline(
            FlakyGenerator {
                failures_left: AtomicU32::new(0),
            },
            completer.clone(),
        );

        let examples = vec![
            ("raw one".to_owned(), "refined one".to_owned()),
            ("raw two".to_owned(), "refined two".to_owned()),
        ];
        let refined = pipeline
            .refine("you are an illustrator", &examples, "raw three", "raw three")
            .await;
        assert_eq!(refined, "a duck under dramatic storm light");

        let seen = completer.seen.lock();
        let messages = &seen[0];
        assert_eq!(messages.len(), 6, "system + 2 example pairs + request");
        assert_eq!(messages[1].content, "raw one");
        assert_eq!(messages[2].content, "refined one");
        assert_eq!(messages[5].content, "raw three");
    }

    #[tokio::test]
    async fn refine_falls_back_to_raw_description() {
        let completer = scripted(vec![Err(ServiceError::other("down"))]);
        let pipeline = pipeline(
            FlakyGenerator {
                failures_left: AtomicU32::new(0),
            },
            completer,
        );
        let refined = pipeline
            .refine("sys", &[], "idea", "the raw illustration idea")
            .await;
        assert_eq!(refined, "the raw illustration idea");
    }
}
