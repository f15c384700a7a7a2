//! The session store.
//!
//! One [`StorySession`] value behind a watch channel. Readers either take a
//! snapshot or observe a derived stream; writers replace the record through
//! [`StoryStateStore::update`]. Change detection for observers is
//! distinct-by-serialized-key, so a re-derivation only fires when the part of
//! the session it keys on actually changed.

use async_stream::stream;
use futures::Stream;
use serde::Serialize;
use tokio::sync::watch;

use storybox_core::{Stage, StorySession};

/// Shared, observable holder of the session record.
pub struct StoryStateStore {
    tx: watch::Sender<StorySession>,
}

impl StoryStateStore {
    /// Create a store holding `initial`.
    #[must_use]
    pub fn new(initial: StorySession) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Clone of the current session record.
    #[must_use]
    pub fn snapshot(&self) -> StorySession {
        self.tx.borrow().clone()
    }

    /// Mutate the session in place and notify observers. Returns the record
    /// as it stands after the mutation.
    pub fn update(&self, mutate: impl FnOnce(&mut StorySession)) -> StorySession {
        let mut after = None;
        self.tx.send_modify(|session| {
            mutate(session);
            after = Some(session.clone());
        });
        after.unwrap_or_else(|| self.snapshot())
    }

    /// Raw watch subscription.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StorySession> {
        self.tx.subscribe()
    }

    /// Stream of stage values, deduplicated, starting with the current stage.
    pub fn observe_stage(&self) -> impl Stream<Item = Stage> + Send + use<> {
        let mut rx = self.tx.subscribe();
        stream! {
            let mut last: Option<Stage> = None;
            loop {
                let stage = rx.borrow_and_update().stage;
                if last != Some(stage) {
                    last = Some(stage);
                    yield stage;
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }
    }

    /// Stream of session snapshots, emitted only when the serialized key
    /// changes. Emits the current snapshot immediately.
    pub fn observe_distinct_by<K, F>(
        &self,
        key: F,
    ) -> impl Stream<Item = StorySession> + Send + use<K, F>
    where
        K: Serialize,
        F: Fn(&StorySession) -> K + Send + 'static,
    {
        let mut rx = self.tx.subscribe();
        stream! {
            let mut last: Option<String> = None;
            loop {
                let snapshot = rx.borrow_and_update().clone();
                let current = serde_json::to_string(&key(&snapshot)).unwrap_or_default();
                if last.as_deref() != Some(current.as_str()) {
                    last = Some(current);
                    yield snapshot;
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }
    }
}

impl Default for StoryStateStore {
    fn default() -> Self {
        Self::new(StorySession::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use storybox_core::StoryCharacter;

    #[tokio::test]
    async fn update_returns_the_post_state() {
        let store = StoryStateStore::default();
        let after = store.update(|s| s.story = "once upon a time".into());
        assert_eq!(after.story, "once upon a time");
        assert_eq!(store.snapshot().story, "once upon a time");
    }

    #[tokio::test]
    async fn observe_stage_dedupes_and_emits_current_first() {
        let store = StoryStateStore::default();
        let mut stages = Box::pin(store.observe_stage());
        assert_eq!(stages.next().await, Some(Stage::New));

        // A non-stage change must not re-emit the stage.
        let _ = store.update(|s| s.vision = "a rubber duck".into());
        let _ = store.update(|s| s.stage = Stage::Customizing);
        assert_eq!(stages.next().await, Some(Stage::Customizing));
    }

    #[tokio::test]
    async fn distinct_by_fires_only_on_key_changes() {
        let store = StoryStateStore::default();
        let mut characters =
            Box::pin(store.observe_distinct_by(|s| s.characters.clone()));

        // Initial emission carries the current snapshot.
        let first = characters.next().await.unwrap();
        assert!(first.characters.is_empty());

        let _ = store.update(|s| s.vision = "unrelated".into());
        let _ = store.update(|s| {
            s.characters.push(StoryCharacter {
                id: storybox_core::CharacterId::new(),
                daily_object: "rubber duck".into(),
                character_name: "Ducky".into(),
                backstory: "loves to sing".into(),
                visual_sketch: "a yellow duck".into(),
                image: storybox_core::AssetSlot::Pending,
            });
        });

        let second = characters.next().await.unwrap();
        assert_eq!(second.characters.len(), 1, "vision change was skipped");
    }
}
