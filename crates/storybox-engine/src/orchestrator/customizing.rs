//! Customizing stage: map daily objects to story characters.
//!
//! The tool surface is re-derived whenever the character list or the vision
//! description changes, so the agent's instructions always reflect what has
//! been agreed so far. `start_story` only joins the surface once at least one
//! character exists.

use std::sync::Arc;

use futures::StreamExt;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use storybox_core::{
    AssetSlot, CharacterId, Stage, StoryCharacter, decode_with_fallback,
    tools::ParameterSchema,
};
use storybox_services::ImageSize;
use storybox_tools::{FnTool, StoryTool, parse_args};

use super::Inner;
use crate::prompts;

pub(super) fn enter(inner: &Arc<Inner>, epoch: u64, cancel: CancellationToken) {
    super::spawn_vision_updates(inner, epoch, cancel.clone());
    spawn_tool_derivation(inner, epoch, cancel);
}

fn spawn_tool_derivation(inner: &Arc<Inner>, epoch: u64, cancel: CancellationToken) {
    let inner = inner.clone();
    let _ = tokio::spawn(async move {
        let snapshots = inner
            .store
            .observe_distinct_by(|s| (s.characters.clone(), s.vision.clone()));
        futures::pin_mut!(snapshots);
        loop {
            let session = tokio::select! {
                () = cancel.cancelled() => break,
                next = snapshots.next() => match next {
                    Some(session) => session,
                    None => break,
                },
            };
            let mut tools = vec![
                create_character_tool(&inner, epoch, &cancel),
                change_character_tool(&inner, epoch, &cancel),
                remove_character_tool(&inner, epoch),
            ];
            if !session.characters.is_empty() {
                tools.push(start_story_tool(&inner));
            }
            if let Err(err) = inner
                .commit_surface(epoch, tools, prompts::customizing_instructions(&session))
                .await
            {
                warn!(error = %err, "customizing tool derivation failed");
            }
        }
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool argument shapes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCharacterArgs {
    daily_object: String,
    character_name: String,
    character_backstory: String,
    character_visual_sketch: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveCharacterArgs {
    character_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeCharacterArgs {
    previous_character_name: String,
    update: CharacterUpdate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CharacterUpdate {
    character_name: String,
    character_backstory: String,
    character_visual_sketch: String,
}

const VISUAL_SKETCH_DESC: &str = "Detailed visual description of the character, including age, \
     ethnicity, gender, skin color, facial features, body build, hair style and color, \
     clothing, accessories etc";

// ─────────────────────────────────────────────────────────────────────────────
// Tools
// ─────────────────────────────────────────────────────────────────────────────

fn create_character_tool(
    inner: &Arc<Inner>,
    epoch: u64,
    cancel: &CancellationToken,
) -> Arc<dyn StoryTool> {
    let inner = inner.clone();
    let cancel = cancel.clone();
    FnTool::new(
        "create_character",
        "Create a character in the story",
        ParameterSchema::object(&[
            ("dailyObject", "The real world object the user has shown"),
            ("characterName", "The name of the character in the story"),
            (
                "characterBackstory",
                "Backstory, personality, origin of the character",
            ),
            ("characterVisualSketch", VISUAL_SKETCH_DESC),
        ]),
        move |args| {
            let inner = inner.clone();
            let cancel = cancel.clone();
            async move {
                let args: CreateCharacterArgs = parse_args("create_character", args)?;
                let id = CharacterId::new();
                if inner
                    .guarded_update(epoch, |session| {
                        session.characters.push(StoryCharacter {
                            id: id.clone(),
                            daily_object: args.daily_object.clone(),
                            character_name: args.character_name.clone(),
                            backstory: args.character_backstory.clone(),
                            visual_sketch: args.character_visual_sketch.clone(),
                            image: AssetSlot::Pending,
                        });
                    })
                    .is_none()
                {
                    return Ok("The character workshop has already moved on.".to_owned());
                }
                spawn_portrait(&inner, epoch, &cancel, id, args.character_visual_sketch);
                Ok(format!(
                    "Character added: {} represents {} ({})",
                    args.daily_object, args.character_name, args.character_backstory
                ))
            }
        },
    )
}

fn change_character_tool(
    inner: &Arc<Inner>,
    epoch: u64,
    cancel: &CancellationToken,
) -> Arc<dyn StoryTool> {
    let inner = inner.clone();
    let cancel = cancel.clone();
    FnTool::new(
        "change_character",
        "Change a character in the story",
        ParameterSchema::object(&[(
            "previousCharacterName",
            "The current name of the character in the story",
        )])
        .with_object(
            "update",
            "The updated name, backstory, and visual sketch of the character",
            &[
                ("characterName", "The name of the character in the story"),
                (
                    "characterBackstory",
                    "Backstory, personality, origin of the character",
                ),
                ("characterVisualSketch", VISUAL_SKETCH_DESC),
            ],
        ),
        move |args| {
            let inner = inner.clone();
            let cancel = cancel.clone();
            async move {
                let args: ChangeCharacterArgs = parse_args("change_character", args)?;
                let session = inner.store.snapshot();
                let Some(existing) = session.character_by_name(&args.previous_character_name)
                else {
                    return Ok("Character not found".to_owned());
                };
                let id = existing.id.clone();
                let daily_object = existing.daily_object.clone();
                if inner
                    .guarded_update(epoch, |session| {
                        if let Some(character) =
                            session.characters.iter_mut().find(|c| c.id == id)
                        {
                            character.character_name.clone_from(&args.update.character_name);
                            character.backstory.clone_from(&args.update.character_backstory);
                            character
                                .visual_sketch
                                .clone_from(&args.update.character_visual_sketch);
                        }
                    })
                    .is_none()
                {
                    return Ok("The character workshop has already moved on.".to_owned());
                }
                spawn_portrait(&inner, epoch, &cancel, id, args.update.character_visual_sketch);
                Ok(format!(
                    "Character changed: {daily_object} now represents {} in the story.",
                    args.update.character_name
                ))
            }
        },
    )
}

fn remove_character_tool(inner: &Arc<Inner>, epoch: u64) -> Arc<dyn StoryTool> {
    let inner = inner.clone();
    FnTool::new(
        "remove_character",
        "Remove a character in the story",
        ParameterSchema::object(&[("characterName", "The name of the character in the story")]),
        move |args| {
            let inner = inner.clone();
            async move {
                let args: RemoveCharacterArgs = parse_args("remove_character", args)?;
                let session = inner.store.snapshot();
                if session.character_by_name(&args.character_name).is_none() {
                    return Ok("Character not found".to_owned());
                }
                let _ = inner.guarded_update(epoch, |session| {
                    session
                        .characters
                        .retain(|c| c.character_name != args.character_name);
                });
                Ok(format!("Character {} is removed.", args.character_name))
            }
        },
    )
}

fn start_story_tool(inner: &Arc<Inner>) -> Arc<dyn StoryTool> {
    let inner = inner.clone();
    FnTool::new(
        "start_story",
        "Start the story",
        ParameterSchema::empty(),
        move |_args| {
            let inner = inner.clone();
            async move {
                // The transition never waits on the summary. Generation
                // crosses the stage boundary, so it runs outside the stage
                // token and patches the story in afterwards.
                inner.change_stage(Stage::Editing);
                let _ = tokio::spawn(async move {
                    let session = inner.store.snapshot();
                    let story = generate_story(&inner, &session).await;
                    if story.is_empty() {
                        warn!("story generation produced nothing");
                        let _ = inner
                            .channel
                            .send_user_message(
                                "The story could not be generated. Ask the user to adjust the \
                                 characters and try again.",
                            )
                            .await;
                        return;
                    }
                    inner
                        .history
                        .lock()
                        .push(format!("User: I'm creating scenes for the story: {story}"));
                    let _ = inner.store.update(|session| {
                        // A session reset in the meantime must not regain it.
                        if matches!(session.stage, Stage::Editing | Stage::Trailer) {
                            session.story = story;
                        }
                    });
                });
                Ok("Tell the user the story will start now.".to_owned())
            }
        },
    )
}

#[derive(Debug, Default, Deserialize)]
struct StoryPayload {
    #[serde(default)]
    story: String,
}

async fn generate_story(inner: &Inner, session: &storybox_core::StorySession) -> String {
    let messages = prompts::story_summary(&session.characters);
    match inner.text.complete_json(&messages).await {
        Ok(json) => decode_with_fallback::<StoryPayload>(&json, StoryPayload::default())
            .into_value()
            .story,
        Err(err) => {
            warn!(error = %err, "story summary generation failed");
            String::new()
        }
    }
}

/// Render a portrait for `id` and patch it in, unless the sketch was replaced
/// while the render was in flight.
fn spawn_portrait(
    inner: &Arc<Inner>,
    epoch: u64,
    cancel: &CancellationToken,
    id: CharacterId,
    sketch: String,
) {
    let inner = inner.clone();
    let cancel = cancel.clone();
    let _ = tokio::spawn(async move {
        let style = prompts::render_style(inner.store.snapshot().style);
        let prompt = prompts::character_portrait(&sketch);
        let url = tokio::select! {
            () = cancel.cancelled() => return,
            url = inner.assets.render_image(&prompt, Some(style), ImageSize::PORTRAIT) => url,
        };
        let _ = inner.guarded_update(epoch, |session| {
            if let Some(character) = session.characters.iter_mut().find(|c| c.id == id) {
                if character.visual_sketch == sketch {
                    character.image = AssetSlot::Generated(url);
                }
            }
        });
    });
}
