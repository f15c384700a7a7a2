//! Editing stage: develop the story scene by scene.
//!
//! Scene entries are appended to the session inside the tool handler, before
//! any refinement or rendering starts, so narrative order always equals the
//! order the agent called the tool in. The async pipeline then patches the
//! entry it created by index, guarded by the narration it was created with.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use storybox_core::{
    AssetSlot, Stage, StoryGuest, StoryScene, StorySession, tools::ParameterSchema,
};
use storybox_services::{ImageSize, JsonArrayStream};
use storybox_tools::{FnTool, StoryTool, parse_args};

use super::Inner;
use crate::prompts;

const OPENING_NUDGE_DELAY: Duration = Duration::from_secs(1);

pub(super) fn enter(inner: &Arc<Inner>, epoch: u64, cancel: CancellationToken) {
    super::spawn_vision_updates(inner, epoch, cancel.clone());
    spawn_opening_nudge(inner, cancel.clone());
    spawn_guest_generation(inner, epoch, cancel.clone());
    spawn_tool_derivation(inner, epoch, cancel);
}

/// Kick the agent into producing the first scene shortly after entry.
fn spawn_opening_nudge(inner: &Arc<Inner>, cancel: CancellationToken) {
    let inner = inner.clone();
    let _ = tokio::spawn(async move {
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(OPENING_NUDGE_DELAY) => {}
        }
        if let Err(err) = inner
            .channel
            .send_user_message("Please use add_next_scene to create the opening scene now")
            .await
        {
            warn!(error = %err, "opening nudge failed");
            return;
        }
        if let Err(err) = inner.channel.create_response().await {
            warn!(error = %err, "opening response request failed");
        }
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Guest generation
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GeneratedGuest {
    name: String,
    background: String,
}

/// Seed the audience roster immediately, then enrich each guest's background
/// as elements of the streamed JSON array complete.
fn spawn_guest_generation(inner: &Arc<Inner>, epoch: u64, cancel: CancellationToken) {
    let inner = inner.clone();
    let _ = tokio::spawn(async move {
        if inner.guest_seeds.is_empty() {
            return;
        }
        let seeded: Vec<StoryGuest> = inner
            .guest_seeds
            .iter()
            .map(|seed| StoryGuest {
                name: seed.name.clone(),
                background: "General audience".to_owned(),
                expression: "smile".to_owned(),
            })
            .collect();
        if inner
            .guarded_update(epoch, |session| session.guests = seeded)
            .is_none()
        {
            return;
        }

        let session = inner.store.snapshot();
        let messages = prompts::guest_generation(&session.characters, &inner.guest_seeds);
        let mut stream = inner.text.complete_stream(&messages);
        let mut parser = JsonArrayStream::new("guests");
        loop {
            let chunk = tokio::select! {
                () = cancel.cancelled() => return,
                chunk = stream.next() => match chunk {
                    Some(Ok(chunk)) => chunk,
                    Some(Err(err)) => {
                        warn!(error = %err, "guest background stream failed");
                        break;
                    }
                    None => break,
                },
            };
            for value in parser.push(&chunk) {
                let guest: GeneratedGuest = match serde_json::from_value(value) {
                    Ok(guest) => guest,
                    Err(err) => {
                        warn!(error = %err, "skipping malformed guest element");
                        continue;
                    }
                };
                let _ = inner.guarded_update(epoch, |session| {
                    if let Some(existing) =
                        session.guests.iter_mut().find(|g| g.name == guest.name)
                    {
                        existing.background.clone_from(&guest.background);
                    }
                });
            }
        }
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool derivation
// ─────────────────────────────────────────────────────────────────────────────

fn spawn_tool_derivation(inner: &Arc<Inner>, epoch: u64, cancel: CancellationToken) {
    let inner = inner.clone();
    let _ = tokio::spawn(async move {
        let snapshots = inner
            .store
            .observe_distinct_by(|s| (s.scenes.clone(), s.vision.clone(), s.story.clone()));
        futures::pin_mut!(snapshots);
        loop {
            let session = tokio::select! {
                () = cancel.cancelled() => break,
                next = snapshots.next() => match next {
                    Some(session) => session,
                    None => break,
                },
            };
            let tools = vec![
                add_next_scene_tool(&inner, epoch, &cancel),
                edit_current_scene_tool(&inner, epoch, &cancel),
                convert_to_trailer_tool(&inner),
            ];
            if let Err(err) = inner
                .commit_surface(epoch, tools, prompts::editing_instructions(&session))
                .await
            {
                warn!(error = %err, "editing tool derivation failed");
            }
        }
    });
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SceneArgs {
    narration: String,
    illustration: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditSceneArgs {
    update: SceneArgs,
}

/// Prior scenes used as few-shot examples for the refinement pass.
fn few_shot_examples(scenes: &[StoryScene]) -> Vec<(String, String)> {
    scenes
        .iter()
        .filter(|scene| !scene.narration.is_empty() && !scene.refined_caption.is_empty())
        .take(2)
        .map(|scene| {
            (
                prompts::storyboard_user(&scene.narration, &scene.caption),
                scene.refined_caption.clone(),
            )
        })
        .collect()
}

fn add_next_scene_tool(
    inner: &Arc<Inner>,
    epoch: u64,
    cancel: &CancellationToken,
) -> Arc<dyn StoryTool> {
    let inner = inner.clone();
    let cancel = cancel.clone();
    FnTool::new(
        "add_next_scene",
        "Continue the story with a new scene",
        ParameterSchema::object(&[
            (
                "narration",
                "The story narration for the scene in one short sentence",
            ),
            (
                "illustration",
                "Describe a visual scene that complements or augments the narration in one \
                 concise sentence",
            ),
        ]),
        move |args| {
            let inner = inner.clone();
            let cancel = cancel.clone();
            async move {
                let args: SceneArgs = parse_args("add_next_scene", args)?;
                let session = inner.store.snapshot();
                let examples = few_shot_examples(&session.scenes);

                let Some(after) = inner.guarded_update(epoch, |session| {
                    session.scenes.push(StoryScene {
                        narration: args.narration.clone(),
                        caption: args.illustration.clone(),
                        refined_caption: String::new(),
                        image: AssetSlot::Pending,
                    });
                }) else {
                    return Ok("The editing session has already moved on.".to_owned());
                };
                let index = after.scenes.len() - 1;
                let position = index + 1;
                inner
                    .history
                    .lock()
                    .push(format!("User: I added scene {position}: {}", args.narration));

                spawn_scene_pipeline(
                    &inner,
                    epoch,
                    &cancel,
                    index,
                    session.characters.clone(),
                    args.narration.clone(),
                    args.illustration,
                    examples,
                );
                Ok(format!(
                    "Scene {position} created. You must now respond with the narration: \"{}\"",
                    args.narration
                ))
            }
        },
    )
}

fn edit_current_scene_tool(
    inner: &Arc<Inner>,
    epoch: u64,
    cancel: &CancellationToken,
) -> Arc<dyn StoryTool> {
    let inner = inner.clone();
    let cancel = cancel.clone();
    FnTool::new(
        "edit_current_scene",
        "Edit the current scene",
        ParameterSchema::empty().with_object(
            "update",
            "The updated narration and illustration for the current scene",
            &[
                (
                    "narration",
                    "The story narration for the scene in one short sentence",
                ),
                (
                    "illustration",
                    "Describe a visual scene that complements or augments the narration in one \
                     concise sentence",
                ),
            ],
        ),
        move |args| {
            let inner = inner.clone();
            let cancel = cancel.clone();
            async move {
                let args: EditSceneArgs = parse_args("edit_current_scene", args)?;
                let session = inner.store.snapshot();
                if session.scenes.is_empty() {
                    return Ok("There is no scene to edit yet.".to_owned());
                }
                let index = session.scenes.len() - 1;
                let examples = few_shot_examples(&session.scenes[..index]);

                if inner
                    .guarded_update(epoch, |session| {
                        if let Some(scene) = session.scenes.get_mut(index) {
                            scene.narration.clone_from(&args.update.narration);
                            scene.caption.clone_from(&args.update.illustration);
                            scene.refined_caption.clear();
                            scene.image = AssetSlot::Pending;
                        }
                    })
                    .is_none()
                {
                    return Ok("The editing session has already moved on.".to_owned());
                }
                let position = index + 1;
                inner.history.lock().push(format!(
                    "User: I updated scene {position}: {}",
                    args.update.narration
                ));

                spawn_scene_pipeline(
                    &inner,
                    epoch,
                    &cancel,
                    index,
                    session.characters.clone(),
                    args.update.narration,
                    args.update.illustration,
                    examples,
                );
                Ok(format!("Scene {position} updated."))
            }
        },
    )
}

fn convert_to_trailer_tool(inner: &Arc<Inner>) -> Arc<dyn StoryTool> {
    let inner = inner.clone();
    FnTool::new(
        "convert_to_trailer",
        "Turn the story into a movie trailer",
        ParameterSchema::empty(),
        move |_args| {
            let inner = inner.clone();
            async move {
                inner.change_stage(Stage::Trailer);
                Ok("Done. Concisely let the user sit back and enjoy the trailer. Don't spoil it"
                    .to_owned())
            }
        },
    )
}

/// Refine the illustration idea, then render it, patching the scene entry at
/// `index` after each step. Patches only land while the entry still carries
/// the narration this pipeline was started for.
#[allow(clippy::too_many_arguments)]
fn spawn_scene_pipeline(
    inner: &Arc<Inner>,
    epoch: u64,
    cancel: &CancellationToken,
    index: usize,
    characters: Vec<storybox_core::StoryCharacter>,
    narration: String,
    illustration: String,
    examples: Vec<(String, String)>,
) {
    let inner = inner.clone();
    let cancel = cancel.clone();
    let _ = tokio::spawn(async move {
        let run = async {
            let style = prompts::render_style(inner.store.snapshot().style);
            let system_prompt = prompts::storyboard_system(&characters);
            let request = prompts::storyboard_user(&narration, &illustration);
            let refined = inner
                .assets
                .refine(&system_prompt, &examples, &request, &illustration)
                .await;
            let _ = inner.guarded_update(epoch, |session| {
                patch_scene(session, index, &narration, |scene| {
                    scene.refined_caption.clone_from(&refined);
                });
            });

            let url = inner
                .assets
                .render_image(&refined, Some(style), ImageSize::SCENE)
                .await;
            let _ = inner.guarded_update(epoch, |session| {
                patch_scene(session, index, &narration, |scene| {
                    scene.image = AssetSlot::Generated(url.clone());
                });
            });
        };
        tokio::select! {
            () = cancel.cancelled() => {}
            () = run => {}
        }
    });
}

fn patch_scene(
    session: &mut StorySession,
    index: usize,
    narration: &str,
    apply: impl FnOnce(&mut StoryScene),
) {
    if let Some(scene) = session.scenes.get_mut(index) {
        if scene.narration == narration {
            apply(scene);
        }
    }
}
