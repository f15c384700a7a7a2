//! Trailer sequencing.
//!
//! The sequencer streams a trailer script and builds beats incrementally: a
//! synthetic cover beat opens the trailer immediately, each streamed scene
//! fans out reaction and render generation, and the ending beat (empty
//! description) carries the movie-name announcement. Playback advances
//! automatically once the current beat has played and the next beat is ready
//! (image settled and reactions present), and may also be driven manually.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use storybox_assets::{AssetPipeline, VoiceQueue};
use storybox_core::{
    AssetSlot, StorySession, TrailerBeat, VoiceTrack, decode_with_fallback,
};
use storybox_services::{ImageSize, JsonArrayStream, TextCompleter};

use crate::prompts;
use crate::store::StoryStateStore;
use crate::voices::{CHARACTER_FALLBACK_VOICE, NARRATOR_VOICE, voice_id_for_actor};

/// Pause between voice tracks within a beat.
const TRACK_PAUSE: Duration = Duration::from_millis(500);

type VoiceCast = Arc<OnceCell<HashMap<String, String>>>;

/// Generates and plays the trailer for a finished story.
pub struct TrailerSequencer {
    store: Arc<StoryStateStore>,
    text: Arc<dyn TextCompleter>,
    assets: Arc<AssetPipeline>,
    voices: Arc<VoiceQueue>,
    cancel: CancellationToken,
    /// Speaker-to-voice map, cast lazily on the first spoken line.
    cast: VoiceCast,
}

impl TrailerSequencer {
    /// Build a sequencer over the session in `store`. Nothing runs until
    /// [`TrailerSequencer::start`]; cancelling the token stops everything.
    #[must_use]
    pub fn new(
        store: Arc<StoryStateStore>,
        text: Arc<dyn TextCompleter>,
        assets: Arc<AssetPipeline>,
        voices: Arc<VoiceQueue>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            text,
            assets,
            voices,
            cancel,
            cast: Arc::new(OnceCell::new()),
        }
    }

    /// Start script generation, voiceover playback, and auto-advance.
    pub fn start(&self) {
        self.spawn_script_generation();
        self.spawn_voiceover();
        self.spawn_auto_advance();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Script generation
    // ─────────────────────────────────────────────────────────────────────

    fn spawn_script_generation(&self) {
        let store = self.store.clone();
        let text = self.text.clone();
        let assets = self.assets.clone();
        let cancel = self.cancel.clone();
        let _ = tokio::spawn(async move {
            let session = store.snapshot();

            // The cover opens the trailer immediately: active and already
            // "played" so auto-advance moves on as soon as beat 1 is ready.
            let cover = TrailerBeat {
                description: prompts::cover_description(&session.characters),
                image: AssetSlot::Absent,
                voice_tracks: Vec::new(),
                reactions: None,
                is_active: true,
                played: true,
                is_cover: true,
                is_ending: false,
            };
            let _ = store.update(|s| s.trailer.push(cover.clone()));
            spawn_reactions(&store, &text, &cancel, 0, cover);

            let messages = prompts::trailer_script(&session);
            let mut stream = text.complete_stream(&messages);
            let mut parser = JsonArrayStream::new("scenes");
            loop {
                let chunk = tokio::select! {
                    () = cancel.cancelled() => return,
                    chunk = stream.next() => match chunk {
                        Some(Ok(chunk)) => chunk,
                        Some(Err(err)) => {
                            warn!(error = %err, "trailer script stream failed");
                            break;
                        }
                        None => break,
                    },
                };
                for value in parser.push(&chunk) {
                    let scene: ScriptScene = match serde_json::from_value(value) {
                        Ok(scene) => scene,
                        Err(err) => {
                            warn!(error = %err, "skipping malformed trailer scene");
                            continue;
                        }
                    };
                    let is_ending = scene.scene_description.is_empty();
                    let beat = TrailerBeat {
                        description: scene.scene_description.clone(),
                        image: if is_ending {
                            AssetSlot::Absent
                        } else {
                            AssetSlot::Pending
                        },
                        voice_tracks: scene.voice_tracks,
                        reactions: None,
                        is_active: false,
                        played: false,
                        is_cover: false,
                        is_ending,
                    };
                    let after = store.update(|s| s.trailer.push(beat.clone()));
                    let index = after.trailer.len() - 1;
                    debug!(index, is_ending, "trailer beat received");

                    spawn_reactions(&store, &text, &cancel, index, beat);
                    if !is_ending {
                        spawn_render(
                            &store,
                            &assets,
                            &cancel,
                            index,
                            scene.scene_description,
                            session.characters.clone(),
                        );
                    }
                }
            }

            // The movie name trails the array and only parses with the
            // finished document.
            let movie_name = parser
                .finish()
                .as_ref()
                .and_then(|doc| doc.get("movieName"))
                .and_then(Value::as_str)
                .unwrap_or("The End")
                .to_owned();
            let _ = store.update(|s| s.movie_name = movie_name);
        });
    }

    // ─────────────────────────────────────────────────────────────────────
    // Voiceover
    // ─────────────────────────────────────────────────────────────────────

    fn spawn_voiceover(&self) {
        let store = self.store.clone();
        let text = self.text.clone();
        let voices = self.voices.clone();
        let cancel = self.cancel.clone();
        let cast = self.cast.clone();
        let _ = tokio::spawn(async move {
            let actives = store.observe_distinct_by(StorySession::active_beat_index);
            futures::pin_mut!(actives);
            let mut playback: Option<CancellationToken> = None;
            loop {
                let session = tokio::select! {
                    () = cancel.cancelled() => break,
                    next = actives.next() => match next {
                        Some(session) => session,
                        None => break,
                    },
                };
                // A new active beat cuts off the previous beat's playback.
                if let Some(stale) = playback.take() {
                    stale.cancel();
                }
                let Some(index) = session.active_beat_index() else {
                    continue;
                };
                let beat = session.trailer[index].clone();
                if beat.played {
                    continue;
                }
                let token = cancel.child_token();
                playback = Some(token.clone());
                let _ = tokio::spawn(play_beat(
                    store.clone(),
                    text.clone(),
                    voices.clone(),
                    cast.clone(),
                    token,
                    index,
                    beat,
                ));
            }
        });
    }

    // ─────────────────────────────────────────────────────────────────────
    // Auto-advance
    // ─────────────────────────────────────────────────────────────────────

    fn spawn_auto_advance(&self) {
        let store = self.store.clone();
        let cancel = self.cancel.clone();
        let _ = tokio::spawn(async move {
            let cursor = store.observe_distinct_by(|s| {
                let current = s.active_beat_index();
                (
                    current,
                    current.map(|i| s.trailer[i].played),
                    current
                        .and_then(|i| s.trailer.get(i + 1))
                        .map(TrailerBeat::is_playable),
                    s.trailer_ended(),
                )
            });
            futures::pin_mut!(cursor);
            loop {
                let session = tokio::select! {
                    () = cancel.cancelled() => break,
                    next = cursor.next() => match next {
                        Some(session) => session,
                        None => break,
                    },
                };
                if session.trailer_ended() {
                    debug!("trailer ended");
                    break;
                }
                let Some(current) = session.active_beat_index() else {
                    continue;
                };
                if !session.trailer[current].played {
                    continue;
                }
                let next = current + 1;
                if !session.trailer.get(next).is_some_and(TrailerBeat::is_playable) {
                    continue;
                }
                debug!(next, "auto-advancing trailer");
                let _ = store.update(|s| activate(s, next));
            }
        });
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScriptScene {
    #[serde(default)]
    scene_description: String,
    #[serde(default)]
    voice_tracks: Vec<VoiceTrack>,
}

#[derive(Debug, Default, Deserialize)]
struct ReactionsPayload {
    #[serde(default)]
    reactions: Vec<storybox_core::Reaction>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CastingPayload {
    #[serde(default)]
    matches: Vec<CastingMatch>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CastingMatch {
    story_character_name: String,
    voice_actor_name: String,
}

/// Generate audience reactions for the beat at `index`. Failure settles the
/// slot with an empty list so readiness is never blocked.
fn spawn_reactions(
    store: &Arc<StoryStateStore>,
    text: &Arc<dyn TextCompleter>,
    cancel: &CancellationToken,
    index: usize,
    beat: TrailerBeat,
) {
    let store = store.clone();
    let text = text.clone();
    let cancel = cancel.clone();
    let _ = tokio::spawn(async move {
        let run = async {
            let messages = prompts::beat_reactions(&beat);
            let reactions = match text.complete_json(&messages).await {
                Ok(json) => {
                    decode_with_fallback::<ReactionsPayload>(&json, ReactionsPayload::default())
                        .into_value()
                        .reactions
                }
                Err(err) => {
                    warn!(index, error = %err, "reaction generation failed");
                    Vec::new()
                }
            };
            let _ = store.update(|s| {
                if let Some(beat) = s.trailer.get_mut(index) {
                    beat.reactions = Some(reactions);
                }
            });
        };
        tokio::select! {
            () = cancel.cancelled() => {}
            () = run => {}
        }
    });
}

/// Refine and render the still frame for the beat at `index`.
fn spawn_render(
    store: &Arc<StoryStateStore>,
    assets: &Arc<AssetPipeline>,
    cancel: &CancellationToken,
    index: usize,
    description: String,
    characters: Vec<storybox_core::StoryCharacter>,
) {
    let store = store.clone();
    let assets = assets.clone();
    let cancel = cancel.clone();
    let _ = tokio::spawn(async move {
        let run = async {
            let style = prompts::render_style(store.snapshot().style);
            let system_prompt = prompts::storyboard_system(&characters);
            let refined = assets
                .refine(&system_prompt, &[], &description, &description)
                .await;
            let url = assets
                .render_image(&prompts::trailer_render(&refined), Some(style), ImageSize::TRAILER)
                .await;
            let _ = store.update(|s| {
                if let Some(beat) = s.trailer.get_mut(index) {
                    if beat.description == description {
                        beat.image = AssetSlot::Generated(url);
                    }
                }
            });
        };
        tokio::select! {
            () = cancel.cancelled() => {}
            () = run => {}
        }
    });
}

/// Play every voice track of `beat` in order, then mark it played.
async fn play_beat(
    store: Arc<StoryStateStore>,
    text: Arc<dyn TextCompleter>,
    voices: Arc<VoiceQueue>,
    cast: VoiceCast,
    cancel: CancellationToken,
    index: usize,
    beat: TrailerBeat,
) {
    for track in &beat.voice_tracks {
        let voice = resolve_voice(&store, &text, &cast, &track.speaker).await;
        let done = voices.enqueue(&track.utterance, &voice);
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = done => {}
        }
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(TRACK_PAUSE) => {}
        }
    }
    let _ = store.update(|s| {
        if let Some(beat) = s.trailer.get_mut(index) {
            beat.played = true;
        }
    });
}

/// Resolve a track speaker to a vendor voice, casting the roster on first use.
async fn resolve_voice(
    store: &Arc<StoryStateStore>,
    text: &Arc<dyn TextCompleter>,
    cast: &VoiceCast,
    speaker: &str,
) -> String {
    if speaker == "Voice-over" {
        return NARRATOR_VOICE.to_owned();
    }
    let map = cast
        .get_or_init(|| cast_voices(store.clone(), text.clone()))
        .await;
    map.get(speaker)
        .cloned()
        .unwrap_or_else(|| CHARACTER_FALLBACK_VOICE.to_owned())
}

/// One-shot casting pass: match story speakers to roster actors. An actor is
/// never assigned twice; unmatched speakers fall back later at resolution.
async fn cast_voices(
    store: Arc<StoryStateStore>,
    text: Arc<dyn TextCompleter>,
) -> HashMap<String, String> {
    let session = store.snapshot();
    let mut speakers: Vec<String> = session
        .trailer
        .iter()
        .flat_map(|beat| beat.voice_tracks.iter().map(|t| t.speaker.clone()))
        .filter(|speaker| speaker != "Voice-over")
        .collect();
    speakers.sort();
    speakers.dedup();

    let messages = prompts::voice_casting(&session, &speakers);
    let matches = match text.complete_json(&messages).await {
        Ok(json) => decode_with_fallback::<CastingPayload>(&json, CastingPayload::default())
            .into_value()
            .matches,
        Err(err) => {
            warn!(error = %err, "voice casting failed");
            Vec::new()
        }
    };

    let mut map = HashMap::new();
    for cast_match in matches {
        if let Some(id) = voice_id_for_actor(&cast_match.voice_actor_name) {
            if !map.values().any(|taken| taken == id) {
                let _ = map.insert(cast_match.story_character_name, id.to_owned());
            }
        }
    }
    debug!(cast = map.len(), "voice cast ready");
    map
}

fn activate(session: &mut StorySession, index: usize) {
    for (i, beat) in session.trailer.iter_mut().enumerate() {
        if i == index {
            beat.is_active = true;
            beat.played = false;
        } else {
            beat.is_active = false;
        }
    }
}

/// Manually advance to the next beat, wrapping past the end.
pub fn advance(store: &StoryStateStore) {
    let _ = store.update(|session| {
        if session.trailer.is_empty() {
            return;
        }
        let next = match session.active_beat_index() {
            Some(current) => (current + 1) % session.trailer.len(),
            None => 0,
        };
        activate(session, next);
    });
}

/// Manually rewind to the previous beat, stopping at the cover.
pub fn rewind(store: &StoryStateStore) {
    let _ = store.update(|session| {
        if session.trailer.is_empty() {
            return;
        }
        let previous = session.active_beat_index().unwrap_or(0).saturating_sub(1);
        activate(session, previous);
    });
}
