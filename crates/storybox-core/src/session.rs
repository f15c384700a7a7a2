//! The story session — the single authoritative record of one storytelling
//! session.
//!
//! Exactly one [`StorySession`] exists at a time. All mutation goes through
//! the state store's update entry point, replacing the whole record so that
//! observers can run cheap distinct-by-serialized-key change detection.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::CharacterId;

// ─────────────────────────────────────────────────────────────────────────────
// Stage
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level phase of a session. Each stage owns its own tool set,
/// instructions, and background tasks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Session created, orchestration not yet started.
    New,
    /// The user maps daily objects to story characters.
    Customizing,
    /// The user develops the story scene by scene.
    Editing,
    /// The finished story plays back as an illustrated trailer.
    Trailer,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::Customizing => "customizing",
            Self::Editing => "editing",
            Self::Trailer => "trailer",
        };
        f.write_str(name)
    }
}

/// Illustration style for the whole session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryStyle {
    /// Photorealistic rendering.
    Realistic,
    /// Felt / claymation texture.
    #[default]
    Felt,
    /// Paper cut-out collage.
    Paper,
    /// Manga line art.
    Manga,
}

// ─────────────────────────────────────────────────────────────────────────────
// Asset slot
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle of a generated asset attached to a scene or beat.
///
/// `Pending` and `Absent` are distinct on purpose: the trailer's cover and
/// ending beats never receive an image, and playback readiness must not
/// confuse "still generating" with "has no image by design".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "url", rename_all = "snake_case")]
pub enum AssetSlot {
    /// Generation in flight.
    #[default]
    Pending,
    /// Generation finished; the URL (or data URL) of the asset.
    Generated(String),
    /// This slot intentionally has no asset.
    Absent,
}

impl AssetSlot {
    /// Whether playback may treat this slot as settled.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// The asset URL, if one was generated.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Generated(url) => Some(url),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session parts
// ─────────────────────────────────────────────────────────────────────────────

/// A story character mapped from a daily object the user showed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryCharacter {
    /// Stable identity; asset patches and renames key on this, never on name.
    pub id: CharacterId,
    /// The real-world object the user showed to the camera.
    pub daily_object: String,
    /// The character's name in the story. Unique at any instant.
    pub character_name: String,
    /// Backstory, personality, origin.
    pub backstory: String,
    /// Detailed visual description used for portrait and scene rendering.
    pub visual_sketch: String,
    /// Generated portrait.
    #[serde(default)]
    pub image: AssetSlot,
}

/// One scene of the story, in user-facing narrative order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryScene {
    /// Narration for the scene, one short sentence.
    pub narration: String,
    /// The raw illustration idea.
    pub caption: String,
    /// Fully-specified visual description produced by the refinement pass.
    #[serde(default)]
    pub refined_caption: String,
    /// Generated illustration.
    #[serde(default)]
    pub image: AssetSlot,
}

/// A simulated audience guest, generated once per editing-stage entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryGuest {
    /// Guest display name.
    pub name: String,
    /// Background enriched asynchronously after generation.
    pub background: String,
    /// Current facial expression.
    pub expression: String,
}

/// One spoken line of a trailer beat.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceTrack {
    /// Position in the trailer, "MM:SS" format.
    pub timestamp: String,
    /// "Voice-over" or a character name.
    pub speaker: String,
    /// The spoken line.
    pub utterance: String,
}

/// One simulated audience reaction to a trailer beat.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    /// Simulated viewer handle.
    pub username: String,
    /// The comment text.
    pub message: String,
}

/// One beat of the generated trailer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailerBeat {
    /// Detailed still-frame description. Empty for the ending beat.
    pub description: String,
    /// Generated illustration. `Absent` for the cover and ending beats.
    #[serde(default)]
    pub image: AssetSlot,
    /// Spoken lines, played in order.
    #[serde(default)]
    pub voice_tracks: Vec<VoiceTrack>,
    /// Simulated audience reactions; `None` until generation settles.
    #[serde(default)]
    pub reactions: Option<Vec<Reaction>>,
    /// Whether this beat is the playback cursor's current position.
    #[serde(default)]
    pub is_active: bool,
    /// Whether this beat's voiceover finished playing.
    #[serde(default)]
    pub played: bool,
    /// Synthetic opening title card.
    #[serde(default)]
    pub is_cover: bool,
    /// Closing beat announcing the movie name.
    #[serde(default)]
    pub is_ending: bool,
}

impl TrailerBeat {
    /// Whether playback may advance onto this beat.
    #[must_use]
    pub fn is_playable(&self) -> bool {
        self.image.is_ready() && self.reactions.is_some()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// The whole session record, replaced atomically on every change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorySession {
    /// Current stage of the session.
    pub stage: Stage,
    /// Illustration style for generated assets.
    pub style: StoryStyle,
    /// Latest stable scene description from the camera, or empty.
    pub vision: String,
    /// Characters in creation order.
    pub characters: Vec<StoryCharacter>,
    /// Scenes in narrative order; append-only during editing.
    pub scenes: Vec<StoryScene>,
    /// Synthesized narrative summary, produced once at `start_story`.
    pub story: String,
    /// Simulated audience guests.
    pub guests: Vec<StoryGuest>,
    /// Trailer beats, built incrementally by the script stream.
    pub trailer: Vec<TrailerBeat>,
    /// Movie name announced by the ending beat.
    pub movie_name: String,
}

impl Default for StorySession {
    fn default() -> Self {
        Self {
            stage: Stage::New,
            style: StoryStyle::default(),
            vision: String::new(),
            characters: Vec::new(),
            scenes: Vec::new(),
            story: String::new(),
            guests: Vec::new(),
            trailer: Vec::new(),
            movie_name: String::new(),
        }
    }
}

impl StorySession {
    /// Find a character by its stable ID.
    #[must_use]
    pub fn character(&self, id: &CharacterId) -> Option<&StoryCharacter> {
        self.characters.iter().find(|c| &c.id == id)
    }

    /// Find a character by its current name.
    #[must_use]
    pub fn character_by_name(&self, name: &str) -> Option<&StoryCharacter> {
        self.characters.iter().find(|c| c.character_name == name)
    }

    /// Index of the active trailer beat, if any.
    #[must_use]
    pub fn active_beat_index(&self) -> Option<usize> {
        self.trailer.iter().position(|b| b.is_active)
    }

    /// Whether the trailer has fully played out.
    #[must_use]
    pub fn trailer_ended(&self) -> bool {
        self.trailer.last().is_some_and(|b| b.is_ending && b.played)
    }
}
