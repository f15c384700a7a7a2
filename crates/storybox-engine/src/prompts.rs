//! Prompt templates.
//!
//! Pure functions from session state to prompt text. Everything the language
//! and image models see is assembled here, so stage logic stays free of
//! string building.

use storybox_core::{StoryCharacter, StoryGuest, StorySession, StoryStyle, TrailerBeat};
use storybox_services::{ChatMessage, system, user};

use crate::orchestrator::GuestSeed;
use crate::voices::VOICE_ROSTER;

const REALISTIC_STYLE: &str = "A photorealistic image with natural lighting and true-to-life \
     textures. Shallow depth of field keeps the main subject in sharp focus against a softly \
     blurred background. Colors are balanced and lifelike.";

const FELT_STYLE: &str = "A claymation-style image with a warm, autumnal color palette. The \
     lighting is soft and diffused, creating a gentle, almost nostalgic mood. The textures are \
     highly tactile, emphasizing the handmade quality of the materials. The overall aesthetic \
     is whimsical and slightly surreal. The rendering style is painterly, with visible \
     sculpting marks adding to the handcrafted feel. Colors are muted and slightly \
     desaturated, with a predominance of oranges, browns, and greens. The background is \
     slightly blurred, drawing attention to the main focus.";

const PAPER_STYLE: &str = "A layered paper cut-out collage. Crisp cut edges and subtle drop \
     shadows give the scene physical depth. Colors are bold and flat, like construction \
     paper, with visible paper grain throughout.";

const MANGA_STYLE: &str = "Black-and-white manga line art with clean ink outlines, screentone \
     shading, and high contrast. Expressive faces, minimal background detail.";

// ─────────────────────────────────────────────────────────────────────────────
// Render prompts
// ─────────────────────────────────────────────────────────────────────────────

/// Style modifier appended to every image render prompt.
#[must_use]
pub fn render_style(style: StoryStyle) -> &'static str {
    match style {
        StoryStyle::Realistic => REALISTIC_STYLE,
        StoryStyle::Felt => FELT_STYLE,
        StoryStyle::Paper => PAPER_STYLE,
        StoryStyle::Manga => MANGA_STYLE,
    }
}

/// Portrait card prompt for a character's visual sketch.
#[must_use]
pub fn character_portrait(visual_sketch: &str) -> String {
    format!(
        "Mugshot view of a single character. {visual_sketch} Against a solid contrasting color \
         background."
    )
}

/// Final render prompt for a widescreen trailer frame.
#[must_use]
pub fn trailer_render(refined_description: &str) -> String {
    format!(
        "{refined_description} Cinematic still frame with stunning composition and epic movie \
         trailer lighting."
    )
}

fn character_style_guide(characters: &[StoryCharacter]) -> String {
    characters
        .iter()
        .map(|c| format!("{}: {}", c.character_name, c.visual_sketch))
        .collect::<Vec<_>>()
        .join("\n")
}

fn character_roster(characters: &[StoryCharacter]) -> String {
    characters
        .iter()
        .map(|c| format!("{} ({})", c.character_name, c.backstory))
        .collect::<Vec<_>>()
        .join("\n")
}

/// System prompt for the storyboard refinement pass.
#[must_use]
pub fn storyboard_system(characters: &[StoryCharacter]) -> String {
    format!(
        "You are a talented story illustrator. Convert the provided narration and illustration \
         idea into a stunning illustration.\n\n\
         Illustrate any characters or creatures in the foreground. Describe their gender, age, \
         skin, body, hair, facial expression, pose, clothing, accessories. You must use the \
         description from the following character style guide:\n\
         \"\"\"\n{}\n\"\"\"\n\n\
         Illustrate environment in the background. Describe the weather, time of day, \
         landscape, buildings, objects, etc. You can change environment for each scene as long \
         as they are consistent with the narration.\n\n\
         Leave out specific art style, line art, or color palette. Let the artist decide those \
         details.\n\n\
         Respond in a single paragraph, describing the illustration.",
        character_style_guide(characters)
    )
}

/// User turn for the storyboard refinement pass.
#[must_use]
pub fn storyboard_user(narration: &str, illustration: &str) -> String {
    format!("Narration: {narration}\nIllustration idea: {illustration}")
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent instructions
// ─────────────────────────────────────────────────────────────────────────────

/// System instructions for the character-customizing stage.
#[must_use]
pub fn customizing_instructions(session: &StorySession) -> String {
    let agreed = if session.characters.is_empty() {
        String::new()
    } else {
        let list = session
            .characters
            .iter()
            .map(|c| {
                format!(
                    "Daily object: {}\nCharacter: {} ({})",
                    c.daily_object, c.character_name, c.backstory
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        format!("Here is what you and user have agreed on so far:\n\n{list}\n\n")
    };
    format!(
        "You are hosting a workshop to help user understand and solve business problems by \
         storytelling. The user is designing characters for the story.\n\
         The user will show you daily objects they would like to use to represent the \
         characters in the story.\n\
         Your job is to keep track of what each daily object represents in the story.\n\n\
         {agreed}\
         The user is currently showing you: {}\n\n\
         Now interact with the user in one of the following ways:\n\
         - Use the create_character tool to update your memory with the new information.\n\
         - Use change_character or remove_character tool to update your memory with the latest \
         instruction from the user.\n\
         - When user is ready, use the start_story tool to start the story. Do NOT start_story \
         without user's explicit permission.\n\n\
         After each tool use, you MUST concisely tell user what you did.",
        session.vision
    )
}

/// System instructions for the scene-editing stage.
#[must_use]
pub fn editing_instructions(session: &StorySession) -> String {
    let progress = if session.scenes.is_empty() {
        "You are ready to develop the first scene with the user.".to_owned()
    } else {
        let list = session
            .scenes
            .iter()
            .enumerate()
            .map(|(i, scene)| format!("Scene {}: {}", i + 1, scene.narration))
            .collect::<Vec<_>>()
            .join("\n");
        format!("Here is the story you have developed so far:\n{list}")
    };
    format!(
        "You are a talented storyteller. You are developing a story with the user to help them \
         understand and solve business problems.\n\
         You and the user have agreed on using the following daily objects to represent \
         characters in the story:\n\n{}\n\n\
         This is the main story you must tell with the user: {}\n\
         {progress}\n\n\
         Now work with the user to develop the story one scene at a time.\n\
         - Let user guide you with the objects they show and the words they say. The user is \
         currently showing you: {}\n\
         - Use add_next_scene tool to continue the story. You must provide a narration and an \
         illustration:\n\
           - The narration should contribute to the overall story.\n\
           - The illustration should NOT include the daily objects user are showing. Instead, \
         come up with the best scene to complement or augment the narration.\n\
           - After using the tool, you MUST respond with the narration.\n\
         - Use edit_current_scene to edit the current scene.\n\
           - After using the tool, concisely tell user what you did.\n\
         - When user has finished developing all the scenes, you can use convert_to_trailer \
         tool to turn the story into a movie trailer. Encourage user to wrap up after three \
         scenes.",
        session
            .characters
            .iter()
            .map(|c| {
                format!(
                    "Daily object: {}\nCharacter: {} ({})",
                    c.daily_object, c.character_name, c.backstory
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
        session.story,
        session.vision
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Structured generation
// ─────────────────────────────────────────────────────────────────────────────

/// Messages for the one-shot story summary at `start_story`.
#[must_use]
pub fn story_summary(characters: &[StoryCharacter]) -> Vec<ChatMessage> {
    vec![system(format!(
        "You are a talented story writer for business related storytelling. Write a stunning \
         narrative featuring these elements:\n\n{}\n\n\
         You must write a high level narrative for the story and leave out all the details. \
         The narrative should be one very concise paragraph.\n\n\
         Respond in valid JSON, with the following type interface:\n\n\
         {{\n  story: string;\n}}",
        character_roster(characters)
    ))]
}

/// Messages for the streamed guest background generation.
#[must_use]
pub fn guest_generation(characters: &[StoryCharacter], seeds: &[GuestSeed]) -> Vec<ChatMessage> {
    let names = seeds
        .iter()
        .map(|seed| seed.name.as_str())
        .collect::<Vec<_>>()
        .join(" | ");
    let roster = seeds
        .iter()
        .enumerate()
        .map(|(i, seed)| format!("Guest {}: {} ({})", i + 1, seed.name, seed.gender))
        .collect::<Vec<_>>()
        .join("\n");
    vec![
        system(format!(
            "You are organizing a collaborative storytelling event. Based on the main \
             characters of the story and the names of the provided guest list, infer the \
             diverse and story related background for each guest. Respond in this valid JSON \
             format:\n\
             {{\n  guests: {{\n    name: {names},\n    background: string, // detailed \
             background of the guest, including age, gender, ethnicity, hometown, occupation, \
             and personal details related to the story\n  }}[]\n}}"
        )),
        user(format!(
            "Main characters:\n{}\n\nGuest list:\n{roster}",
            character_roster(characters)
        )),
    ]
}

/// Messages for one guest interview turn.
#[must_use]
pub fn guest_interview(
    guests: &[StoryGuest],
    history: &str,
    latest_caption: &str,
    target_guest: &str,
    transcript: &str,
) -> Vec<ChatMessage> {
    let roster = guests
        .iter()
        .map(|guest| format!("{} ({})", guest.name, guest.background))
        .collect::<Vec<_>>()
        .join("\n");
    vec![
        system(format!(
            "Simulate an audience interview during a visual storytelling workshop. The user is \
             interviewing the following audience:\n{roster}\n\n\
             Previous transcript:\n{history}\n\n\
             User is currently showing on screen: {latest_caption}\n\
             User is pointing the microphone at {target_guest}, but other guests may continue \
             the discussion.\n\n\
             Simulate the audience response as a list of utterances with **exaggerated** \
             facial expressions, then summarize the audience response in one sentence.\n\n\
             Respond in valid JSON, with the following type interface:\n\n\
             {{\n  utterances: {{\n    name: string; // one of the guests\n    utterance: \
             string; // one sentence brief utterance\n    expression: string; // exaggerated \
             facial expression during utterance\n  }}[],\n  summary: string;\n}}"
        )),
        user(transcript),
    ]
}

/// Messages for bullet-screen reactions to one trailer beat.
#[must_use]
pub fn beat_reactions(beat: &TrailerBeat) -> Vec<ChatMessage> {
    let count = if beat.is_cover || beat.is_ending {
        "20"
    } else {
        "5 - 10"
    };
    let scene = if beat.description.is_empty() {
        "Fade to black, showing movie title and release time"
    } else {
        beat.description.as_str()
    };
    let tracks = beat
        .voice_tracks
        .iter()
        .map(|track| format!("{}: {}", track.speaker, track.utterance))
        .collect::<Vec<_>>()
        .join("\n");
    vec![
        system(format!(
            "React to a movie trailer scene with \"Bullet Screen\" (danmaku).\n\
             Simulate {count} comments from various online viewers. Use online forum idioms. \
             Use exaggerated punctuation and Kaomoji sparingly. No Emoji. English only.\n\n\
             Respond in this JSON format\n\n\
             {{\n  reactions: {{\n    username: string;\n    message: string;\n  }}[]\n}}"
        )),
        user(format!("Scene: {scene}\n{tracks}")),
    ]
}

/// Messages for the voice casting pass.
#[must_use]
pub fn voice_casting(session: &StorySession, speakers: &[String]) -> Vec<ChatMessage> {
    let known: Vec<String> = speakers
        .iter()
        .map(|name| {
            let profile = session
                .character_by_name(name)
                .map_or("(No profile, use your best judgement)", |c| {
                    c.backstory.as_str()
                });
            format!("{name}: {profile}")
        })
        .collect();
    let screenplay = session
        .trailer
        .iter()
        .enumerate()
        .map(|(i, beat)| format!("Scene {}: {}", i + 1, beat.description))
        .collect::<Vec<_>>()
        .join("\n");
    let actors = VOICE_ROSTER
        .iter()
        .map(|option| format!("{}: {}", option.name, option.description))
        .collect::<Vec<_>>()
        .join("\n");
    vec![
        system(
            "You are a talented casting director. You will cast voice actors for the \
             characters in the story. Match the best voice actor to each character provided by \
             the user. Do NOT cast the same voice actor to multiple characters.\n\n\
             Respond in valid JSON, with the following type interface:\n\n\
             {\n  matches: {\n    storyCharacterName: string;\n    voiceActorName: string;\n  \
             }[]\n}",
        ),
        user(format!(
            "Screenplay:\n{screenplay}\n\nStory characters:\n{}\n\nVoice actors:\n{actors}",
            known.join("\n")
        )),
    ]
}

/// Messages for the streamed trailer script.
#[must_use]
pub fn trailer_script(session: &StorySession) -> Vec<ChatMessage> {
    let speakers = session
        .characters
        .iter()
        .map(|c| format!("\"{}\"", c.character_name))
        .collect::<Vec<_>>()
        .join(", ");
    let chapters = session
        .scenes
        .iter()
        .enumerate()
        .map(|(i, scene)| format!("Chapter {}: {}", i + 1, scene.narration))
        .collect::<Vec<_>>()
        .join("\n");
    vec![
        system(format!(
            "You are a talented screenwriter. You will make an epic 60-second cinematic \
             trailer for the user provided story.\n\n\
             You must describe the trailer as a sequence of scenes. In each scene:\n\
             - The scene description is highly detailed, including subjects, environment, \
             camera angle, lighting, and every visual detail.\n\
             - Do NOT move camera or character. It must be a still frame with stunning \
             composition.\n\
             - Each time you mention a character or creature in the scene, you must include \
             the character's appearance, expression, pose, clothing. You must repeat this for \
             each appearance.\n\
             - Design voice tracks with narrator voice-over and/or short character \
             dialogue/monologue. Make sure each character has a chance to speak.\n\n\
             Use this reference to determine the appearance of the characters:\n{}\n\n\
             The last scene must have an empty description with a single voice track item, \
             creatively announcing the movie's name and teasing that it will come to theaters \
             in Summer 2025.\n\
             Generate the movie name at the end.\n\n\
             Respond in valid JSON, with the following type interface:\n\n\
             {{\n  scenes: {{\n    sceneDescription: string;\n    voiceTracks: {{\n      \
             timestamp: string; // \"MM:SS\" format\n      speaker: string; // \"Voice-over\" \
             or the name of the character e.g. {speakers}\n      utterance: string;\n    \
             }}[]\n  }}[],\n  movieName: string;\n}}",
            character_roster(&session.characters)
        )),
        user(format!(
            "Please make a movie trailer for this story. Make sure to create suspense and \
             excitement:\n\n{chapters}"
        )),
    ]
}

/// Description for the synthetic trailer cover beat.
#[must_use]
pub fn cover_description(characters: &[StoryCharacter]) -> String {
    let names = characters
        .iter()
        .map(|c| c.character_name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Green background trailer cover that says THE FOLLOWING PREVIEW HAS BEEN APPROVED FOR \
         ALL AUDIENCES, RATED G. Rumor goes that the story might feature {names}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use storybox_core::{AssetSlot, CharacterId};

    fn ducky() -> StoryCharacter {
        StoryCharacter {
            id: CharacterId::new(),
            daily_object: "rubber duck".into(),
            character_name: "Ducky".into(),
            backstory: "grew up in the ocean".into(),
            visual_sketch: "a friendly yellow duck with a red bowtie".into(),
            image: AssetSlot::Pending,
        }
    }

    #[test]
    fn customizing_instructions_track_agreed_characters() {
        let mut session = StorySession {
            vision: "a stapler next to a mug".into(),
            ..StorySession::default()
        };
        let text = customizing_instructions(&session);
        assert!(!text.contains("agreed on so far"));
        assert!(text.contains("a stapler next to a mug"));

        session.characters.push(ducky());
        let text = customizing_instructions(&session);
        assert!(text.contains("agreed on so far"));
        assert!(text.contains("Character: Ducky (grew up in the ocean)"));
    }

    #[test]
    fn render_style_tracks_the_session_style() {
        use storybox_core::StoryStyle;
        assert!(render_style(StoryStyle::Felt).contains("claymation"));
        assert!(render_style(StoryStyle::Manga).contains("manga"));
        assert_ne!(
            render_style(StoryStyle::Realistic),
            render_style(StoryStyle::Paper)
        );
        // Default sessions keep the felt texture.
        assert_eq!(render_style(StoryStyle::default()), render_style(StoryStyle::Felt));
    }

    #[test]
    fn storyboard_system_embeds_the_style_guide() {
        let text = storyboard_system(&[ducky()]);
        assert!(text.contains("Ducky: a friendly yellow duck with a red bowtie"));
    }

    #[test]
    fn trailer_script_quotes_speaker_names() {
        let session = StorySession {
            characters: vec![ducky()],
            ..StorySession::default()
        };
        let messages = trailer_script(&session);
        assert!(messages[0].content.contains("\"Ducky\""));
    }
}
