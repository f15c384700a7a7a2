//! The voice actor roster for trailer playback.

/// Voice used for "Voice-over" tracks.
pub const NARRATOR_VOICE: &str = "FF7KdobWPaiR0vkcALHF";

/// Voice used for speakers the casting pass left unmatched.
pub const CHARACTER_FALLBACK_VOICE: &str = "nDJIICjR9zfJExIFeSCN";

/// One castable voice actor.
#[derive(Clone, Copy, Debug)]
pub struct VoiceOption {
    /// Vendor voice ID.
    pub id: &'static str,
    /// Actor name, unique within the roster.
    pub name: &'static str,
    /// Casting-facing description of the voice.
    pub description: &'static str,
}

/// The fixed roster the casting pass chooses from.
pub const VOICE_ROSTER: &[VoiceOption] = &[
    VoiceOption {
        id: "flHkNRp1BlvT73UL6gyz",
        name: "Jessica",
        description: "The Villain! Wickedly eloquent. Calculating. Cruel and calm.",
    },
    VoiceOption {
        id: "NOUqdwPiNzHaOPOi4vC8",
        name: "Ryan",
        description: "A deep timbre older voice.",
    },
    VoiceOption {
        id: "vGQNBgLaiM3EdZtxIiuY",
        name: "Kawaii",
        description: "Young, American female with an adorable and youthful voice. Showing \
             cheerfulness, sweetness, and has an unmistakably kawaii charm.",
    },
    VoiceOption {
        id: "qNkzaJoHLLdpvgh5tISm",
        name: "Carter",
        description: "Middle-aged American male. Voice is rich, smooth, and rugged. Deep and \
             sonorous, resonating like the voice of the mountain.",
    },
    VoiceOption {
        id: "wkMCMaFpHUn8RtbAiJBS",
        name: "Sarah",
        description: "Cheeky young American female voice.",
    },
    VoiceOption {
        id: "ZVl9Fp61ffjhqbLsIHdG",
        name: "Sally",
        description: "A friendly and excited American female voice.",
    },
    VoiceOption {
        id: "INHnGXKnJqauobZLfeOV",
        name: "Benny",
        description: "Young American male, lots of energy and excitement.",
    },
    VoiceOption {
        id: "vfaqCOvlrKi4Zp7C2IAm",
        name: "Demon",
        description: "A deep demon monster. Perfect for ghoul, monster, fantasy, dark, horror.",
    },
    VoiceOption {
        id: "KTPVrSVAEUSJRClDzBw7",
        name: "Cowboy",
        description: "An aged American male voice, rich with the gravel of countless tales and \
             tinged with a Southern drawl.",
    },
    VoiceOption {
        id: "chcMmmtY1cmQh2ye1oXi",
        name: "Timmy",
        description: "A young to middle aged medieval style character. High energy, higher \
             pitch. Peasant, unit, grunt, villager, town crier, farmer.",
    },
];

/// Resolve a roster actor name to its voice ID.
#[must_use]
pub fn voice_id_for_actor(name: &str) -> Option<&'static str> {
    VOICE_ROSTER
        .iter()
        .find(|option| option.name == name)
        .map(|option| option.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_names_are_unique() {
        let mut names: Vec<_> = VOICE_ROSTER.iter().map(|o| o.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), VOICE_ROSTER.len());
    }

    #[test]
    fn actor_lookup() {
        assert_eq!(voice_id_for_actor("Jessica"), Some("flHkNRp1BlvT73UL6gyz"));
        assert_eq!(voice_id_for_actor("Nobody"), None);
    }
}
