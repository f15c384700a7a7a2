//! Engine configuration and credentials.
//!
//! Settings merge a JSON file with `STORYBOX_`-prefixed environment
//! variables via figment. Credential lookup is a synchronous getter that
//! errors when the key is unset; callers surface that as a failed tool
//! result rather than crashing the session.

use figment::Figment;
use figment::providers::{Env, Format, Json};
use serde::{Deserialize, Serialize};

use crate::errors::SettingsError;
use crate::retry::RetryConfig;

/// Which external service a credential belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Credential {
    /// Text completion / refinement service.
    Text,
    /// Vision description service.
    Vision,
    /// Image generation service.
    Image,
    /// Speech synthesis service.
    Speech,
    /// Realtime conversational agent channel.
    Realtime,
}

impl Credential {
    fn key(self) -> &'static str {
        match self {
            Self::Text => "textApiKey",
            Self::Vision => "visionApiKey",
            Self::Image => "imageApiKey",
            Self::Speech => "speechApiKey",
            Self::Realtime => "realtimeApiKey",
        }
    }
}

/// Engine settings loaded at startup.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoryboxSettings {
    /// API key for the text completion service.
    pub text_api_key: Option<String>,
    /// API key for the vision description service.
    pub vision_api_key: Option<String>,
    /// API key for the image generation service.
    pub image_api_key: Option<String>,
    /// API key for the speech synthesis service.
    pub speech_api_key: Option<String>,
    /// API key for the realtime agent channel.
    pub realtime_api_key: Option<String>,
    /// Retry policy for external generation calls.
    pub retry: RetryConfig,
}

impl StoryboxSettings {
    /// Load settings from `storybox.json` (if present) merged with
    /// `STORYBOX_`-prefixed environment variables.
    pub fn load() -> Result<Self, SettingsError> {
        Ok(Figment::new()
            .merge(Json::file("storybox.json"))
            .merge(Env::prefixed("STORYBOX_"))
            .extract()?)
    }

    /// Return a credential, erroring if it is unset.
    pub fn require(&self, credential: Credential) -> Result<&str, SettingsError> {
        let value = match credential {
            Credential::Text => &self.text_api_key,
            Credential::Vision => &self.vision_api_key,
            Credential::Image => &self.image_api_key,
            Credential::Speech => &self.speech_api_key,
            Credential::Realtime => &self.realtime_api_key,
        };
        value
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SettingsError::Missing {
                key: credential.key().to_owned(),
            })
    }
}
