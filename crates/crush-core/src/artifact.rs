//! Artifact Payloads
//!
//! The kind-specific data a builder produces. The server treats payloads as
//! opaque apart from validation; rendering lives elsewhere.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Longest accepted ask-out question
pub const MAX_QUESTION_LEN: usize = 200;

/// Most stickers a card may carry
pub const MAX_STICKERS: usize = 24;

/// Most stems in one bouquet
pub const MAX_FLOWERS: usize = 24;

/// Longest voice note, in seconds
pub const MAX_VOICE_SECS: u32 = 60;

/// Artifact families
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    #[serde(alias = "askout")]
    Card,
    Bouquet,
    Voice,
}

impl ArtifactKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::Bouquet => "bouquet",
            Self::Voice => "voice",
        }
    }

    /// Viewer route prefix for share links
    pub const fn view_prefix(self) -> &'static str {
        match self {
            Self::Card => "/card",
            Self::Bouquet => "/bouquet",
            Self::Voice => "/voice",
        }
    }
}

impl std::str::FromStr for ArtifactKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "card" | "askout" => Ok(Self::Card),
            "bouquet" => Ok(Self::Bouquet),
            "voice" => Ok(Self::Voice),
            other => Err(CoreError::UnknownKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Card color themes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardTheme {
    #[default]
    Classic,
    Kawaii,
    Elegant,
    Meme,
    Darkmode,
    Retro,
    Minimalist,
    Galaxy,
}

/// How the "No" button misbehaves
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoButtonTrick {
    #[default]
    Runaway,
    Shrinking,
    Swap,
    Disguise,
}

/// A sticker dropped onto a card
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StickerPlacement {
    pub sticker: String,
    pub x: f32,
    pub y: f32,
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default)]
    pub rotation: f32,
}

const fn default_scale() -> f32 {
    1.0
}

/// Ask-out card
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPayload {
    #[serde(default)]
    pub theme: CardTheme,

    #[serde(default = "default_question")]
    pub question: String,

    #[serde(default)]
    pub yes_message: String,

    #[serde(default)]
    pub no_button_trick: NoButtonTrick,

    #[serde(default)]
    pub stickers: Vec<StickerPlacement>,
}

fn default_question() -> String {
    "Will you go out with me?".into()
}

impl Default for CardPayload {
    fn default() -> Self {
        Self {
            theme: CardTheme::default(),
            question: default_question(),
            yes_message: String::new(),
            no_button_trick: NoButtonTrick::default(),
            stickers: Vec::new(),
        }
    }
}

/// Digital flower bouquet
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BouquetPayload {
    /// Flower ids, in arrangement order
    pub flowers: Vec<String>,

    #[serde(default = "default_ribbon")]
    pub ribbon_color: String,

    #[serde(default)]
    pub message_card: bool,

    #[serde(default)]
    pub message_text: String,

    #[serde(default = "default_wrapping")]
    pub wrapping_pattern: String,

    #[serde(default = "default_bow")]
    pub bow_style: String,
}

fn default_ribbon() -> String {
    "#ec4899".into()
}

fn default_wrapping() -> String {
    "solid".into()
}

fn default_bow() -> String {
    "classic".into()
}

impl Default for BouquetPayload {
    fn default() -> Self {
        Self {
            flowers: Vec::new(),
            ribbon_color: default_ribbon(),
            message_card: false,
            message_text: String::new(),
            wrapping_pattern: default_wrapping(),
            bow_style: default_bow(),
        }
    }
}

/// Recorded voice message. Media is uploaded before staging; only URLs travel here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoicePayload {
    pub voice_note_url: String,

    #[serde(default)]
    pub background_image_url: Option<String>,

    pub duration_secs: u32,
}

/// Kind-specific artifact data
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ArtifactPayload {
    #[serde(alias = "askout")]
    Card(CardPayload),
    Bouquet(BouquetPayload),
    Voice(VoicePayload),
}

impl ArtifactPayload {
    pub const fn kind(&self) -> ArtifactKind {
        match self {
            Self::Card(_) => ArtifactKind::Card,
            Self::Bouquet(_) => ArtifactKind::Bouquet,
            Self::Voice(_) => ArtifactKind::Voice,
        }
    }

    /// Check builder output before it becomes an entitlement
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Card(card) => {
                let question = card.question.trim();
                if question.is_empty() {
                    return Err(CoreError::InvalidDraft("card question is empty".into()));
                }
                if question.chars().count() > MAX_QUESTION_LEN {
                    return Err(CoreError::InvalidDraft(format!(
                        "card question exceeds {MAX_QUESTION_LEN} characters"
                    )));
                }
                if card.stickers.len() > MAX_STICKERS {
                    return Err(CoreError::InvalidDraft(format!(
                        "card carries more than {MAX_STICKERS} stickers"
                    )));
                }
            }
            Self::Bouquet(bouquet) => {
                if bouquet.flowers.is_empty() {
                    return Err(CoreError::InvalidDraft("bouquet has no flowers".into()));
                }
                if bouquet.flowers.len() > MAX_FLOWERS {
                    return Err(CoreError::InvalidDraft(format!(
                        "bouquet has more than {MAX_FLOWERS} flowers"
                    )));
                }
            }
            Self::Voice(voice) => {
                if voice.voice_note_url.trim().is_empty() {
                    return Err(CoreError::InvalidDraft("voice note was not uploaded".into()));
                }
                if voice.duration_secs == 0 || voice.duration_secs > MAX_VOICE_SECS {
                    return Err(CoreError::InvalidDraft(format!(
                        "voice duration must be 1..={MAX_VOICE_SECS} seconds"
                    )));
                }
            }
        }
        Ok(())
    }
}
