use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Response body the server sends when every payload in a batch was stored.
pub const SUBMIT_SUCCESS: &str = "Success";
/// Response body the server sends when it could not make sense of a payload.
pub const SUBMIT_ERROR: &str = "Error";

/// One subject action as it travels over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum CommandRecord {
    Fill {
        target: String,
        color: String,
        time: u64,
    },
    Resume {
        time: u64,
    },
}

impl CommandRecord {
    pub fn time(&self) -> u64 {
        match self {
            Self::Fill { time, .. } | Self::Resume { time } => *time,
        }
    }
}

/// Serialized command sequences, one per visited page, in page order.
pub type PageRecord = Vec<Vec<CommandRecord>>;

/// A `[language, proficiency]` pair from the personalia form.
///
/// The proficiency is absent when the subject left the level field empty; such
/// entries serialize as a one-element array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "LanguageRepr", into = "LanguageRepr")]
pub struct LanguageLevel {
    pub language: String,
    pub level: Option<u8>,
}

impl LanguageLevel {
    pub fn new(language: impl Into<String>, level: Option<u8>) -> Self {
        Self {
            language: language.into(),
            level,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum LanguageRepr {
    Rated(String, Option<u8>),
    Unrated((String,)),
}

impl From<LanguageRepr> for LanguageLevel {
    fn from(value: LanguageRepr) -> Self {
        match value {
            LanguageRepr::Rated(language, level) => Self::new(language, level),
            LanguageRepr::Unrated((language,)) => Self::new(language, None),
        }
    }
}

impl From<LanguageLevel> for LanguageRepr {
    fn from(value: LanguageLevel) -> Self {
        match value.level {
            Some(level) => Self::Rated(value.language, Some(level)),
            None => Self::Unrated((value.language,)),
        }
    }
}

/// Personalia answers: a flat field map plus the ordered language list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectForm {
    #[serde(default)]
    pub languages: Vec<LanguageLevel>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

impl SubjectForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// The unit handed to the transfer machinery once a subject completes a survey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    pub subject: SubjectForm,
    pub results: PageRecord,
    #[serde(default)]
    pub evaluation: BTreeMap<String, String>,
}

/// How the server answered a successfully transported batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitAck {
    Accepted,
    /// The server received the batch but flagged its content; carries the raw body.
    Rejected(String),
}

impl SubmitAck {
    /// Anything but the literal success sentinel counts as a rejection.
    pub fn from_body(body: &str) -> Self {
        if body == SUBMIT_SUCCESS {
            Self::Accepted
        } else {
            Self::Rejected(body.to_string())
        }
    }
}
