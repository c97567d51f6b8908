use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};

/// One source -> mirror mapping as the server stores it.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryRecord {
    pub source: String,

    // Older servers store the mirror as optional, read a missing one as empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub mirror: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl RepositoryRecord {
    pub fn new(source: impl Into<String>, mirror: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            mirror: mirror.into(),
        }
    }

    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Source => &self.source,
            Field::Mirror => &self.mirror,
        }
    }

    /// Replaces `field` and hands back the value it held before.
    pub fn set(&mut self, field: Field, value: String) -> String {
        let slot = match field {
            Field::Source => &mut self.source,
            Field::Mirror => &mut self.mirror,
        };

        std::mem::replace(slot, value)
    }

    /// Short name for rendering: last path segment of the source, without `.git`.
    pub fn display_name(&self) -> &str {
        let name = self.source.rsplit('/').next().unwrap_or_default();

        name.strip_suffix(".git").unwrap_or(name)
    }
}

impl Display for RepositoryRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mirror = if self.mirror.is_empty() {
            "(none)"
        } else {
            &self.mirror
        };

        write!(f, "{} -> {}", self.source, mirror)
    }
}

/// The editable attributes of a [`RepositoryRecord`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Field {
    Source,
    Mirror,
}

impl Field {
    pub const ALL: [Field; 2] = [Field::Source, Field::Mirror];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Source => "source",
            Field::Mirror => "mirror",
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown field `{0}`, expected `source` or `mirror`")]
pub struct UnknownField(pub String);

impl FromStr for Field {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source" => Ok(Field::Source),
            "mirror" => Ok(Field::Mirror),
            _ => Err(UnknownField(s.to_string())),
        }
    }
}
