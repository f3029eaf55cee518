// Core domain types shared across all notetally crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Suffix every note identifier carries in the backend namespace.
pub const NOTE_SUFFIX: &str = ".md";

/// Which backend produced a note.
///
/// Only the object store exposes the header/body/metadata raw convention;
/// the web clipper hands out structured fields.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    #[serde(rename = "s3")]
    ObjectStore,
    #[serde(rename = "web_clipper")]
    WebClipper,
}

impl ProviderKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ObjectStore => "s3",
            Self::WebClipper => "web_clipper",
        }
    }

    /// Whether notes from this backend carry sync metadata that must be
    /// refreshed on every body edit.
    pub const fn has_metadata(self) -> bool {
        matches!(self, Self::ObjectStore)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "s3" => Ok(Self::ObjectStore),
            "web_clipper" => Ok(Self::WebClipper),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown provider `{0}`, expected one of: s3 | web_clipper")]
pub struct UnknownProvider(pub String);

/// Name of the note file for a note id (`<id>.md`).
pub fn note_file_name(note_id: &str) -> String {
    format!("{note_id}{NOTE_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_parses_flag_values() {
        assert_eq!("s3".parse::<ProviderKind>(), Ok(ProviderKind::ObjectStore));
        assert_eq!("web_clipper".parse::<ProviderKind>(), Ok(ProviderKind::WebClipper));
        let err = "ftp".parse::<ProviderKind>().unwrap_err();
        assert!(err.to_string().contains("ftp"));
    }

    #[test]
    fn provider_kind_display_matches_serde_name() {
        for kind in [ProviderKind::ObjectStore, ProviderKind::WebClipper] {
            let encoded = serde_json::to_string(&kind).unwrap();
            assert_eq!(encoded, format!("\"{kind}\""));
        }
    }

    #[test]
    fn only_object_store_has_metadata() {
        assert!(ProviderKind::ObjectStore.has_metadata());
        assert!(!ProviderKind::WebClipper.has_metadata());
    }

    #[test]
    fn note_file_name_appends_suffix() {
        assert_eq!(note_file_name("abc123"), "abc123.md");
    }
}
