// Note model: splits sync-target payloads into header, body and metadata
// regions and serializes edits back into the same layout.
//
// Object-store payloads look like:
//
//   <header>
//
//   <body ...>
//
//   id: <id>
//   parent_id: <folder id>
//   updated_time: 2024-05-01T10:00:00.000Z
//   ...
//
// Web clipper notes arrive as structured fields and never use the raw form.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{ProviderKind, NOTE_SUFFIX};

pub const ID_KEY: &str = "id";
pub const PARENT_ID_KEY: &str = "parent_id";
pub const UPDATED_TIME_KEY: &str = "updated_time";
pub const USER_UPDATED_TIME_KEY: &str = "user_updated_time";

/// Layout of sync timestamps, always UTC with millisecond precision.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";
const METADATA_SEPARATOR: &str = ": ";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NoteError {
    #[error("note metadata is missing required field `{0}`")]
    MissingMetadataField(&'static str),

    #[error("note `{name}` is not valid UTF-8")]
    InvalidUtf8 { name: String },
}

/// A unit of content in a notes backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub provider: ProviderKind,
    /// Identifier within the backend namespace (`<id>.md`).
    pub name: String,
    /// Native payload; empty for backends assembled from structured fields.
    pub raw: String,
    pub header: String,
    pub body: String,
    /// Ordered `key: value` lines.
    pub metadata: Vec<String>,
}

impl Note {
    /// Build an object-store note from its payload and split it.
    pub fn from_raw(name: impl Into<String>, raw: Vec<u8>) -> Result<Self, NoteError> {
        let name = name.into();
        let raw = match String::from_utf8(raw) {
            Ok(raw) => raw,
            Err(_) => return Err(NoteError::InvalidUtf8 { name }),
        };

        let mut note = Self {
            provider: ProviderKind::ObjectStore,
            name,
            raw,
            header: String::new(),
            body: String::new(),
            metadata: Vec::new(),
        };
        note.split();
        Ok(note)
    }

    /// Build a web clipper note. The `id` and `parent_id` lines are
    /// synthesized so containment checks work the same for both backends.
    pub fn from_fields(
        name: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        id: &str,
        parent_id: &str,
    ) -> Self {
        Self {
            provider: ProviderKind::WebClipper,
            name: name.into(),
            raw: String::new(),
            header: title.into(),
            body: body.into(),
            metadata: vec![
                format!("{ID_KEY}{METADATA_SEPARATOR}{id}"),
                format!("{PARENT_ID_KEY}{METADATA_SEPARATOR}{parent_id}"),
            ],
        }
    }

    /// Split `raw` into header, body and metadata.
    ///
    /// The first line is the header. The first later line starting with
    /// `id: ` opens the metadata block; everything between (trimmed) is
    /// the body. Without an `id: ` line the whole remainder is body.
    pub fn split(&mut self) {
        if !self.provider.has_metadata() {
            return;
        }

        let id_needle = metadata_needle(ID_KEY);
        let lines: Vec<&str> = self.raw.split('\n').collect();
        self.header = lines[0].to_string();

        let metadata_start = lines
            .iter()
            .skip(1)
            .position(|line| line.starts_with(id_needle.as_str()))
            .map(|offset| offset + 1)
            .unwrap_or(lines.len());

        self.body = lines.get(1..metadata_start).unwrap_or_default().join("\n").trim().to_string();
        self.metadata = lines[metadata_start..].iter().map(|line| line.to_string()).collect();
    }

    /// Rebuild `raw` from header, body and metadata.
    pub fn format(&mut self) {
        if !self.provider.has_metadata() {
            return;
        }

        self.raw = format!("{}\n\n{}\n\n{}", self.header, self.body, self.metadata.join("\n"));
    }

    /// Value of the metadata line starting with `key: `.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        let needle = metadata_needle(key);
        self.metadata.iter().find_map(|line| line.strip_prefix(needle.as_str()))
    }

    /// Update an existing metadata line. Keys are never created; returns
    /// `false` when `key` is absent.
    pub fn set_metadata(&mut self, key: &str, value: &str) -> bool {
        let needle = metadata_needle(key);
        match self.metadata.iter_mut().find(|line| line.starts_with(needle.as_str())) {
            Some(line) => {
                *line = format!("{needle}{value}");
                true
            }
            None => false,
        }
    }

    /// Replace the body, refreshing sync timestamps to the current time.
    pub fn set_body(&mut self, body: impl Into<String>) -> Result<(), NoteError> {
        self.set_body_at(body, Utc::now())
    }

    /// Replace the body using `now` for the refreshed sync timestamps.
    ///
    /// Metadata-bearing notes must already carry both `updated_time` and
    /// `user_updated_time`; a note missing either is left untouched.
    pub fn set_body_at(&mut self, body: impl Into<String>, now: DateTime<Utc>) -> Result<(), NoteError> {
        if !self.provider.has_metadata() {
            self.body = body.into();
            return Ok(());
        }

        for key in [UPDATED_TIME_KEY, USER_UPDATED_TIME_KEY] {
            if self.metadata(key).is_none() {
                return Err(NoteError::MissingMetadataField(key));
            }
        }

        let timestamp = format_timestamp(now);
        self.body = body.into();
        self.set_metadata(UPDATED_TIME_KEY, &timestamp);
        self.set_metadata(USER_UPDATED_TIME_KEY, &timestamp);
        self.format();
        Ok(())
    }

    /// The note's own id: the `id` metadata value, or the name without
    /// its `.md` suffix.
    pub fn note_id(&self) -> &str {
        self.metadata(ID_KEY)
            .unwrap_or_else(|| self.name.strip_suffix(NOTE_SUFFIX).unwrap_or(self.name.as_str()))
    }

    /// Whether this note sits directly under the folder `parent_id`.
    pub fn is_child_of(&self, parent_id: &str) -> bool {
        self.metadata(PARENT_ID_KEY) == Some(parent_id)
    }
}

/// Render a sync timestamp (`2024-05-01T10:00:00.000Z`).
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

fn metadata_needle(key: &str) -> String {
    if key.ends_with(METADATA_SEPARATOR) {
        key.to_string()
    } else {
        format!("{key}{METADATA_SEPARATOR}")
    }
}
