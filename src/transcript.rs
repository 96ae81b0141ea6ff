//! The append-only chat log that drives display.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{from_reader, to_writer_pretty};
use time::OffsetDateTime;

use crate::error::{Error, Result};

const TRANSCRIPT_VERSION: u8 = 1;

/// Who said a transcript line.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// The person chatting.
    User,
    /// The hosted assistant, or the fallback reply standing in for it.
    Assistant,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::User => write!(f, "User"),
            Speaker::Assistant => write!(f, "Assistant"),
        }
    }
}

/// One line of the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Who said it.
    pub speaker: Speaker,
    /// What was said, as displayed.
    pub text: String,
    /// When the line was recorded.
    #[serde(with = "rfc3339")]
    pub at: OffsetDateTime,
}

/// Ordered log of (speaker, text) pairs.  Entries are never reordered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    entries: Vec<Entry>,
}

impl Transcript {
    /// Creates an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a line stamped with the current time.
    pub fn append(&mut self, speaker: Speaker, text: impl Into<String>) {
        self.entries.push(Entry {
            speaker,
            text: text.into(),
            at: OffsetDateTime::now_utc(),
        });
    }

    /// All lines, oldest first.
    pub fn all(&self) -> &[Entry] {
        &self.entries
    }

    /// The most recent line.
    pub fn last(&self) -> Option<&Entry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every line.  Only the reset action calls this.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Writes the transcript as versioned, pretty-printed JSON.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())
            .map_err(|err| Error::io("failed to create transcript file", err))?;
        let writer = BufWriter::new(file);
        to_writer_pretty(writer, &TranscriptFile::new(&self.entries)).map_err(|err| {
            Error::serialization("failed to serialize transcript", Some(Box::new(err)))
        })
    }

    /// Reads a transcript previously written by [`Transcript::save_to`].
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())
            .map_err(|err| Error::io("failed to open transcript file", err))?;
        let reader = BufReader::new(file);
        let transcript: TranscriptFile = from_reader(reader).map_err(|err| {
            Error::serialization("failed to parse transcript", Some(Box::new(err)))
        })?;
        if transcript.version != TRANSCRIPT_VERSION {
            return Err(Error::validation(
                format!("unsupported transcript version {}", transcript.version),
                Some("version".to_string()),
            ));
        }
        Ok(Self {
            entries: transcript.entries,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct TranscriptFile {
    version: u8,
    entries: Vec<Entry>,
}

impl TranscriptFile {
    fn new(entries: &[Entry]) -> Self {
        Self {
            version: TRANSCRIPT_VERSION,
            entries: entries.to_vec(),
        }
    }
}

mod rfc3339 {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::OffsetDateTime;
    use time::format_description::well_known::Rfc3339;

    pub fn serialize<S>(at: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = at.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        OffsetDateTime::parse(&s, &Rfc3339).map_err(serde::de::Error::custom)
    }
}
