use serde::Serialize;
use thiserror::Error;

/// Number recovered from an audio file name, the key dialed numbers and
/// remote codes are looked up by.
pub type FileId = u32;

/// Index of a file on the sound module. Only meaningful for the module
/// session whose listing produced it.
pub type Slot = u16;

pub const MAX_FILE_ID: FileId = 99_999;
const MAX_ID_DIGITS: usize = 5;

/// How many tracks the directory can hold. Files listed after it is full
/// are ignored.
pub const DIRECTORY_CAPACITY: usize = 30;

#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrackEntry {
    pub file_id: FileId,
    pub slot: Slot,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("the sound module did not list any files")]
    Empty,
}

/// Extract the numeric id from a file name.
///
/// Skips anything before the first digit and reads the digit run that
/// follows. The extension is never looked at, so `T01     OGG`,
/// `01.WAV` and `track1.ogg` all yield `1`. Names without a digit before
/// the first `.`, or with a run longer than five digits, have no id.
pub fn file_id(name: &str) -> Option<FileId> {
    let stem = name.split('.').next().unwrap_or_default();
    let start = stem.find(|c: char| c.is_ascii_digit())?;
    let run = &stem[start..];
    let end = run.find(|c: char| !c.is_ascii_digit()).unwrap_or(run.len());
    let digits = &run[..end];
    if digits.len() > MAX_ID_DIGITS {
        return None;
    }
    digits.parse().ok().filter(|id| *id <= MAX_FILE_ID)
}

/// Fixed size table from file id to module slot, filled once per session
/// from the module's file listing.
#[derive(Clone, Debug)]
pub struct TrackDirectory {
    entries: [TrackEntry; DIRECTORY_CAPACITY],
    len: usize,
}

impl TrackDirectory {
    /// Scan a file listing. The position of a name in the listing is its
    /// slot. Duplicated ids are kept, and since [lookup](Self::lookup)
    /// returns the first match the earliest listed file wins.
    pub fn build<I, S>(listing: I) -> Result<Self, DirectoryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut directory = Self {
            entries: [TrackEntry::default(); DIRECTORY_CAPACITY],
            len: 0,
        };
        let mut listed = 0usize;
        for (index, name) in listing.into_iter().enumerate() {
            listed += 1;
            let name = name.as_ref();
            let Some(file_id) = file_id(name) else {
                tracing::debug!(name, "skipping file without a usable id");
                continue;
            };
            let Ok(slot) = Slot::try_from(index) else {
                break;
            };
            if directory.len == DIRECTORY_CAPACITY {
                tracing::warn!(name, file_id, "track directory is full, dropping file");
                continue;
            }
            directory.entries[directory.len] = TrackEntry { file_id, slot };
            directory.len += 1;
        }
        if listed == 0 {
            return Err(DirectoryError::Empty);
        }
        tracing::info!(listed, tracks = directory.len, "built track directory");
        Ok(directory)
    }

    pub fn lookup(&self, file_id: FileId) -> Option<Slot> {
        self.entries()
            .iter()
            .find(|entry| entry.file_id == file_id)
            .map(|entry| entry.slot)
    }

    pub fn entries(&self) -> &[TrackEntry] {
        &self.entries[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
