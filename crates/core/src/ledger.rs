use crate::classifier::FileRecord;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pending,
    Moved,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    #[serde(flatten)]
    pub record: FileRecord,
    pub outcome: Outcome,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "lossy_path::serialize_opt"
    )]
    pub destination: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Raw bytes of `path` when it is not valid UTF-8.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_bytes: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_bytes: Option<Vec<u8>>,
}

impl LedgerEntry {
    fn set_destination(&mut self, destination: PathBuf) {
        self.destination_bytes = raw_bytes(&destination);
        self.destination = Some(destination);
    }

    fn restore_raw_paths(&mut self) {
        if let Some(path) = self.path_bytes.as_deref().and_then(path_from_bytes) {
            self.record.path = path;
        }
        if let Some(path) = self.destination_bytes.as_deref().and_then(path_from_bytes) {
            self.destination = Some(path);
        }
    }
}

pub(crate) mod lossy_path {
    use serde::Serializer;
    use std::path::Path;

    pub fn serialize<P, S>(path: &P, serializer: S) -> Result<S::Ok, S::Error>
    where
        P: AsRef<Path>,
        S: Serializer,
    {
        serializer.serialize_str(&path.as_ref().to_string_lossy())
    }

    pub fn serialize_opt<P, S>(path: &Option<P>, serializer: S) -> Result<S::Ok, S::Error>
    where
        P: AsRef<Path>,
        S: Serializer,
    {
        match path {
            Some(path) => serialize(path, serializer),
            None => serializer.serialize_none(),
        }
    }
}

#[cfg(unix)]
fn raw_bytes(path: &Path) -> Option<Vec<u8>> {
    use std::os::unix::ffi::OsStrExt;
    path.to_str()
        .is_none()
        .then(|| path.as_os_str().as_bytes().to_vec())
}

#[cfg(not(unix))]
fn raw_bytes(_path: &Path) -> Option<Vec<u8>> {
    None
}

#[cfg(unix)]
fn path_from_bytes(bytes: &[u8]) -> Option<PathBuf> {
    use std::os::unix::ffi::OsStrExt;
    Some(PathBuf::from(std::ffi::OsStr::from_bytes(bytes)))
}

#[cfg(not(unix))]
fn path_from_bytes(_bytes: &[u8]) -> Option<PathBuf> {
    None
}

/// Matched files of one run, in the order they were classified.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
    match_count: usize,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: FileRecord) {
        let path_bytes = raw_bytes(&record.path);
        self.entries.push(LedgerEntry {
            record,
            outcome: Outcome::Pending,
            destination: None,
            error: None,
            path_bytes,
            destination_bytes: None,
        });
        self.match_count += 1;
        debug_assert_eq!(self.match_count, self.entries.len());
    }

    pub fn count(&self) -> usize {
        self.match_count
    }

    pub fn is_empty(&self) -> bool {
        self.match_count == 0
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.entries.iter().map(|entry| &entry.record)
    }

    pub(crate) fn mark_moved(&mut self, index: usize, destination: PathBuf) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.outcome = Outcome::Moved;
            entry.set_destination(destination);
            entry.error = None;
        }
    }

    pub(crate) fn mark_failed(&mut self, index: usize, destination: PathBuf, error: String) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.outcome = Outcome::Failed;
            entry.set_destination(destination);
            entry.error = Some(error);
        }
    }

    pub(crate) fn set_destination(&mut self, index: usize, destination: PathBuf) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.set_destination(destination);
        }
    }

    pub fn count_outcome(&self, outcome: Outcome) -> usize {
        self.entries.iter().filter(|e| e.outcome == outcome).count()
    }

    pub fn serialize(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.entries).context("could not serialize ledger")
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("could not create ledger directory: {}", parent.display())
            })?;
        }
        let body = self.serialize()?;
        fs::write(path, body)
            .with_context(|| format!("could not write ledger: {}", path.display()))?;
        Ok(())
    }
}

pub fn read_ledger(path: &Path) -> Result<Vec<LedgerEntry>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read ledger: {}", path.display()))?;
    let mut entries: Vec<LedgerEntry> =
        serde_json::from_str(&raw).context("ledger file is corrupt")?;
    entries.iter_mut().for_each(LedgerEntry::restore_raw_paths);
    Ok(entries)
}
