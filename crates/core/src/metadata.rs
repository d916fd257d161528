use crate::audio_tags::AudioTagProvider;
use crate::exif_reader::ExifProvider;
use crate::pdf_info::PdfProvider;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Value recorded for an expected tag field the file does not carry.
pub const UNKNOWN_FIELD: &str = "unknown";

/// Fields that count as evidence a photo came out of a camera.
pub const CAMERA_FIELDS: &[&str] = &["make", "model", "date_time_original"];

/// Sparse tag fields; a key is absent when the file does not carry it.
pub type MetadataFields = BTreeMap<String, String>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("corrupt data: {0}")]
    Corrupt(String),
    #[error("unreadable encoding: {0}")]
    UnreadableEncoding(String),
}

pub trait MetadataProvider: Send + Sync {
    fn extract(&self, path: &Path) -> Result<MetadataFields, ExtractionError>;
}

/// Dispatches to the EXIF, audio tag or PDF reader by file extension.
#[derive(Debug, Default, Clone)]
pub struct MediaMetadataProvider {
    exif: ExifProvider,
    audio: AudioTagProvider,
    pdf: PdfProvider,
}

impl MediaMetadataProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataProvider for MediaMetadataProvider {
    fn extract(&self, path: &Path) -> Result<MetadataFields, ExtractionError> {
        let ext = lower_extension(path);
        if ExifProvider::handles(&ext) {
            self.exif.extract(path)
        } else if AudioTagProvider::handles(&ext) {
            self.audio.extract(path)
        } else if PdfProvider::handles(&ext) {
            self.pdf.extract(path)
        } else {
            Err(ExtractionError::UnsupportedFormat(if ext.is_empty() {
                "(no extension)".to_string()
            } else {
                ext
            }))
        }
    }
}

pub fn has_camera_metadata(fields: &MetadataFields) -> bool {
    CAMERA_FIELDS.iter().any(|key| fields.contains_key(*key))
}

/// Keeps `expected` keys present, filling gaps with [`UNKNOWN_FIELD`].
pub fn fill_unknown(mut fields: MetadataFields, expected: &[&str]) -> MetadataFields {
    for key in expected {
        fields
            .entry((*key).to_string())
            .or_insert_with(|| UNKNOWN_FIELD.to_string());
    }
    fields
}

pub(crate) fn lower_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

pub(crate) fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().trim_end_matches('\0').trim().to_string())
        .filter(|v| !v.is_empty())
}
