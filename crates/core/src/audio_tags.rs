use crate::metadata::{normalize, ExtractionError, MetadataFields, MetadataProvider};
use lofty::error::{ErrorKind, LoftyError};
use lofty::file::TaggedFileExt;
use lofty::probe::Probe;
use lofty::tag::Accessor;
use std::path::Path;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "flac", "ogg", "opus", "wav", "aac"];

/// Tag fields recorded for duplicate audio tracks.
pub const AUDIO_FIELDS: &[&str] = &["track", "song", "artist", "album"];

#[derive(Debug, Default, Clone, Copy)]
pub struct AudioTagProvider;

impl AudioTagProvider {
    pub fn handles(extension: &str) -> bool {
        AUDIO_EXTENSIONS.contains(&extension)
    }
}

impl MetadataProvider for AudioTagProvider {
    fn extract(&self, path: &Path) -> Result<MetadataFields, ExtractionError> {
        let tagged_file = Probe::open(path)
            .map_err(|err| map_lofty_error(path, err))?
            .guess_file_type()
            .map_err(|err| ExtractionError::Corrupt(format!("{}: {err}", path.display())))?
            .read()
            .map_err(|err| map_lofty_error(path, err))?;

        let mut fields = MetadataFields::new();
        let Some(tag) = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag())
        else {
            return Ok(fields);
        };

        let values = [
            ("track", tag.track().map(|n| n.to_string())),
            ("song", tag.title().map(|s| s.to_string())),
            ("artist", tag.artist().map(|s| s.to_string())),
            ("album", tag.album().map(|s| s.to_string())),
        ];
        for (key, value) in values {
            if let Some(value) = normalize(value) {
                fields.insert(key.to_string(), value);
            }
        }
        Ok(fields)
    }
}

fn map_lofty_error(path: &Path, err: LoftyError) -> ExtractionError {
    let detail = format!("{}: {err}", path.display());
    match err.kind() {
        ErrorKind::UnknownFormat => ExtractionError::UnsupportedFormat(detail),
        ErrorKind::TextDecode(_) => ExtractionError::UnreadableEncoding(detail),
        _ => ExtractionError::Corrupt(detail),
    }
}
