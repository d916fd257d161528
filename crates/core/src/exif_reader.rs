use crate::metadata::{normalize, ExtractionError, MetadataFields, MetadataProvider};
use exif::{Exif, In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

const EXIF_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "heic", "heif", "webp"];

const EXIF_FIELDS: &[(&str, Tag)] = &[
    ("make", Tag::Make),
    ("model", Tag::Model),
    ("date_time_original", Tag::DateTimeOriginal),
    ("software", Tag::Software),
];

#[derive(Debug, Default, Clone, Copy)]
pub struct ExifProvider;

impl ExifProvider {
    pub fn handles(extension: &str) -> bool {
        EXIF_EXTENSIONS.contains(&extension)
    }
}

impl MetadataProvider for ExifProvider {
    fn extract(&self, path: &Path) -> Result<MetadataFields, ExtractionError> {
        let file = File::open(path)
            .map_err(|err| ExtractionError::Corrupt(format!("{}: {err}", path.display())))?;
        let mut buf = BufReader::new(file);
        let exif = match Reader::new().read_from_container(&mut buf) {
            Ok(exif) => exif,
            Err(exif::Error::NotFound(_)) => return Ok(MetadataFields::new()),
            Err(exif::Error::NotSupported(what)) => {
                return Err(ExtractionError::UnsupportedFormat(what.to_string()))
            }
            Err(err) => {
                return Err(ExtractionError::Corrupt(format!(
                    "{}: {err}",
                    path.display()
                )))
            }
        };

        let mut fields = MetadataFields::new();
        let mut first_error = None;
        for (key, tag) in EXIF_FIELDS {
            match find_field_value(&exif, *tag) {
                Ok(value) => {
                    if let Some(value) = normalize(value) {
                        fields.insert((*key).to_string(), value);
                    }
                }
                Err(err) => {
                    debug!(
                        path = %path.display(),
                        field = *key,
                        error = %err,
                        "skipping EXIF field"
                    );
                    first_error = first_error.or(Some(err));
                }
            }
        }
        match first_error {
            Some(err) if fields.is_empty() => Err(err),
            _ => Ok(fields),
        }
    }
}

fn find_field_value(exif: &Exif, tag: Tag) -> Result<Option<String>, ExtractionError> {
    let Some(field) = exif.get_field(tag, In::PRIMARY) else {
        return Ok(None);
    };

    match &field.value {
        Value::Ascii(chunks) => {
            let mut parts = Vec::with_capacity(chunks.len());
            for chunk in chunks {
                let text = std::str::from_utf8(chunk).map_err(|err| {
                    ExtractionError::UnreadableEncoding(format!("{tag}: {err}"))
                })?;
                parts.push(text.to_string());
            }
            Ok(Some(parts.join(" ")))
        }
        _ => Ok(Some(field.display_value().with_unit(exif).to_string())),
    }
}
