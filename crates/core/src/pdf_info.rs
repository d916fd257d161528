use crate::metadata::{normalize, ExtractionError, MetadataFields, MetadataProvider};
use lopdf::{Dictionary, Document, Object};
use std::path::Path;

const PDF_EXTENSIONS: &[&str] = &["pdf"];

/// Document-info fields recorded for large documents.
pub const PDF_FIELDS: &[&str] = &["title", "author", "producer", "pages"];

const INFO_KEYS: &[(&str, &str)] = &[
    ("title", "Title"),
    ("author", "Author"),
    ("producer", "Producer"),
];

#[derive(Debug, Default, Clone, Copy)]
pub struct PdfProvider;

impl PdfProvider {
    pub fn handles(extension: &str) -> bool {
        PDF_EXTENSIONS.contains(&extension)
    }
}

impl MetadataProvider for PdfProvider {
    fn extract(&self, path: &Path) -> Result<MetadataFields, ExtractionError> {
        let doc = Document::load(path)
            .map_err(|err| ExtractionError::Corrupt(format!("{}: {err}", path.display())))?;

        let mut fields = MetadataFields::new();
        fields.insert("pages".to_string(), doc.get_pages().len().to_string());

        let Some(info) = info_dictionary(&doc) else {
            return Ok(fields);
        };
        for (key, name) in INFO_KEYS {
            let value = info
                .get(name.as_bytes())
                .ok()
                .and_then(|obj| resolve(&doc, obj))
                .and_then(decode_text);
            if let Some(value) = normalize(value) {
                fields.insert((*key).to_string(), value);
            }
        }
        Ok(fields)
    }
}

fn info_dictionary(doc: &Document) -> Option<&Dictionary> {
    let info = doc.trailer.get(b"Info").ok()?;
    resolve(doc, info)?.as_dict().ok()
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn decode_text(obj: &Object) -> Option<String> {
    let Object::String(bytes, _) = obj else {
        return None;
    };
    match bytes.as_slice() {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16(&units).ok()
        }
        [0xEF, 0xBB, 0xBF, rest @ ..] => std::str::from_utf8(rest).ok().map(str::to_string),
        latin => Some(latin.iter().map(|&b| char::from(b)).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::PdfProvider;
    use crate::metadata::{ExtractionError, MetadataProvider};
    use lopdf::{dictionary, Document, Object, StringFormat};
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn write_pdf(path: &Path, page_count: usize, info: Option<lopdf::Dictionary>) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let kids: Vec<Object> = (0..page_count)
            .map(|_| {
                doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                })
                .into()
            })
            .collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        if let Some(info) = info {
            let info_id = doc.add_object(info);
            doc.trailer.set("Info", info_id);
        }
        doc.save(path).expect("save pdf");
    }

    #[test]
    fn handles_pdf_only() {
        assert!(PdfProvider::handles("pdf"));
        assert!(!PdfProvider::handles("jpg"));
    }

    #[test]
    fn reads_document_info_and_page_count() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("manual.pdf");
        write_pdf(
            &path,
            3,
            Some(dictionary! {
                "Title" => Object::string_literal("Field Guide"),
                "Author" => Object::String(
                    vec![0xFE, 0xFF, 0x00, b'J', 0x00, 0xF6, 0x00, b'n'],
                    StringFormat::Hexadecimal,
                ),
            }),
        );

        let fields = PdfProvider.extract(&path).expect("readable pdf");
        assert_eq!(fields.get("pages").map(String::as_str), Some("3"));
        assert_eq!(fields.get("title").map(String::as_str), Some("Field Guide"));
        assert_eq!(fields.get("author").map(String::as_str), Some("Jön"));
        assert!(!fields.contains_key("producer"));
    }

    #[test]
    fn document_without_info_still_reports_pages() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("bare.pdf");
        write_pdf(&path, 1, None);

        let fields = PdfProvider.extract(&path).expect("readable pdf");
        assert_eq!(fields.get("pages").map(String::as_str), Some("1"));
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn garbage_is_corrupt() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("broken.pdf");
        fs::write(&path, b"not a pdf at all").expect("write pdf");

        let err = PdfProvider.extract(&path).expect_err("garbage");
        assert!(matches!(err, ExtractionError::Corrupt(_)));
    }
}
