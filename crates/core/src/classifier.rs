use crate::audio_tags::AUDIO_FIELDS;
use crate::config::TriageConfig;
use crate::ledger::lossy_path;
use crate::metadata::{
    fill_unknown, has_camera_metadata, lower_extension, ExtractionError, MetadataFields,
    MetadataProvider,
};
use crate::pdf_info::PDF_FIELDS;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum MatchReason {
    SizeThreshold,
    NoCameraMetadata,
    FilenameDuplicateSuffix,
    FilenameKeyword,
    LargeDocument,
}

impl MatchReason {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchReason::SizeThreshold => "size-threshold",
            MatchReason::NoCameraMetadata => "no-camera-metadata",
            MatchReason::FilenameDuplicateSuffix => "filename-duplicate-suffix",
            MatchReason::FilenameKeyword => "filename-keyword",
            MatchReason::LargeDocument => "large-document",
        }
    }
}

impl fmt::Display for MatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file that satisfied one classification rule. Built only by [`Classifier`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    #[serde(serialize_with = "lossy_path::serialize")]
    pub path: PathBuf,
    pub size: u64,
    pub extension: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataFields>,
    pub match_reason: MatchReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeRule {
    pub max_size_bytes: u64,
    pub extensions: Vec<String>,
    /// Extensions matched on size alone, without asking for camera metadata.
    pub metadata_exempt: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateSuffixRule {
    pub extensions: Vec<String>,
    pub max_suffix: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordRule {
    keywords: Vec<String>,
}

impl KeywordRule {
    pub fn new(keywords: &[String]) -> Self {
        Self {
            keywords: keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    fn matches(&self, file_name: &str) -> bool {
        let lowered = file_name.to_lowercase();
        self.keywords.iter().any(|k| lowered.contains(k.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraMetadataRule {
    pub extensions: Vec<String>,
    pub metadata_exempt: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LargeDocumentRule {
    pub extensions: Vec<String>,
    pub min_size_bytes: u64,
}

/// Rules in precedence order; `None` disables a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    pub size: Option<SizeRule>,
    pub duplicate_suffix: Option<DuplicateSuffixRule>,
    pub keyword: Option<KeywordRule>,
    pub camera_metadata: Option<CameraMetadataRule>,
    pub large_document: Option<LargeDocumentRule>,
}

impl RuleSet {
    pub fn from_config(config: &TriageConfig) -> Self {
        let image_extensions = lower_all(&config.image_extensions);
        let exempt = lower_all(&config.metadata_exempt_extensions);
        let keyword = KeywordRule::new(&config.keywords);

        Self {
            size: Some(SizeRule {
                max_size_bytes: config.max_size_bytes,
                extensions: image_extensions.clone(),
                metadata_exempt: exempt.clone(),
            }),
            duplicate_suffix: Some(DuplicateSuffixRule {
                extensions: lower_all(&config.tracked_extensions),
                max_suffix: config.duplicate_suffix_max,
            }),
            keyword: (!keyword.keywords.is_empty()).then_some(keyword),
            camera_metadata: config.require_camera_metadata.then(|| CameraMetadataRule {
                extensions: image_extensions,
                metadata_exempt: exempt,
            }),
            large_document: config
                .large_document_min_bytes
                .map(|min_size_bytes| LargeDocumentRule {
                    extensions: lower_all(&config.document_extensions),
                    min_size_bytes,
                }),
        }
    }
}

fn lower_all(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim().trim_start_matches('.').to_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub record: Option<FileRecord>,
    pub extraction_error: Option<ExtractionError>,
}

pub struct Classifier<'a> {
    rules: &'a RuleSet,
    provider: &'a dyn MetadataProvider,
}

impl<'a> Classifier<'a> {
    pub fn new(rules: &'a RuleSet, provider: &'a dyn MetadataProvider) -> Self {
        Self { rules, provider }
    }

    pub fn classify(&self, path: &Path, size: u64) -> Option<FileRecord> {
        self.classify_detailed(path, size).record
    }

    /// Applies the rules in order; the first one that fires wins.
    pub fn classify_detailed(&self, path: &Path, size: u64) -> Classification {
        let extension = lower_extension(path);
        let file_name = path
            .file_name()
            .map(|v| v.to_string_lossy().to_string())
            .unwrap_or_default();
        let tags = LazyMetadata::new(self.provider, path);

        let matched = self
            .size_rule(&tags, &extension, size)
            .or_else(|| self.duplicate_rule(&tags, &file_name, &extension))
            .or_else(|| self.keyword_rule(&file_name))
            .or_else(|| self.camera_rule(&tags, &extension))
            .or_else(|| self.large_document_rule(&tags, &extension, size));

        Classification {
            record: matched.map(|(match_reason, metadata)| FileRecord {
                path: path.to_path_buf(),
                size,
                extension,
                metadata,
                match_reason,
            }),
            extraction_error: tags.error(),
        }
    }

    fn size_rule(
        &self,
        tags: &LazyMetadata<'_>,
        extension: &str,
        size: u64,
    ) -> Option<(MatchReason, Option<MetadataFields>)> {
        let rule = self.rules.size.as_ref()?;
        if size > rule.max_size_bytes || !contains(&rule.extensions, extension) {
            return None;
        }
        if contains(&rule.metadata_exempt, extension) {
            return Some((MatchReason::SizeThreshold, None));
        }
        lacks_camera_metadata(tags).map(|metadata| (MatchReason::SizeThreshold, metadata))
    }

    fn duplicate_rule(
        &self,
        tags: &LazyMetadata<'_>,
        file_name: &str,
        extension: &str,
    ) -> Option<(MatchReason, Option<MetadataFields>)> {
        let rule = self.rules.duplicate_suffix.as_ref()?;
        if !contains(&rule.extensions, extension)
            || !has_duplicate_suffix(file_name, rule.max_suffix)
        {
            return None;
        }
        let metadata = tags
            .fields()
            .as_ref()
            .ok()
            .map(|fields| fill_unknown(fields.clone(), AUDIO_FIELDS));
        Some((MatchReason::FilenameDuplicateSuffix, metadata))
    }

    fn keyword_rule(&self, file_name: &str) -> Option<(MatchReason, Option<MetadataFields>)> {
        let rule = self.rules.keyword.as_ref()?;
        rule.matches(file_name)
            .then_some((MatchReason::FilenameKeyword, None))
    }

    fn camera_rule(
        &self,
        tags: &LazyMetadata<'_>,
        extension: &str,
    ) -> Option<(MatchReason, Option<MetadataFields>)> {
        let rule = self.rules.camera_metadata.as_ref()?;
        if !contains(&rule.extensions, extension) || contains(&rule.metadata_exempt, extension) {
            return None;
        }
        lacks_camera_metadata(tags).map(|metadata| (MatchReason::NoCameraMetadata, metadata))
    }

    fn large_document_rule(
        &self,
        tags: &LazyMetadata<'_>,
        extension: &str,
        size: u64,
    ) -> Option<(MatchReason, Option<MetadataFields>)> {
        let rule = self.rules.large_document.as_ref()?;
        if size < rule.min_size_bytes || !contains(&rule.extensions, extension) {
            return None;
        }
        let metadata = tags
            .fields()
            .as_ref()
            .ok()
            .map(|fields| fill_unknown(fields.clone(), PDF_FIELDS));
        Some((MatchReason::LargeDocument, metadata))
    }
}

fn lacks_camera_metadata(tags: &LazyMetadata<'_>) -> Option<Option<MetadataFields>> {
    match tags.fields() {
        Ok(fields) if has_camera_metadata(fields) => None,
        Ok(fields) if fields.is_empty() => Some(None),
        Ok(fields) => Some(Some(fields.clone())),
        Err(_) => Some(None),
    }
}

fn contains(values: &[String], extension: &str) -> bool {
    values.iter().any(|v| v == extension)
}

struct LazyMetadata<'a> {
    provider: &'a dyn MetadataProvider,
    path: &'a Path,
    result: OnceCell<Result<MetadataFields, ExtractionError>>,
}

impl<'a> LazyMetadata<'a> {
    fn new(provider: &'a dyn MetadataProvider, path: &'a Path) -> Self {
        Self {
            provider,
            path,
            result: OnceCell::new(),
        }
    }

    fn fields(&self) -> &Result<MetadataFields, ExtractionError> {
        self.result.get_or_init(|| {
            let result = self.provider.extract(self.path);
            if let Err(err) = &result {
                debug!(path = %self.path.display(), error = %err, "metadata extraction failed");
            }
            result
        })
    }

    fn error(self) -> Option<ExtractionError> {
        self.result.into_inner().and_then(Result::err)
    }
}

/// True when `file_name` contains `(N)` or `_N.` with `N <= max_suffix`.
pub fn has_duplicate_suffix(file_name: &str, max_suffix: u32) -> bool {
    let chars: Vec<char> = file_name.chars().collect();
    for (i, &open) in chars.iter().enumerate() {
        let close = match open {
            '(' => ')',
            '_' => '.',
            _ => continue,
        };
        let digits: String = chars[i + 1..]
            .iter()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if digits.is_empty() || chars.get(i + 1 + digits.len()) != Some(&close) {
            continue;
        }
        if digits.parse::<u32>().is_ok_and(|n| n <= max_suffix) {
            return true;
        }
    }
    false
}
