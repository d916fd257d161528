mod audio_tags;
mod cancel;
mod classifier;
mod config;
mod enumerator;
mod error;
mod exif_reader;
mod ledger;
mod metadata;
mod pdf_info;
mod pipeline;
mod relocator;

pub use audio_tags::{AudioTagProvider, AUDIO_FIELDS};
pub use cancel::CancelFlag;
pub use classifier::{
    has_duplicate_suffix, CameraMetadataRule, Classification, Classifier, DuplicateSuffixRule,
    FileRecord, KeywordRule, LargeDocumentRule, MatchReason, RuleSet, SizeRule,
};
pub use config::{
    app_paths, load_config, parse_config, save_config, AppPaths, TriageConfig,
    DEFAULT_LARGE_DOCUMENT_MIN_BYTES, DEFAULT_LEDGER_FILE, DEFAULT_MAX_SIZE_BYTES,
};
pub use enumerator::{enumerate, FolderEntry, TreeEnumerator, TreeWalk};
pub use error::TriageError;
pub use exif_reader::ExifProvider;
pub use ledger::{read_ledger, Ledger, LedgerEntry, Outcome};
pub use metadata::{
    fill_unknown, has_camera_metadata, ExtractionError, MediaMetadataProvider, MetadataFields,
    MetadataProvider, CAMERA_FIELDS, UNKNOWN_FIELD,
};
pub use pdf_info::{PdfProvider, PDF_FIELDS};
pub use pipeline::{find_leaf_folders, run_scan, RunSummary, ScanOptions, ScanRun};
pub use relocator::{
    check_destination, move_file, plan_relocation, relocate, NameReservations, PlannedMove,
    RelocationPlan, RelocationReport,
};
