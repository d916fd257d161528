use crate::cancel::CancelFlag;
use crate::classifier::{Classification, Classifier, RuleSet};
use crate::enumerator::TreeEnumerator;
use crate::error::TriageError;
use crate::ledger::{Ledger, Outcome};
use crate::metadata::MetadataProvider;
use crate::relocator::{check_destination, plan_relocation, relocate, RelocationPlan};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub root: PathBuf,
    pub destination: Option<PathBuf>,
    pub rules: RuleSet,
    pub dry_run: bool,
    pub cancel: CancelFlag,
    pub ledger_path: Option<PathBuf>,
}

impl ScanOptions {
    pub fn new(root: impl Into<PathBuf>, rules: RuleSet) -> Self {
        Self {
            root: root.into(),
            destination: None,
            rules,
            dry_run: false,
            cancel: CancelFlag::default(),
            ledger_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub scanned: usize,
    pub matched: usize,
    pub relocated: usize,
    pub failed: usize,
    pub skipped_subtrees: usize,
    pub unreadable_files: usize,
    pub metadata_failures: usize,
}

#[derive(Debug)]
pub struct ScanRun {
    pub ledger: Ledger,
    pub summary: RunSummary,
    pub plan: Option<RelocationPlan>,
}

/// Walks, classifies and (when a destination is set) relocates in strict phases.
/// A `ledger_path` is written before the first move and again with the outcomes.
pub fn run_scan(
    options: &ScanOptions,
    provider: &dyn MetadataProvider,
) -> Result<ScanRun, TriageError> {
    let root = fs::canonicalize(&options.root)
        .ok()
        .filter(|p| p.is_dir())
        .ok_or_else(|| TriageError::NotADirectory(options.root.clone()))?;
    let destination = options
        .destination
        .as_deref()
        .map(|dest| check_destination(&root, dest))
        .transpose()?;

    let (mut ledger, mut summary) =
        classify_tree(&root, destination.as_deref(), options, provider)?;

    if options.cancel.is_cancelled() {
        return Err(TriageError::Cancelled);
    }

    let mut plan = None;
    if let Some(destination) = destination.as_deref() {
        if options.dry_run {
            let planned = plan_relocation(&ledger, destination);
            for planned_move in &planned.moves {
                ledger.set_destination(planned_move.index, planned_move.target.clone());
            }
            plan = Some(planned);
        } else if !ledger.is_empty() {
            write_ledger(&ledger, options.ledger_path.as_deref())?;
            let report = relocate(&mut ledger, &root, destination)?;
            plan = Some(report.plan);
        }
    }
    write_ledger(&ledger, options.ledger_path.as_deref())?;

    summary.relocated = ledger.count_outcome(Outcome::Moved);
    summary.failed = ledger.count_outcome(Outcome::Failed);
    info!(
        scanned = summary.scanned,
        matched = summary.matched,
        relocated = summary.relocated,
        failed = summary.failed,
        "run finished"
    );

    Ok(ScanRun {
        ledger,
        summary,
        plan,
    })
}

fn write_ledger(ledger: &Ledger, path: Option<&Path>) -> Result<(), TriageError> {
    let Some(path) = path else {
        return Ok(());
    };
    ledger
        .persist(path)
        .map_err(|err| TriageError::Ledger {
            path: path.to_path_buf(),
            message: format!("{err:#}"),
        })?;
    info!(ledger = %path.display(), entries = ledger.count(), "ledger written");
    Ok(())
}

fn classify_tree(
    root: &Path,
    destination: Option<&Path>,
    options: &ScanOptions,
    provider: &dyn MetadataProvider,
) -> Result<(Ledger, RunSummary), TriageError> {
    let mut enumerator = TreeEnumerator::new(root).cancel_flag(options.cancel.clone());
    if let Some(dest) = destination.filter(|d| d.starts_with(root)) {
        enumerator = enumerator.exclude(dest);
    }
    let walk = enumerator.enumerate()?;
    info!(
        folders = walk.folders.len(),
        files = walk.file_count(),
        "traversal finished"
    );

    let classifier = Classifier::new(&options.rules, provider);
    let mut ledger = Ledger::new();
    let mut summary = RunSummary {
        skipped_subtrees: walk.skipped_subtrees.len(),
        ..RunSummary::default()
    };

    for folder in walk.folders.iter().filter(|f| !f.files.is_empty()) {
        if options.cancel.is_cancelled() {
            return Err(TriageError::Cancelled);
        }

        let results: Vec<Option<Classification>> = folder
            .files
            .par_iter()
            .map(|name| {
                let path = folder.path.join(name);
                match fs::metadata(&path) {
                    Ok(meta) => Some(classifier.classify_detailed(&path, meta.len())),
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "cannot stat file");
                        None
                    }
                }
            })
            .collect();

        summary.scanned += folder.files.len();
        for result in results {
            let Some(classification) = result else {
                summary.unreadable_files += 1;
                continue;
            };
            if classification.extraction_error.is_some() {
                summary.metadata_failures += 1;
            }
            if let Some(record) = classification.record {
                ledger.record(record);
            }
        }
    }

    summary.matched = ledger.count();
    Ok((ledger, summary))
}

/// Folders under `root` that contain no subfolder.
pub fn find_leaf_folders(root: &Path, cancel: &CancelFlag) -> Result<Vec<PathBuf>, TriageError> {
    let walk = TreeEnumerator::new(root)
        .cancel_flag(cancel.clone())
        .enumerate()?;
    Ok(walk.leaf_folders())
}
