use crate::error::TriageError;
use crate::ledger::{lossy_path, Ledger};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{info, warn};

/// Destination names handed out during one batch.
#[derive(Debug, Default)]
pub struct NameReservations {
    reserved: Mutex<HashSet<PathBuf>>,
}

impl NameReservations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `destination/file_name`, or `stem-(n).ext` for the smallest free `n`.
    pub fn reserve(&self, destination: &Path, file_name: &OsStr) -> PathBuf {
        let mut n = 0usize;
        loop {
            let candidate = if n == 0 {
                destination.join(file_name)
            } else {
                destination.join(disambiguated_name(file_name, n))
            };
            if fs::symlink_metadata(&candidate).is_err() && self.claim(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    fn claim(&self, candidate: &Path) -> bool {
        self.reserved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(candidate.to_path_buf())
    }
}

fn disambiguated_name(file_name: &OsStr, n: usize) -> OsString {
    let path = Path::new(file_name);
    let mut name = path
        .file_stem()
        .map(OsStr::to_os_string)
        .unwrap_or_else(|| OsString::from("file"));
    name.push(format!("-({n})"));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    name
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlannedMove {
    pub index: usize,
    #[serde(serialize_with = "lossy_path::serialize")]
    pub source: PathBuf,
    #[serde(serialize_with = "lossy_path::serialize")]
    pub target: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelocationPlan {
    #[serde(serialize_with = "lossy_path::serialize")]
    pub destination: PathBuf,
    pub moves: Vec<PlannedMove>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelocationReport {
    pub plan: RelocationPlan,
    pub moved: usize,
    pub failed: usize,
}

/// Refuses a destination that is missing or is the source root itself.
pub fn check_destination(source_root: &Path, destination: &Path) -> Result<PathBuf, TriageError> {
    if !destination.is_dir() {
        return Err(TriageError::DestinationMissing(destination.to_path_buf()));
    }
    let destination_canonical = fs::canonicalize(destination)
        .map_err(|_| TriageError::DestinationMissing(destination.to_path_buf()))?;
    let root_canonical = fs::canonicalize(source_root)
        .map_err(|_| TriageError::NotADirectory(source_root.to_path_buf()))?;
    if destination_canonical == root_canonical {
        return Err(TriageError::DestinationIsSource(destination.to_path_buf()));
    }
    Ok(destination_canonical)
}

/// Resolves a unique target for every ledger record, in ledger order.
pub fn plan_relocation(ledger: &Ledger, destination: &Path) -> RelocationPlan {
    let reservations = NameReservations::new();
    let moves = ledger
        .records()
        .enumerate()
        .map(|(index, record)| {
            let file_name = record
                .path
                .file_name()
                .map(OsStr::to_os_string)
                .unwrap_or_else(|| OsString::from("file"));
            PlannedMove {
                index,
                source: record.path.clone(),
                target: reservations.reserve(destination, &file_name),
            }
        })
        .collect();

    RelocationPlan {
        destination: destination.to_path_buf(),
        moves,
    }
}

/// Moves every ledger record into `destination`, marking each one moved or failed.
pub fn relocate(
    ledger: &mut Ledger,
    source_root: &Path,
    destination: &Path,
) -> Result<RelocationReport, TriageError> {
    let destination = check_destination(source_root, destination)?;
    let plan = plan_relocation(ledger, &destination);
    info!(
        count = plan.moves.len(),
        destination = %destination.display(),
        "relocating matched files"
    );

    let results: Vec<io::Result<()>> = plan
        .moves
        .par_iter()
        .map(|planned| move_file(&planned.source, &planned.target))
        .collect();

    let mut moved = 0usize;
    let mut failed = 0usize;
    for (planned, result) in plan.moves.iter().zip(results) {
        match result {
            Ok(()) => {
                ledger.mark_moved(planned.index, planned.target.clone());
                moved += 1;
            }
            Err(err) => {
                warn!(
                    source = %planned.source.display(),
                    target = %planned.target.display(),
                    error = %err,
                    "move failed"
                );
                ledger.mark_failed(planned.index, planned.target.clone(), err.to_string());
                failed += 1;
            }
        }
    }

    Ok(RelocationReport {
        plan,
        moved,
        failed,
    })
}

/// Moves `source` to `target` without ever replacing an existing `target`.
pub fn move_file(source: &Path, target: &Path) -> io::Result<()> {
    match fs::hard_link(source, target) {
        Ok(()) => {
            if let Err(err) = fs::remove_file(source) {
                let _ = fs::remove_file(target);
                return Err(err);
            }
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Err(err),
        Err(err) if err.kind() == io::ErrorKind::CrossesDevices => copy_then_remove(source, target),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(err),
        Err(_) => checked_rename(source, target),
    }
}

fn checked_rename(source: &Path, target: &Path) -> io::Result<()> {
    if fs::symlink_metadata(target).is_ok() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("target already exists: {}", target.display()),
        ));
    }
    match fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::CrossesDevices => copy_then_remove(source, target),
        Err(err) => Err(err),
    }
}

fn copy_then_remove(source: &Path, target: &Path) -> io::Result<()> {
    let copy = || -> io::Result<()> {
        let mut reader = File::open(source)?;
        let mut writer = OpenOptions::new().write(true).create_new(true).open(target)?;
        io::copy(&mut reader, &mut writer)?;
        writer.sync_all()
    };
    if let Err(err) = copy() {
        let _ = fs::remove_file(target);
        return Err(err);
    }
    if let Err(err) = fs::remove_file(source) {
        let _ = fs::remove_file(target);
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{check_destination, move_file, plan_relocation, relocate, NameReservations};
    use crate::classifier::{FileRecord, MatchReason};
    use crate::error::TriageError;
    use crate::ledger::{Ledger, Outcome};
    use rayon::prelude::*;
    use std::collections::HashSet;
    use std::ffi::OsStr;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    fn write(path: &Path, body: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, body).expect("write file");
    }

    fn record(path: PathBuf) -> FileRecord {
        FileRecord {
            size: fs::metadata(&path).map(|m| m.len()).unwrap_or(0),
            extension: "jpg".to_string(),
            path,
            metadata: None,
            match_reason: MatchReason::SizeThreshold,
        }
    }

    #[test]
    fn reserve_skips_names_on_disk() {
        let temp = tempdir().expect("tempdir");
        write(&temp.path().join("photo(2).jpg"), b"old");
        write(&temp.path().join("photo(2)-(1).jpg"), b"older");

        let reservations = NameReservations::new();
        let target = reservations.reserve(temp.path(), OsStr::new("photo(2).jpg"));
        assert_eq!(target, temp.path().join("photo(2)-(2).jpg"));
    }

    #[test]
    fn reserve_skips_names_claimed_in_batch() {
        let temp = tempdir().expect("tempdir");
        let reservations = NameReservations::new();

        let first = reservations.reserve(temp.path(), OsStr::new("track_2.mp3"));
        let second = reservations.reserve(temp.path(), OsStr::new("track_2.mp3"));
        let third = reservations.reserve(temp.path(), OsStr::new("README"));
        let fourth = reservations.reserve(temp.path(), OsStr::new("README"));
        assert_eq!(first, temp.path().join("track_2.mp3"));
        assert_eq!(second, temp.path().join("track_2-(1).mp3"));
        assert_eq!(third, temp.path().join("README"));
        assert_eq!(fourth, temp.path().join("README-(1)"));
    }

    #[test]
    fn concurrent_reservations_never_collide() {
        let temp = tempdir().expect("tempdir");
        write(&temp.path().join("same.jpg"), b"existing");
        let reservations = NameReservations::new();

        let targets: Vec<PathBuf> = (0..64)
            .into_par_iter()
            .map(|_| reservations.reserve(temp.path(), OsStr::new("same.jpg")))
            .collect();
        let unique: HashSet<_> = targets.iter().cloned().collect();
        assert_eq!(unique.len(), 64);
        assert!(!unique.contains(&temp.path().join("same.jpg")));
    }

    #[test]
    fn destination_must_exist_and_differ_from_root() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("media");
        fs::create_dir_all(&root).expect("create root");

        let err = check_destination(&root, &temp.path().join("missing")).expect_err("missing");
        assert!(matches!(err, TriageError::DestinationMissing(_)));

        let err = check_destination(&root, &root.join(".")).expect_err("same as root");
        assert!(matches!(err, TriageError::DestinationIsSource(_)));

        let quarantine = temp.path().join("quarantine");
        fs::create_dir_all(&quarantine).expect("create quarantine");
        assert!(check_destination(&root, &quarantine).is_ok());
    }

    #[test]
    fn refused_relocation_moves_nothing() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("media");
        let source = root.join("a.jpg");
        write(&source, b"a");
        let mut ledger = Ledger::new();
        ledger.record(record(source.clone()));

        let err = relocate(&mut ledger, &root, &temp.path().join("nope")).expect_err("refused");
        assert_eq!(err.exit_code(), 1);
        assert!(source.exists());
        assert_eq!(ledger.count_outcome(Outcome::Pending), 1);
    }

    #[test]
    fn plan_follows_ledger_order() {
        let temp = tempdir().expect("tempdir");
        let mut ledger = Ledger::new();
        ledger.record(record(temp.path().join("b").join("x.jpg")));
        ledger.record(record(temp.path().join("a").join("x.jpg")));

        let dest = temp.path().join("q");
        let plan = plan_relocation(&ledger, &dest);
        assert_eq!(plan.moves[0].source, temp.path().join("b").join("x.jpg"));
        assert_eq!(plan.moves[0].target, dest.join("x.jpg"));
        assert_eq!(plan.moves[1].target, dest.join("x-(1).jpg"));
    }

    #[test]
    fn failed_move_is_recorded_and_batch_continues() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("media");
        let dest = temp.path().join("quarantine");
        fs::create_dir_all(&dest).expect("create dest");
        let vanished = root.join("gone.jpg");
        let present = root.join("here.jpg");
        write(&vanished, b"v");
        write(&present, b"p");

        let mut ledger = Ledger::new();
        ledger.record(record(vanished.clone()));
        ledger.record(record(present.clone()));
        fs::remove_file(&vanished).expect("remove before move");

        let report = relocate(&mut ledger, &root, &dest).expect("relocate");
        assert_eq!(report.moved, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(ledger.entries()[0].outcome, Outcome::Failed);
        assert!(ledger.entries()[0].error.is_some());
        assert_eq!(ledger.entries()[1].outcome, Outcome::Moved);
        assert!(!present.exists());
        assert_eq!(fs::read(dest.join("here.jpg")).expect("moved"), b"p");
    }

    #[test]
    fn move_file_refuses_existing_target() {
        let temp = tempdir().expect("tempdir");
        let source = temp.path().join("a.jpg");
        let target = temp.path().join("b.jpg");
        write(&source, b"new");
        write(&target, b"keep");

        let err = move_file(&source, &target).expect_err("existing target");
        assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&target).expect("target"), b"keep");
        assert_eq!(fs::read(&source).expect("source"), b"new");
    }

    #[test]
    fn target_created_after_planning_is_never_replaced() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("media");
        let dest = temp.path().join("quarantine");
        fs::create_dir_all(&dest).expect("create dest");
        let source = root.join("a.jpg");
        write(&source, b"ours");

        let mut ledger = Ledger::new();
        ledger.record(record(source.clone()));
        let plan = plan_relocation(&ledger, &dest);
        assert_eq!(plan.moves[0].target, dest.join("a.jpg"));

        write(&dest.join("a.jpg"), b"theirs");
        let err = move_file(&plan.moves[0].source, &plan.moves[0].target).expect_err("raced");
        assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(dest.join("a.jpg")).expect("target"), b"theirs");
        assert_eq!(fs::read(&source).expect("source"), b"ours");
    }

    #[test]
    fn moved_file_leaves_no_source_behind() {
        let temp = tempdir().expect("tempdir");
        let source = temp.path().join("a.jpg");
        let target = temp.path().join("q").join("a.jpg");
        write(&source, b"body");
        fs::create_dir_all(temp.path().join("q")).expect("create q");

        move_file(&source, &target).expect("move");
        assert!(!source.exists());
        assert_eq!(fs::read(&target).expect("target"), b"body");
    }

    #[cfg(unix)]
    #[test]
    fn disambiguated_name_keeps_non_utf8_bytes() {
        use std::os::unix::ffi::OsStrExt;

        let temp = tempdir().expect("tempdir");
        let name = OsStr::from_bytes(b"caf\xe9.jpg");
        let reservations = NameReservations::new();

        let first = reservations.reserve(temp.path(), name);
        let second = reservations.reserve(temp.path(), name);
        assert_eq!(first, temp.path().join(name));
        assert_eq!(
            second.file_name().expect("name").as_bytes(),
            b"caf\xe9-(1).jpg"
        );
        assert_ne!(first, second);
    }
}
