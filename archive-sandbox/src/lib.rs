//! Zip-slip-safe extraction of an uploaded repository archive.
//!
//! Validation happens in two passes before any bytes are written: first the
//! whole archive's entries are checked for path containment, symlinks, file
//! count, and total uncompressed size; only if every entry passes does the
//! second pass write files to disk. The final directory is published
//! atomically by extracting into a sibling temp directory and renaming it
//! into place.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};
use zip::ZipArchive;

/// Limits enforced before extraction proceeds.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveLimits {
    pub max_zip_bytes: u64,
    pub max_files: usize,
    pub max_total_uncompressed_bytes: u64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_zip_bytes: 50 * 1024 * 1024,
            max_files: 20_000,
            max_total_uncompressed_bytes: 500 * 1024 * 1024,
        }
    }
}

/// Summary of a successful extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractReport {
    pub file_count: usize,
    pub total_uncompressed_bytes: u64,
    /// `true` if the repo directory already existed and extraction was skipped.
    pub already_present: bool,
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive not found at {0}")]
    NotFound(PathBuf),

    #[error("zip size {actual} bytes exceeds limit of {limit} bytes")]
    TooLarge { actual: u64, limit: u64 },

    #[error("zip contains too many files (limit {limit})")]
    TooManyFiles { limit: usize },

    #[error("zip uncompressed size exceeds limit of {limit} bytes")]
    TooMuchUncompressedData { limit: u64 },

    #[error("unsafe zip member path: {0}")]
    UnsafePath(String),

    #[error("zip symlink entries are not allowed: {0}")]
    Symlink(String),

    #[error("failed to open zip archive: {0}")]
    Open(#[from] zip::result::ZipError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Unix `S_IFLNK`, matched against `external_attr >> 16 & 0o170000` per the
/// zip spec's Unix external-attribute encoding.
const S_IFLNK: u32 = 0o120000;
const S_IFMT: u32 = 0o170000;

/// Extracts `zip_path` into `repo_dir`, which must not yet exist as a
/// sibling of a temp directory during the operation. If `repo_dir` already
/// exists, extraction is skipped and the call is idempotent.
pub fn extract_repo_archive(
    zip_path: &Path,
    repo_dir: &Path,
    limits: &ArchiveLimits,
) -> Result<ExtractReport, ArchiveError> {
    if repo_dir.exists() {
        info!(repo_dir = %repo_dir.display(), "repo already exists, skipping unzip");
        return Ok(ExtractReport {
            file_count: 0,
            total_uncompressed_bytes: 0,
            already_present: true,
        });
    }

    if !zip_path.exists() {
        return Err(ArchiveError::NotFound(zip_path.to_path_buf()));
    }

    let parent = repo_dir
        .parent()
        .expect("repo_dir must have a parent directory");
    fs::create_dir_all(parent)?;

    let tmp_name = format!(
        ".{}.tmp",
        repo_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("extract")
    );
    let tmp_dir = parent.join(tmp_name);
    if tmp_dir.exists() {
        let _ = fs::remove_dir_all(&tmp_dir);
    }
    fs::create_dir_all(&tmp_dir)?;

    match safe_extract_zip(zip_path, &tmp_dir, limits) {
        Ok(report) => {
            fs::rename(&tmp_dir, repo_dir)?;
            info!(
                repo_dir = %repo_dir.display(),
                file_count = report.file_count,
                total_uncompressed_bytes = report.total_uncompressed_bytes,
                "archive extracted"
            );
            Ok(report)
        }
        Err(err) => {
            warn!(zip_path = %zip_path.display(), error = %err, "archive rejected");
            let _ = fs::remove_dir_all(&tmp_dir);
            Err(err)
        }
    }
}

/// Validates and extracts `zip_path`'s contents into `extract_dir`, which
/// must already exist and be empty. Every entry is checked for path
/// containment, symlink-ness, file count, and cumulative uncompressed size
/// before any entry is written.
fn safe_extract_zip(
    zip_path: &Path,
    extract_dir: &Path,
    limits: &ArchiveLimits,
) -> Result<ExtractReport, ArchiveError> {
    let zip_size = fs::metadata(zip_path)?.len();
    if zip_size > limits.max_zip_bytes {
        return Err(ArchiveError::TooLarge {
            actual: zip_size,
            limit: limits.max_zip_bytes,
        });
    }

    let root = extract_dir
        .canonicalize()
        .unwrap_or_else(|_| extract_dir.to_path_buf());

    let file = fs::File::open(zip_path)?;
    let mut archive = ZipArchive::new(file)?;

    let mut file_count = 0usize;
    let mut total_uncompressed_bytes = 0u64;

    // First pass: validate every entry without writing anything.
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i)?;
        let name = entry.name().to_string();

        let destination = extract_dir.join(&name);
        if !is_within_directory(&destination, extract_dir) {
            return Err(ArchiveError::UnsafePath(name));
        }

        let mode = entry.unix_mode().unwrap_or(0);
        if mode & S_IFMT == S_IFLNK {
            return Err(ArchiveError::Symlink(name));
        }

        if entry.is_dir() {
            continue;
        }

        file_count += 1;
        if file_count > limits.max_files {
            return Err(ArchiveError::TooManyFiles {
                limit: limits.max_files,
            });
        }

        total_uncompressed_bytes += entry.size();
        if total_uncompressed_bytes > limits.max_total_uncompressed_bytes {
            return Err(ArchiveError::TooMuchUncompressedData {
                limit: limits.max_total_uncompressed_bytes,
            });
        }
    }
    let _ = root;

    // Second pass: every entry already validated, safe to write.
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        let destination = extract_dir.join(&name);

        if entry.is_dir() {
            fs::create_dir_all(&destination)?;
            continue;
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&destination)?;
        io::copy(&mut entry, &mut out)?;
    }

    Ok(ExtractReport {
        file_count,
        total_uncompressed_bytes,
        already_present: false,
    })
}

fn is_within_directory(target: &Path, root: &Path) -> bool {
    let mut depth: i64 = 0;
    for component in target.components().skip(root.components().count()) {
        use std::path::Component;
        match component {
            Component::ParentDir => depth -= 1,
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return false,
        }
        if depth < 0 {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let opts = SimpleFileOptions::default();
        for (name, contents) in entries {
            writer.start_file(*name, opts).unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn extracts_well_formed_archive() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("repo.zip");
        write_zip(&zip_path, &[("src/main.rs", b"fn main() {}")]);

        let repo_dir = dir.path().join("repos").join("r1");
        let report =
            extract_repo_archive(&zip_path, &repo_dir, &ArchiveLimits::default()).unwrap();

        assert_eq!(report.file_count, 1);
        assert!(!report.already_present);
        assert!(repo_dir.join("src/main.rs").exists());
    }

    #[test]
    fn rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("evil.zip");
        write_zip(&zip_path, &[("../../etc/passwd", b"x")]);

        let repo_dir = dir.path().join("repos").join("r2");
        let err = extract_repo_archive(&zip_path, &repo_dir, &ArchiveLimits::default())
            .unwrap_err();
        assert!(matches!(err, ArchiveError::UnsafePath(_)));
        assert!(!repo_dir.exists());
    }

    #[test]
    fn is_idempotent_when_repo_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("repo.zip");
        write_zip(&zip_path, &[("a.rs", b"fn a() {}")]);

        let repo_dir = dir.path().join("repos").join("r3");
        fs::create_dir_all(&repo_dir).unwrap();

        let report =
            extract_repo_archive(&zip_path, &repo_dir, &ArchiveLimits::default()).unwrap();
        assert!(report.already_present);
    }

    #[test]
    fn rejects_too_many_files() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("many.zip");
        let entries: Vec<(String, Vec<u8>)> =
            (0..5).map(|i| (format!("f{i}.rs"), b"x".to_vec())).collect();
        let entries_ref: Vec<(&str, &[u8])> =
            entries.iter().map(|(n, c)| (n.as_str(), c.as_slice())).collect();
        write_zip(&zip_path, &entries_ref);

        let repo_dir = dir.path().join("repos").join("r4");
        let limits = ArchiveLimits {
            max_files: 2,
            ..ArchiveLimits::default()
        };
        let err = extract_repo_archive(&zip_path, &repo_dir, &limits).unwrap_err();
        assert!(matches!(err, ArchiveError::TooManyFiles { .. }));
    }
}
