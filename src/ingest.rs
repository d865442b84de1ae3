// src/ingest.rs

use crate::invoice_db::InvoiceRepository;
use crate::nfse;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{info, warn};
use unicode_normalization::UnicodeNormalization;

static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^A-Za-z0-9_.-]+").expect("static regex is valid")
});

/// One member of an ingestion batch.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Name as submitted by the user.
    pub filename: String,
    pub content: Result<Vec<u8>, String>,
}

impl Submission {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content: Ok(bytes),
        }
    }

    /// A member whose bytes could not be obtained; it fails with `reason`.
    pub fn unreadable(filename: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content: Err(reason.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestFailure {
    pub filename: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<IngestFailure>,
    /// `filename: message` for documents that were stored with defaulted amounts.
    pub warnings: Vec<String>,
}

/// Whether a submission takes part in the batch at all.
pub fn is_xml_submission(filename: &str) -> bool {
    filename.ends_with(".xml")
}

/// Reduce a submitted name to a safe, flat file name.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    // "São" -> "Sao": decompose, then keep only the ASCII part
    let ascii: String = base.nfkd().filter(char::is_ascii).collect();
    let cleaned = UNSAFE_CHARS.replace_all(ascii.trim(), "_");
    let cleaned = cleaned.trim_start_matches(['.', '_']);
    if cleaned.is_empty() {
        "unnamed.xml".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Normalize and store every `.xml` submission. A failing document never
/// stops the rest of the batch. Members whose content could not be obtained
/// count as failures whatever their name.
pub fn ingest_batch<R, I>(repo: &R, submissions: I) -> BatchOutcome
where
    R: InvoiceRepository + ?Sized,
    I: IntoIterator<Item = Submission>,
{
    let mut outcome = BatchOutcome::default();

    for submission in submissions {
        if submission.content.is_ok() && !is_xml_submission(&submission.filename) {
            info!(file = %submission.filename, "Skipping non-XML submission");
            continue;
        }

        let span = tracing::info_span!("ingest", file = %submission.filename);
        let _guard = span.enter();

        match ingest_one(repo, &submission) {
            Ok(warnings) => {
                outcome.succeeded += 1;
                outcome.warnings.extend(
                    warnings
                        .into_iter()
                        .map(|w| format!("{}: {w}", submission.filename)),
                );
            }
            Err(reason) => {
                warn!(reason = %reason, "Document rejected");
                outcome.failed += 1;
                outcome.failures.push(IngestFailure {
                    filename: submission.filename.clone(),
                    reason,
                });
            }
        }
    }

    info!(
        succeeded = outcome.succeeded,
        failed = outcome.failed,
        "Batch complete"
    );
    outcome
}

fn ingest_one<R>(repo: &R, submission: &Submission) -> Result<Vec<String>, String>
where
    R: InvoiceRepository + ?Sized,
{
    let bytes = submission.content.as_ref().map_err(Clone::clone)?;
    let normalized = nfse::normalize(bytes, &sanitize_filename(&submission.filename))
        .map_err(|e| e.to_string())?;
    repo.insert(&normalized.record)
        .map_err(|e| format!("could not store invoice: {e}"))?;
    Ok(normalized.warnings)
}

/// Expand CLI paths into submissions. Directories contribute their direct
/// `.xml` entries in name order; other files are never read. Paths that
/// cannot be read become failing submissions.
pub fn collect_submissions(paths: &[PathBuf]) -> Vec<Submission> {
    let mut submissions = Vec::new();
    for path in paths {
        if path.is_dir() {
            submissions.extend(directory_submissions(path));
        } else if is_xml_submission(&file_name(path)) {
            submissions.push(read_submission(path));
        } else {
            info!(file = %path.display(), "Skipping non-XML file");
        }
    }
    submissions
}

fn directory_submissions(dir: &Path) -> Vec<Submission> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Directory not readable");
            return vec![Submission::unreadable(
                dir.display().to_string(),
                format!("could not read directory: {e}"),
            )];
        }
    };

    let mut files = Vec::new();
    let mut broken = Vec::new();
    for entry in entries {
        match entry {
            Ok(entry) => {
                let path = entry.path();
                if path.is_file() && is_xml_submission(&file_name(&path)) {
                    files.push(path);
                }
            }
            Err(e) => broken.push(Submission::unreadable(
                dir.display().to_string(),
                format!("could not list directory entry: {e}"),
            )),
        }
    }
    files.sort();

    files
        .iter()
        .map(|p| read_submission(p))
        .chain(broken)
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn read_submission(path: &Path) -> Submission {
    let filename = file_name(path);
    match fs::read(path) {
        Ok(bytes) => Submission::new(filename, bytes),
        Err(e) => Submission::unreadable(filename, format!("could not read file: {e}")),
    }
}
