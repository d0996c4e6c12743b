//! Batch import: run every document under a set of paths through the
//! pipeline and persist the accepted records.
//!
//! A rejected document is skipped and the batch continues. Possible
//! duplicates are reported and only held back when the config says so.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Serialize;
use walkdir::WalkDir;

use crate::config::ImportConfig;
use crate::error::ImportError;
use crate::pipeline::{DocumentKind, ExtractionPipeline};
use crate::record::RecordId;
use crate::sanitize::redact_path;
use crate::store::RecordStore;

/// A processed document that resembles records already stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateHit {
    pub document: String,
    pub matches: Vec<RecordId>,
    /// True when the record was not stored because of the match.
    pub skipped: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportSummary {
    pub imported: Vec<RecordId>,
    pub rejected: Vec<String>,
    pub duplicates: Vec<DuplicateHit>,
}

impl ImportSummary {
    pub fn processed(&self) -> usize {
        self.imported.len() + self.rejected.len() + self.skipped()
    }

    pub fn skipped(&self) -> usize {
        self.duplicates.iter().filter(|d| d.skipped).count()
    }
}

/// Expands `paths` into the documents to import.
///
/// Directories are walked recursively and only files with a supported
/// extension are kept, in path order. Files named explicitly are kept as
/// given so the pipeline can report on them.
pub fn collect_documents(paths: &[PathBuf]) -> Result<Vec<PathBuf>, ImportError> {
    let mut documents = Vec::new();

    for path in paths {
        if !path.is_dir() {
            documents.push(path.clone());
            continue;
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(path).min_depth(1) {
            let entry = entry.map_err(|source| ImportError::Scan {
                path: path.clone(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if DocumentKind::from_path(entry.path()).is_some() {
                debug!("Found document: {}", redact_path(entry.path()));
                found.push(entry.into_path());
            }
        }
        found.sort();

        info!("Scanned {} documents in {}", found.len(), path.display());
        documents.extend(found);
    }

    Ok(documents)
}

/// Imports every document found under `paths`.
///
/// Only store failures abort the batch.
pub fn import_paths(
    pipeline: &ExtractionPipeline,
    store: &RecordStore,
    paths: &[PathBuf],
    config: &ImportConfig,
) -> Result<ImportSummary, ImportError> {
    let mut summary = ImportSummary::default();

    for document in collect_documents(paths)? {
        import_document(pipeline, store, &document, config, &mut summary)?;
    }

    info!(
        "Import finished: {} imported, {} rejected, {} possible duplicates ({} skipped)",
        summary.imported.len(),
        summary.rejected.len(),
        summary.duplicates.len(),
        summary.skipped()
    );
    Ok(summary)
}

fn import_document(
    pipeline: &ExtractionPipeline,
    store: &RecordStore,
    document: &Path,
    config: &ImportConfig,
    summary: &mut ImportSummary,
) -> Result<(), ImportError> {
    let name = redact_path(document);
    let store_error = |source| ImportError::Store {
        document: name.clone(),
        source,
    };

    let Some(record) = pipeline.process(document, config.validate) else {
        warn!("Skipping {}: no record extracted", name);
        summary.rejected.push(name.clone());
        return Ok(());
    };

    let matches: Vec<RecordId> = store
        .find_duplicates(&record, config.duplicate_window_days)
        .map_err(store_error)?
        .iter()
        .filter_map(|r| r.id())
        .collect();

    if !matches.is_empty() {
        let skipped = config.skip_duplicates;
        warn!(
            "{} looks like a duplicate of record(s) {:?}{}",
            name,
            matches,
            if skipped { "; skipping" } else { "" }
        );
        summary.duplicates.push(DuplicateHit {
            document: name.clone(),
            matches,
            skipped,
        });
        if skipped {
            return Ok(());
        }
    }

    let id = store.create(&record).map_err(store_error)?;
    info!("Imported {} as record {}", name, id);
    summary.imported.push(id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_collect_walks_directories_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.PNG"));
        touch(&dir.path().join("a.pdf"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("2025/jan/c.jpg"));

        let found = collect_documents(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("2025/jan/c.jpg"),
                PathBuf::from("a.pdf"),
                PathBuf::from("b.PNG"),
            ]
        );
    }

    #[test]
    fn test_explicit_files_kept_as_given() {
        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join("notes.txt");
        touch(&notes);
        let missing = dir.path().join("missing.png");

        let found = collect_documents(&[notes.clone(), missing.clone()]).unwrap();
        assert_eq!(found, vec![notes, missing]);
    }

    #[test]
    fn test_summary_counts() {
        let summary = ImportSummary {
            imported: vec![1, 2],
            rejected: vec!["bad.png".to_string()],
            duplicates: vec![
                DuplicateHit {
                    document: "dup.png".to_string(),
                    matches: vec![1],
                    skipped: true,
                },
                DuplicateHit {
                    document: "b.png".to_string(),
                    matches: vec![1],
                    skipped: false,
                },
            ],
        };
        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.processed(), 4);
    }
}
