//! Corpus directory scanning and document loading.
//!
//! Walks `corpus.data_dir`, keeps files matching `include_globs` and not
//! matching `exclude_globs` (plus built-in VCS/build excludes), extracts
//! their text, and turns each into a [`SourceDocument`] whose id is derived
//! from the file name.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use rag_query_core::chunk::{document_id_from_path, document_id_from_relative_path};
use rag_query_core::models::{Metadata, SourceDocument, META_SOURCE};

use crate::config::CorpusConfig;
use crate::extract::{content_type_for_path, extract_text};

/// A file selected for ingestion.
#[derive(Debug, Clone)]
pub struct CorpusFile {
    pub path: PathBuf,
    /// Path relative to the data dir, `/`-separated.
    pub relative: String,
    pub content_type: &'static str,
}

/// List matching files, sorted by relative path.
pub fn scan_corpus(config: &CorpusConfig) -> Result<Vec<CorpusFile>> {
    let root = &config.data_dir;
    if !root.is_dir() {
        bail!("Corpus data_dir does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;
    let mut excludes = vec!["**/.git/**".to_string(), "**/.*".to_string()];
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        if exclude_set.is_match(&relative) || !include_set.is_match(&relative) {
            continue;
        }

        let content_type = match content_type_for_path(path) {
            Some(ct) => ct,
            None => {
                tracing::debug!(file = %relative, "no extractor for file type, skipping");
                continue;
            }
        };

        files.push(CorpusFile {
            path: path.to_path_buf(),
            relative,
            content_type,
        });
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

/// Document ids for `files`, in the same order.
///
/// A file's id is its file-name id (`"docs/LFH study.pdf"` gives
/// `LFH_study`). Files whose file-name ids collide all take an id built
/// from their whole relative path instead (`notes.md` and `notes.txt` give
/// `notes_md` and `notes_txt`). Fails if ids still collide.
pub fn assign_document_ids(files: &[CorpusFile]) -> Result<Vec<String>> {
    let stems: Vec<String> = files
        .iter()
        .map(|f| document_id_from_path(&f.relative))
        .collect();
    let mut stem_counts: HashMap<&str, usize> = HashMap::new();
    for stem in &stems {
        *stem_counts.entry(stem.as_str()).or_default() += 1;
    }

    let ids: Vec<String> = files
        .iter()
        .zip(&stems)
        .map(|(file, stem)| {
            if stem_counts[stem.as_str()] > 1 {
                let id = document_id_from_relative_path(&file.relative);
                tracing::info!(
                    file = %file.relative,
                    document_id = %id,
                    "file name shared with another corpus file, using path-based id"
                );
                id
            } else {
                stem.clone()
            }
        })
        .collect();

    let mut owners: HashMap<&str, &str> = HashMap::new();
    for (id, file) in ids.iter().zip(files) {
        if let Some(other) = owners.insert(id.as_str(), file.relative.as_str()) {
            bail!(
                "Corpus files '{}' and '{}' both map to document id '{}'; rename one of them",
                other,
                file.relative,
                id
            );
        }
    }
    Ok(ids)
}

/// Extract each file into a document with a corpus-unique id.
///
/// Files that fail to read or extract are logged and skipped.
pub fn load_documents(files: &[CorpusFile]) -> Result<Vec<SourceDocument>> {
    let ids = assign_document_ids(files)?;
    let mut docs = Vec::with_capacity(files.len());

    for (file, id) in files.iter().zip(ids) {
        let text = match read_file(&file.path, file.content_type) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(file = %file.relative, error = %e, "skipping unreadable corpus file");
                continue;
            }
        };

        let mut metadata = Metadata::new();
        metadata.insert(META_SOURCE.to_string(), file.path.display().to_string());
        metadata.insert(
            "file_name".to_string(),
            file.path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        );
        metadata.insert("content_type".to_string(), file.content_type.to_string());

        docs.push(SourceDocument { id, text, metadata });
    }

    Ok(docs)
}

fn read_file(path: &Path, content_type: &str) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(extract_text(&bytes, content_type)?)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
