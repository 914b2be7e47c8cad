//! Incremental indexing pipeline.
//!
//! One run: verify the index, scan the source directory, digest every
//! candidate, drop those whose digest is already in the ledger, then index
//! the rest in path order. For each file the embeddings are written to the
//! index *before* its digest is appended to the ledger, so a digest in the
//! ledger always means the content is present in the index. A crash
//! between the two steps only causes the file to be embedded again later.
//!
//! A file that fails to read, extract or embed is logged and skipped; its
//! digest is withheld so the next run retries it. A failing ledger append
//! aborts the run.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::Config;
use crate::connector_fs;
use crate::extract::{self, Format};
use crate::index::VectorIndex;
use crate::ledger::{self, ContentDigest, HashLedger};
use crate::models::{EmbeddingRecord, SourceFile};

#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// List new files without extracting, embedding or recording anything.
    pub dry_run: bool,
    /// Process at most this many new files.
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub candidates: usize,
    pub already_indexed: usize,
    /// Files selected for this run, in processing order.
    pub new_files: Vec<PathBuf>,
    pub indexed: usize,
    pub failed: usize,
    pub records_written: usize,
    pub dry_run: bool,
}

impl IndexReport {
    pub fn print(&self, directory: &Path) {
        if self.dry_run {
            println!("index {} (dry-run)", directory.display());
            println!("  candidates: {}", self.candidates);
            println!("  already indexed: {}", self.already_indexed);
            println!("  new files: {}", self.new_files.len());
            return;
        }

        println!("index {}", directory.display());
        println!("  candidates: {}", self.candidates);
        println!("  already indexed: {}", self.already_indexed);
        println!("  new files: {}", self.new_files.len());
        println!("  indexed: {}", self.indexed);
        println!("  failed: {}", self.failed);
        println!("  records written: {}", self.records_written);
        println!("ok");
    }
}

enum Outcome {
    Indexed {
        digest: ContentDigest,
        records: usize,
    },
    /// Content changed since the scan into something already indexed.
    AlreadyIndexed,
}

pub async fn run_index(
    config: &Config,
    index: &VectorIndex,
    ledger: &HashLedger,
    options: &IndexOptions,
) -> Result<IndexReport> {
    index
        .verify(
            &config.index.verification_query,
            config.index.verification_preview_chars,
        )
        .await
        .context("Index verification failed")?;

    let directory = config.documents.resolved_directory();
    let extension = &config.documents.extension;
    tracing::info!(
        "Listing non-indexed {} from: {}",
        extension,
        directory.display()
    );

    let paths = connector_fs::list_files_with_extension(&directory, extension)?;
    let mut report = IndexReport {
        candidates: paths.len(),
        dry_run: options.dry_run,
        ..IndexReport::default()
    };

    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        match ledger::digest_of(&path) {
            Ok(digest) => sources.push(SourceFile { path, digest }),
            Err(e) => {
                tracing::error!("Skipping {}: {:#}", path.display(), e);
                report.failed += 1;
            }
        }
    }

    let mut known = ledger.list()?;
    let scanned = sources.len();
    let mut pending = filter_indexed(sources, &known);
    report.already_indexed = scanned - pending.len();

    pending.sort_by(|a, b| a.path.cmp(&b.path));
    if let Some(limit) = options.limit {
        if pending.len() > limit {
            tracing::info!(
                "Limiting this run to {} of {} new files.",
                limit,
                pending.len()
            );
            pending.truncate(limit);
        }
    }

    report.new_files = pending.iter().map(|f| f.path.clone()).collect();
    tracing::info!(
        "New files to be indexed:{}",
        printable_list(&report.new_files)
    );

    if options.dry_run {
        return Ok(report);
    }

    for file in &pending {
        // Identical content may appear under several names in one run.
        if known.contains(&file.digest) {
            tracing::info!(
                "Skipping {}: same content already indexed.",
                file.path.display()
            );
            report.already_indexed += 1;
            continue;
        }

        match index_file(config, index, file, &known).await {
            Ok(Outcome::Indexed { digest, records }) => {
                ledger.record(&digest).with_context(|| {
                    format!(
                        "Embeddings of {} are stored but its hash could not be recorded",
                        file.path.display()
                    )
                })?;
                known.insert(digest);
                report.indexed += 1;
                report.records_written += records;
            }
            Ok(Outcome::AlreadyIndexed) => report.already_indexed += 1,
            Err(e) => {
                tracing::error!("Failed to index {}: {:#}", file.path.display(), e);
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

/// The files whose digest is not in `indexed`.
pub fn filter_indexed(
    sources: Vec<SourceFile>,
    indexed: &HashSet<ContentDigest>,
) -> Vec<SourceFile> {
    sources
        .into_iter()
        .filter(|f| !indexed.contains(&f.digest))
        .collect()
}

async fn index_file(
    config: &Config,
    index: &VectorIndex,
    file: &SourceFile,
    known: &HashSet<ContentDigest>,
) -> Result<Outcome> {
    tracing::info!("Indexing embeddings of: {}", file.path.display());

    let bytes = std::fs::read(&file.path)
        .with_context(|| format!("Failed to read {}", file.path.display()))?;

    // Record the digest of the bytes actually embedded.
    let digest = ContentDigest::of_bytes(&bytes);
    if digest != file.digest {
        tracing::warn!(
            "{} changed since it was scanned; indexing its current content",
            file.path.display()
        );
        if known.contains(&digest) {
            return Ok(Outcome::AlreadyIndexed);
        }
    }

    let fragments = extract::extract_fragments(
        &bytes,
        Format::for_path(&file.path),
        config.chunking.max_tokens,
    )?;

    let vectors = index.embedder().embed(&fragments).await?;
    if vectors.len() != fragments.len() {
        bail!(
            "Embedding returned {} vectors for {} fragments",
            vectors.len(),
            fragments.len()
        );
    }

    let source = file.path.to_string_lossy().to_string();
    let records: Vec<EmbeddingRecord> = fragments
        .into_iter()
        .zip(vectors)
        .enumerate()
        .map(|(i, (content, vector))| EmbeddingRecord {
            id: Uuid::new_v4().to_string(),
            source: source.clone(),
            fragment_index: i as i64,
            content_hash: hash_text(&content),
            content,
            file_digest: digest.to_string(),
            vector,
        })
        .collect();

    index.add_documents(&records).await?;
    tracing::info!("Embeddings indexed.");

    Ok(Outcome::Indexed {
        digest,
        records: records.len(),
    })
}

/// `" (none)"`, or one `\n\t`-prefixed line per item in sorted order.
pub fn printable_list<P: AsRef<Path>>(items: &[P]) -> String {
    if items.is_empty() {
        return " (none)".to_string();
    }
    let mut sorted: Vec<String> = items
        .iter()
        .map(|p| p.as_ref().display().to_string())
        .collect();
    sorted.sort();
    sorted.iter().map(|s| format!("\n\t{}", s)).collect()
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
