//! Re-analysis of existing exports, recording the results in the index.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::analyzer::Summarizer;
use super::cost::calculate_cost;
use super::report::write_report;
use super::types::{LlmError, Provider, Usage};
use crate::export::{relative_path, scan_export_dir, ExportError};
use crate::meta::{AnalysisMeta, MetadataIndex};

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Report(#[from] ExportError),
}

#[derive(Debug, Clone)]
pub struct AnalyzedChannel {
    pub channel_name: String,
    pub report: PathBuf,
    pub usage: Usage,
    pub cost: f64,
    /// Whether the result was recorded in the index.
    pub indexed: bool,
}

#[derive(Debug, Default)]
pub struct AnalyzeReport {
    pub analyzed: Vec<AnalyzedChannel>,
    pub failed: Vec<(PathBuf, String)>,
    pub cancelled: Vec<PathBuf>,
    pub index_error: Option<String>,
}

impl AnalyzeReport {
    pub fn total_cost(&self) -> f64 {
        self.analyzed.iter().map(|a| a.cost).sum()
    }

    pub fn unindexed(&self) -> impl Iterator<Item = &AnalyzedChannel> {
        self.analyzed.iter().filter(|a| !a.indexed)
    }
}

pub struct BatchAnalyzer {
    summarizer: Arc<dyn Summarizer>,
    index: Arc<MetadataIndex>,
    export_root: PathBuf,
    provider: Provider,
    model: String,
    language: String,
}

impl BatchAnalyzer {
    pub fn new(
        summarizer: Arc<dyn Summarizer>,
        index: Arc<MetadataIndex>,
        export_root: impl Into<PathBuf>,
        provider: Provider,
        model: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            summarizer,
            index,
            export_root: export_root.into(),
            provider,
            model: model.into(),
            language: language.into(),
        }
    }

    /// Analyze every export in `paths`, one at a time. Failures are collected
    /// and the batch moves on.
    pub async fn run(&self, paths: &[PathBuf], cancel: &CancellationToken) -> AnalyzeReport {
        let mut report = AnalyzeReport::default();

        for (i, path) in paths.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled.extend(paths[i..].iter().cloned());
                break;
            }
            match self.analyze_one(path).await {
                Ok(done) => report.analyzed.push(done),
                Err(e) => {
                    tracing::error!("Analysis of {} failed: {}", path.display(), e);
                    report.failed.push((path.clone(), e.to_string()));
                }
            }
        }

        if report.analyzed.iter().any(|a| a.indexed) {
            if let Err(e) = self.index.save().await {
                tracing::warn!("Failed to save index: {}", e);
                report.index_error = Some(e.to_string());
            }
        }
        report
    }

    async fn analyze_one(&self, path: &Path) -> Result<AnalyzedChannel, AnalyzeError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| AnalyzeError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let channel_name = channel_name_of(path);

        let result = self.summarizer.summarize(&channel_name, &content).await?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let report = write_report(&result, dir).await?;
        let cost = calculate_cost(&self.model, result.usage);

        let relative = relative_path(path, &self.export_root);
        let entry = match self.index.lookup_by_path(&relative).await {
            Some(entry) => Some(entry),
            None => self.index.lookup_by_name(&channel_name).await,
        };

        let indexed = match entry {
            Some(entry) => {
                let analysis = AnalysisMeta {
                    last_analyzed_at: Utc::now(),
                    model: self.model.clone(),
                    provider: self.provider.to_string(),
                    input_tokens: result.usage.input_tokens,
                    output_tokens: result.usage.output_tokens,
                    cost,
                    language: self.language.clone(),
                };
                match self.index.record_analysis(&entry.id, analysis).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!("Could not record analysis for #{}: {}", channel_name, e);
                        false
                    }
                }
            }
            None => {
                tracing::warn!("#{} is not in the index; analysis not recorded", channel_name);
                false
            }
        };

        Ok(AnalyzedChannel {
            channel_name,
            report,
            usage: result.usage,
            cost,
            indexed,
        })
    }
}

/// Expand directories into the channel exports they contain.
pub fn collect_exports(paths: &[PathBuf]) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(
                scan_export_dir(path)?
                    .into_iter()
                    .map(|scanned| path.join(scanned.relative_path)),
            );
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

fn channel_name_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}
