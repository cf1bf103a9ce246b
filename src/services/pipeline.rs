use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use moka::sync::Cache;
use polars::prelude::DataFrame;

use crate::config::Config;
use crate::models::*;
use crate::services::correlation::{correlation_matrix, numeric_columns, resolve_selection, significant_pairs};
use crate::services::heatmap::build_heatmap;
use crate::services::merge::merge_tables;
use crate::services::tabular::{preview, TableReader};

/// One interaction: the uploaded files, the column selection and whether
/// the compute button was pressed.
#[derive(Debug, Clone, Default)]
pub struct CorrelationRequest {
    pub files: Vec<UploadedFile>,
    /// `None` means "use the default selection" (every numeric column).
    pub selected: Option<Vec<String>>,
    pub compute: bool,
}

/// Parse and merge results for one set of files.
#[derive(Debug)]
pub struct Ingested {
    pub files: Vec<FilePreview>,
    pub notices: Vec<Notice>,
    pub merged: Option<DataFrame>,
    pub merged_preview: Option<TablePreview>,
}

pub struct Pipeline {
    reader: TableReader,
    preview_rows: usize,
    cache: Cache<u64, Arc<Ingested>>,
}

impl Pipeline {
    pub fn new(config: &Config) -> Self {
        Self {
            reader: TableReader::new(config.max_file_size),
            preview_rows: config.preview_rows,
            cache: Cache::new(config.cache_capacity),
        }
    }

    /// Runs parse, merge and correlation from scratch for `request`.
    ///
    /// Problems are reported as notices on the returned report; a failed file
    /// or merge never aborts the rest of the report.
    pub fn run(&self, request: &CorrelationRequest) -> CorrelationReport {
        let mut report = CorrelationReport::default();
        if request.files.is_empty() {
            return report;
        }

        let ingested = self.ingest(&request.files);
        report.files = ingested.files.clone();
        report.notices = ingested.notices.clone();
        report.merged = ingested.merged_preview.clone();

        let Some(merged) = ingested.merged.as_ref() else {
            return report;
        };
        report.numeric_columns = numeric_columns(merged);

        let selected = match resolve_selection(merged, request.selected.as_deref()) {
            Ok(selected) => selected,
            Err(e) => {
                report.notices.push(Notice::error(e.to_string()));
                return report;
            }
        };
        report.selected_columns = selected.clone();

        if !request.compute {
            return report;
        }
        if selected.len() < 2 {
            tracing::info!("Correlation requested with {} column(s)", selected.len());
            report.notices.push(Notice::warning(TOO_FEW_COLUMNS_WARNING));
            return report;
        }

        let matrix = match correlation_matrix(merged, &selected) {
            Ok(matrix) => matrix,
            Err(e) => {
                tracing::error!("Correlation failed: {}", e);
                report.notices.push(Notice::error(e.to_string()));
                return report;
            }
        };

        let significant_pairs = significant_pairs(&matrix, SIGNIFICANCE_THRESHOLD);
        if significant_pairs.is_empty() {
            report.notices.push(Notice::info(NO_SIGNIFICANT_PAIRS_INFO));
        }
        tracing::info!(
            "Correlated {} columns, {} significant pair(s)",
            matrix.len(),
            significant_pairs.len()
        );

        let heatmap = build_heatmap(&matrix);
        report.correlation = Some(CorrelationSection {
            matrix,
            significant_pairs,
            heatmap,
        });
        report
    }

    /// Parses and merges `files`, reusing the result for an identical file set.
    pub fn ingest(&self, files: &[UploadedFile]) -> Arc<Ingested> {
        let key = fingerprint(files);
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!("Reusing parsed tables for {} file(s)", files.len());
            return hit;
        }

        let ingested = Arc::new(self.parse_and_merge(files));
        self.cache.insert(key, ingested.clone());
        ingested
    }

    fn parse_and_merge(&self, files: &[UploadedFile]) -> Ingested {
        let mut previews = Vec::new();
        let mut notices = Vec::new();
        let mut tables = Vec::new();

        for file in files {
            let parsed = self
                .reader
                .read(file)
                .and_then(|table| preview(&table.dataframe, self.preview_rows).map(|p| (p, table)));
            match parsed {
                Ok((table_preview, table)) => {
                    previews.push(FilePreview {
                        name: file.name.clone(),
                        preview: table_preview,
                    });
                    tables.push(table);
                }
                Err(e) => {
                    tracing::warn!("Error reading file {}: {}", file.name, e);
                    notices.push(Notice::error(format!("Error reading file {}: {}", file.name, e)));
                }
            }
        }

        let merged = match merge_tables(&tables) {
            Ok(df) => Some(df),
            Err(e) => {
                tracing::error!("Merge failed: {}", e);
                notices.push(Notice::error(e.to_string()));
                None
            }
        };

        let merged_preview = match merged.as_ref().map(|df| preview(df, self.preview_rows)) {
            Some(Ok(p)) => Some(p),
            Some(Err(e)) => {
                notices.push(Notice::error(e.to_string()));
                None
            }
            None => None,
        };

        Ingested {
            files: previews,
            notices,
            merged,
            merged_preview,
        }
    }
}

fn fingerprint(files: &[UploadedFile]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for file in files {
        file.name.hash(&mut hasher);
        file.data.hash(&mut hasher);
    }
    hasher.finish()
}
