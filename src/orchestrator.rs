//! Drives the (summary x dataset) grid.
//!
//! Every summary is executed against every dataset. Per-pair failures are
//! recorded in the [`RunReport`] and never stop the remaining grid; only
//! output persistence errors abort. After a summary's pairs complete, the
//! successful results are combined into one long-format table.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use encoding_rs::{Encoding, UTF_8};
use heck::ToSnakeCase;
use log::{debug, info, warn};
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};

use crate::{
    aggregate::{ResultTable, SummaryRequest, compute_summary},
    binner,
    cache::TableCache,
    combine,
    dataset::{DatasetCatalog, DatasetDescriptor},
    error::{SummaryError, SummaryResult},
    filter::FilterExpr,
    frame::Frame,
    io_utils, labeler, mapper,
    report::{MANIFEST_FILE, RunReport},
    schema::{ColumnType, SchemaModel, SummarySpec, TableSchema, WeightFieldSpec},
};

pub const COMBINED_FILE: &str = "combined.csv";

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub output_dir: PathBuf,
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
    /// Worker threads per summary; `None` or `Some(1)` runs sequentially.
    pub jobs: Option<usize>,
    /// Overrides every summary's share column name.
    pub share_name: Option<String>,
    /// Configuration files digested into the manifest.
    pub config_files: Vec<PathBuf>,
}

impl RunOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            delimiter: None,
            encoding: UTF_8,
            jobs: None,
            share_name: None,
            config_files: Vec::new(),
        }
    }
}

pub struct Orchestrator<'a> {
    model: &'a SchemaModel,
    catalog: &'a DatasetCatalog,
    options: &'a RunOptions,
    cache: TableCache,
}

impl<'a> Orchestrator<'a> {
    pub fn new(model: &'a SchemaModel, catalog: &'a DatasetCatalog, options: &'a RunOptions) -> Self {
        Self {
            model,
            catalog,
            options,
            cache: TableCache::new(),
        }
    }

    /// Runs the whole grid, writes outputs and the manifest.
    pub fn run(&self) -> Result<RunReport> {
        let pool = self.thread_pool()?;
        let mut report = RunReport::new();
        for spec in self.model.get_summary_specs() {
            let outcomes = match &pool {
                Some(pool) => pool.install(|| {
                    self.catalog
                        .datasets()
                        .par_iter()
                        .map(|dataset| self.execute_pair(spec, dataset))
                        .collect::<Vec<_>>()
                }),
                None => self
                    .catalog
                    .datasets()
                    .iter()
                    .map(|dataset| self.execute_pair(spec, dataset))
                    .collect(),
            };
            self.persist_summary(spec, outcomes, &mut report)?;
        }

        let manifest_path = self.options.output_dir.join(MANIFEST_FILE);
        report
            .write_manifest(&manifest_path, &self.config_digests()?)
            .with_context(|| format!("Writing run manifest to {manifest_path:?}"))?;
        info!(
            "Run complete: {} output(s) written, {} pair(s) skipped; manifest at {:?}",
            report.outputs.len(),
            report.skipped.len(),
            manifest_path
        );
        Ok(report)
    }

    /// Computes one summary for one dataset without writing anything.
    pub fn execute_pair(
        &self,
        spec: &SummarySpec,
        dataset: &DatasetDescriptor,
    ) -> SummaryResult<ResultTable> {
        let canonical = self.canonical_table(dataset, &spec.table)?;
        let prepared = prepare(&canonical, self.model)?;
        let filter = spec.filter.as_deref().map(FilterExpr::parse).transpose()?;
        mapper::validate(&prepared, spec, self.model, filter.as_ref())?;

        let weight = resolve_weight(self.model, spec);
        let schema = prepared_schema(self.model, &spec.table);
        let share_name = self
            .options
            .share_name
            .as_deref()
            .unwrap_or(&spec.share_name);
        let request = SummaryRequest {
            group_by: &spec.group_by,
            weight: weight.as_ref(),
            filter: filter.as_ref(),
            share_by: spec.share_by.as_deref(),
            count_name: &spec.count,
            share_name,
        };
        let result = compute_summary(&prepared, &request, schema.as_ref())?;
        debug!(
            "Summary '{}' on dataset '{}': {} group(s)",
            spec.name,
            dataset.id,
            result.rows.len()
        );
        Ok(result)
    }

    fn canonical_table(
        &self,
        dataset: &DatasetDescriptor,
        table: &str,
    ) -> SummaryResult<Arc<Frame>> {
        let files = dataset
            .files(table)
            .ok_or_else(|| SummaryError::TableUnavailable {
                table: table.to_string(),
            })?;
        self.cache.get_or_load(&dataset.id, table, || {
            let raw = io_utils::read_frame(files, self.options.delimiter, self.options.encoding)?;
            debug!(
                "Read {} row(s) of '{table}' for dataset '{}' from {} file(s)",
                raw.row_count(),
                dataset.id,
                files.len()
            );
            mapper::apply(&raw, self.model, table)
        })
    }

    fn persist_summary(
        &self,
        spec: &SummarySpec,
        outcomes: Vec<SummaryResult<ResultTable>>,
        report: &mut RunReport,
    ) -> Result<()> {
        let summary_dir = self.options.output_dir.join(spec.name.to_snake_case());
        let mut results = BTreeMap::new();
        for (dataset, outcome) in self.catalog.datasets().iter().zip(outcomes) {
            let path = summary_dir.join(format!("{}.csv", dataset.slug()));
            match outcome {
                Ok(result) => {
                    write_result(&path, &result.to_frame()?)?;
                    report.record_output(&spec.name, Some(dataset.id.as_str()), path, result.rows.len());
                    results.insert(dataset.id.clone(), result);
                }
                Err(err) if err.is_recoverable() => {
                    warn!(
                        "Skipping summary '{}' for dataset '{}' ({}): {err}",
                        spec.name,
                        dataset.id,
                        err.category()
                    );
                    remove_stale(&path)?;
                    report.record_skip(&spec.name, &dataset.id, &err);
                }
                Err(err) => return Err(err.into()),
            }
        }

        let path = summary_dir.join(COMBINED_FILE);
        if results.is_empty() {
            warn!("Summary '{}' produced no results; nothing to combine", spec.name);
            return remove_stale(&path);
        }
        let combined = combine::combine(&results, self.catalog)
            .with_context(|| format!("Combining results for summary '{}'", spec.name))?;
        write_result(&path, &combined.to_frame()?)?;
        info!(
            "Summary '{}': combined {} row(s) from {} dataset(s) into {:?}",
            spec.name,
            combined.rows.len(),
            results.len(),
            path
        );
        report.record_output(&spec.name, None, path, combined.rows.len());
        Ok(())
    }

    fn thread_pool(&self) -> Result<Option<ThreadPool>> {
        match self.options.jobs {
            Some(threads) if threads > 1 => {
                let pool = ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .context("Creating worker thread pool")?;
                Ok(Some(pool))
            }
            _ => Ok(None),
        }
    }

    fn config_digests(&self) -> Result<BTreeMap<String, String>> {
        let mut digests = BTreeMap::new();
        for path in &self.options.config_files {
            digests.insert(path.display().to_string(), io_utils::file_digest(path)?);
        }
        Ok(digests)
    }
}

fn write_result(path: &Path, frame: &Frame) -> Result<()> {
    io_utils::write_frame(path, frame)?;
    debug!("Wrote {} row(s) to {:?}", frame.row_count(), path);
    Ok(())
}

/// Removes an output left by an earlier run for a pair that is now skipped.
fn remove_stale(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).with_context(|| format!("Removing stale output {path:?}"))?;
        debug!("Removed stale output {:?}", path);
    }
    Ok(())
}

/// Derives aggregation groups, labels, and bins on a canonical table.
///
/// Derivations whose source column is absent are skipped; a summary that
/// needs one of them fails validation afterwards.
pub fn prepare(canonical: &Frame, model: &SchemaModel) -> SummaryResult<Frame> {
    let mut prepared = canonical.clone();
    for mapping in model.value_mappings() {
        if prepared.has_column(&mapping.column) {
            prepared = labeler::apply_mapping(&prepared, mapping)?;
        }
    }
    for spec in model.binning_specs() {
        if prepared.has_column(&spec.column) {
            prepared = binner::bin(&prepared, spec)?;
        }
    }
    Ok(prepared)
}

/// The table schema as seen after preparation: labeled columns hold text.
fn prepared_schema(model: &SchemaModel, table: &str) -> Option<TableSchema> {
    let mut schema = model.table(table)?.clone();
    for column in &mut schema.columns {
        let labeled = model
            .get_value_mapping(&column.name)
            .and_then(|mapping| mapping.labels())
            .is_some();
        if labeled {
            column.datatype = ColumnType::String;
        }
    }
    Some(schema)
}

/// A summary's `weight` names the field; the table declaration supplies
/// default, inversion, and enablement.
pub fn resolve_weight(model: &SchemaModel, spec: &SummarySpec) -> Option<WeightFieldSpec> {
    let declared = model.get_weight_field(&spec.table);
    match (&spec.weight, declared) {
        (Some(field), Some(declared)) => Some(WeightFieldSpec {
            field: field.clone(),
            ..declared.clone()
        }),
        (Some(field), None) => Some(WeightFieldSpec::new(field.clone())),
        (None, declared) => declared.cloned(),
    }
}
