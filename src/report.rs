//! Run report and manifest.
//!
//! The report collects every written output and every skipped
//! (summary, dataset) pair. It is rendered as aligned text tables at the end
//! of a run and persisted as `manifest.json` next to the outputs.

use std::{
    collections::BTreeMap,
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    error::{SkipCategory, SummaryError},
    table,
};

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedPair {
    pub summary: String,
    pub dataset: String,
    pub category: SkipCategory,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WrittenOutput {
    pub summary: String,
    /// `None` for a combined table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
    pub path: PathBuf,
    pub rows: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub outputs: Vec<WrittenOutput>,
    pub skipped: Vec<SkippedPair>,
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    generated_at: DateTime<Utc>,
    config_digests: &'a BTreeMap<String, String>,
    outputs: &'a [WrittenOutput],
    skipped: &'a [SkippedPair],
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_output(
        &mut self,
        summary: &str,
        dataset: Option<&str>,
        path: PathBuf,
        rows: usize,
    ) {
        self.outputs.push(WrittenOutput {
            summary: summary.to_string(),
            dataset: dataset.map(str::to_string),
            path,
            rows,
        });
    }

    pub fn record_skip(&mut self, summary: &str, dataset: &str, err: &SummaryError) {
        self.skipped.push(SkippedPair {
            summary: summary.to_string(),
            dataset: dataset.to_string(),
            category: err.category(),
            reason: err.to_string(),
        });
    }

    pub fn output_for(&self, summary: &str, dataset: &str) -> Option<&WrittenOutput> {
        self.outputs
            .iter()
            .find(|o| o.summary == summary && o.dataset.as_deref() == Some(dataset))
    }

    pub fn combined_output(&self, summary: &str) -> Option<&WrittenOutput> {
        self.outputs
            .iter()
            .find(|o| o.summary == summary && o.dataset.is_none())
    }

    pub fn skip_for(&self, summary: &str, dataset: &str) -> Option<&SkippedPair> {
        self.skipped
            .iter()
            .find(|s| s.summary == summary && s.dataset == dataset)
    }

    /// Pairs skipped because the summary does not apply to the dataset.
    pub fn not_applicable(&self) -> impl Iterator<Item = &SkippedPair> {
        self.skipped
            .iter()
            .filter(|s| s.category == SkipCategory::NotApplicable)
    }

    /// Pairs skipped because of a broken summary or unusable data.
    pub fn failures(&self) -> impl Iterator<Item = &SkippedPair> {
        self.skipped
            .iter()
            .filter(|s| s.category != SkipCategory::NotApplicable)
    }

    pub fn render(&self) -> String {
        let mut output = format!(
            "Wrote {} output file(s); skipped {} pair(s).\n",
            self.outputs.len(),
            self.skipped.len()
        );
        let not_applicable: Vec<Vec<String>> = self
            .not_applicable()
            .map(|s| vec![s.summary.clone(), s.dataset.clone(), s.reason.clone()])
            .collect();
        if !not_applicable.is_empty() {
            output.push_str("\nNot applicable to dataset:\n");
            let headers = ["summary", "dataset", "reason"].map(String::from);
            output.push_str(&table::render_table(&headers, &not_applicable));
        }
        let failures: Vec<Vec<String>> = self
            .failures()
            .map(|s| {
                vec![
                    s.summary.clone(),
                    s.dataset.clone(),
                    s.category.to_string(),
                    s.reason.clone(),
                ]
            })
            .collect();
        if !failures.is_empty() {
            output.push_str("\nFailed:\n");
            let headers = ["summary", "dataset", "category", "reason"].map(String::from);
            output.push_str(&table::render_table(&headers, &failures));
        }
        output
    }

    pub fn write_manifest(
        &self,
        path: &Path,
        config_digests: &BTreeMap<String, String>,
    ) -> Result<()> {
        let manifest = Manifest {
            generated_at: Utc::now(),
            config_digests,
            outputs: &self.outputs,
            skipped: &self.skipped,
        };
        let file = File::create(path).with_context(|| format!("Creating manifest {path:?}"))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &manifest)
            .context("Writing manifest JSON")
    }
}
