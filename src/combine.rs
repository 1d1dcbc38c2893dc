//! Union of one summary's per-dataset results into a long-format table.
//!
//! Combinations missing from a dataset are left out rather than zero-filled,
//! so "not observed" stays distinguishable from "observed zero".

use std::{cmp::Ordering, collections::BTreeMap};

use crate::{
    aggregate::ResultTable,
    data::{compare_keys, format_number},
    dataset::{DatasetCatalog, SourceType},
    error::{SummaryError, SummaryResult},
    frame::Frame,
};

pub const DATASET_COLUMN: &str = "dataset";
pub const SOURCE_TYPE_COLUMN: &str = "source_type";

#[derive(Debug, Clone, PartialEq)]
pub struct CombinedRow {
    pub dataset_id: String,
    pub dataset: String,
    pub source: SourceType,
    pub key: Vec<String>,
    pub count: f64,
    pub share: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CombinedTable {
    pub group_by: Vec<String>,
    pub count_name: String,
    pub share_name: Option<String>,
    pub rows: Vec<CombinedRow>,
}

impl CombinedTable {
    pub fn rows_for(&self, dataset_id: &str) -> impl Iterator<Item = &CombinedRow> {
        self.rows.iter().filter(move |row| row.dataset_id == dataset_id)
    }

    pub fn headers(&self) -> Vec<String> {
        let mut headers = vec![DATASET_COLUMN.to_string(), SOURCE_TYPE_COLUMN.to_string()];
        headers.extend(self.group_by.iter().cloned());
        headers.push(self.count_name.clone());
        if let Some(share) = &self.share_name {
            headers.push(share.clone());
        }
        headers
    }

    pub fn to_frame(&self) -> SummaryResult<Frame> {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut cells = vec![row.dataset.clone(), row.source.to_string()];
                cells.extend(row.key.iter().cloned());
                cells.push(format_number(row.count));
                if self.share_name.is_some() {
                    cells.push(row.share.map(|s| s.to_string()).unwrap_or_default());
                }
                cells
            })
            .collect();
        Frame::new(self.headers(), rows)
    }
}

/// Unions `per_dataset` (keyed by dataset id) into one table tagged by dataset.
///
/// Rows are ordered by group-by values, then by the dataset's run order.
pub fn combine(
    per_dataset: &BTreeMap<String, ResultTable>,
    catalog: &DatasetCatalog,
) -> SummaryResult<CombinedTable> {
    let Some(first) = per_dataset.values().next() else {
        return Err(SummaryError::InvalidData(
            "No per-dataset results to combine".to_string(),
        ));
    };
    for (id, result) in per_dataset {
        if result.group_by != first.group_by
            || result.count_name != first.count_name
            || result.share_name != first.share_name
        {
            return Err(SummaryError::InvalidData(format!(
                "Result for dataset '{id}' has columns [{}] but expected [{}]",
                result.headers().join(", "),
                first.headers().join(", ")
            )));
        }
    }

    let mut rows = Vec::new();
    for (id, result) in per_dataset {
        let (name, source) = match catalog.get(id) {
            Some(dataset) => (dataset.display_name().to_string(), dataset.source),
            None => (id.clone(), SourceType::default()),
        };
        rows.extend(result.rows.iter().map(|row| CombinedRow {
            dataset_id: id.clone(),
            dataset: name.clone(),
            source,
            key: row.key.clone(),
            count: row.count,
            share: row.share,
        }));
    }
    rows.sort_by(|a, b| compare_rows(a, b, catalog));

    Ok(CombinedTable {
        group_by: first.group_by.clone(),
        count_name: first.count_name.clone(),
        share_name: first.share_name.clone(),
        rows,
    })
}

/// Orders combined rows the way [`combine`] does; exposed for callers that
/// merge tables from separate runs.
pub fn compare_rows(a: &CombinedRow, b: &CombinedRow, catalog: &DatasetCatalog) -> Ordering {
    compare_keys(&a.key, &b.key)
        .then_with(|| catalog.rank(&a.dataset_id).cmp(&catalog.rank(&b.dataset_id)))
        .then_with(|| a.dataset_id.cmp(&b.dataset_id))
}
