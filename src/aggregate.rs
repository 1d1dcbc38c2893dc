//! Weighted group-by aggregation with share normalization.
//!
//! [`compute_summary`] filters rows, resolves a weight per row, sums weights
//! per group-by combination, optionally normalizes shares within a partition,
//! and sorts the result by group-by values. Unweighted counting is the
//! uniform-weight case of the same path.

use std::collections::HashMap;

use itertools::Itertools;
use log::{debug, warn};

use crate::{
    data::{compare_keys, format_number, parse_number},
    error::{SummaryError, SummaryResult},
    filter::FilterExpr,
    frame::Frame,
    schema::{TableSchema, WeightFieldSpec},
};

/// Parameters of one aggregation, borrowed from a summary specification.
#[derive(Debug, Clone, Copy)]
pub struct SummaryRequest<'a> {
    pub group_by: &'a [String],
    pub weight: Option<&'a WeightFieldSpec>,
    pub filter: Option<&'a FilterExpr>,
    /// `None` disables shares; an empty slice normalizes over the grand total.
    pub share_by: Option<&'a [String]>,
    pub count_name: &'a str,
    pub share_name: &'a str,
}

impl<'a> SummaryRequest<'a> {
    pub fn new(group_by: &'a [String], count_name: &'a str) -> Self {
        Self {
            group_by,
            weight: None,
            filter: None,
            share_by: None,
            count_name,
            share_name: crate::schema::DEFAULT_SHARE_NAME,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub key: Vec<String>,
    pub count: f64,
    pub share: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    pub group_by: Vec<String>,
    pub count_name: String,
    pub share_name: Option<String>,
    pub rows: Vec<ResultRow>,
}

impl ResultTable {
    pub fn total(&self) -> f64 {
        self.rows.iter().map(|row| row.count).sum()
    }

    pub fn find(&self, key: &[&str]) -> Option<&ResultRow> {
        self.rows
            .iter()
            .find(|row| row.key.iter().map(String::as_str).eq(key.iter().copied()))
    }

    pub fn headers(&self) -> Vec<String> {
        let mut headers = self.group_by.clone();
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
                let mut cells = row.key.clone();
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

enum WeightSource<'a> {
    Uniform,
    Column {
        name: &'a str,
        idx: usize,
        default: f64,
        invert: bool,
    },
}

impl<'a> WeightSource<'a> {
    fn resolve(table: &Frame, spec: Option<&'a WeightFieldSpec>) -> Self {
        let Some(spec) = spec.filter(|spec| spec.enabled) else {
            return WeightSource::Uniform;
        };
        match table.column_index(&spec.field) {
            Some(idx) => WeightSource::Column {
                name: &spec.field,
                idx,
                default: spec.default,
                invert: spec.invert,
            },
            None => {
                warn!(
                    "Weight field '{}' is not present; falling back to uniform weight 1",
                    spec.field
                );
                WeightSource::Uniform
            }
        }
    }

    fn weight(&self, row_idx: usize, row: &[String]) -> SummaryResult<f64> {
        match self {
            WeightSource::Uniform => Ok(1.0),
            WeightSource::Column {
                name,
                idx,
                default,
                invert,
            } => {
                let raw = row[*idx].trim();
                let value = if raw.is_empty() {
                    *default
                } else {
                    parse_number(raw).ok_or_else(|| SummaryError::InvalidWeight {
                        column: name.to_string(),
                        row: row_idx + 1,
                        value: raw.to_string(),
                    })?
                };
                Ok(match (*invert, value) {
                    (true, v) if v == 0.0 => 0.0,
                    (true, v) => 1.0 / v,
                    (false, v) => v,
                })
            }
        }
    }
}

pub fn compute_summary(
    table: &Frame,
    request: &SummaryRequest<'_>,
    schema: Option<&TableSchema>,
) -> SummaryResult<ResultTable> {
    let group_indices = request
        .group_by
        .iter()
        .map(|name| {
            table
                .column_index(name)
                .ok_or_else(|| SummaryError::MissingColumn {
                    table: String::new(),
                    column: name.clone(),
                    aliases: vec![name.clone()],
                })
        })
        .collect::<SummaryResult<Vec<_>>>()?;

    let keep = match request.filter {
        Some(filter) => Some(filter.mask(table, schema)?),
        None => None,
    };
    let weights = WeightSource::resolve(table, request.weight);

    let mut groups: HashMap<Vec<String>, Vec<f64>> = HashMap::new();
    let mut kept = 0usize;
    for (row_idx, row) in table.rows().iter().enumerate() {
        if keep.as_ref().is_some_and(|mask| !mask[row_idx]) {
            continue;
        }
        let weight = weights.weight(row_idx, row)?;
        let key = group_indices.iter().map(|idx| row[*idx].clone()).collect();
        groups.entry(key).or_default().push(weight);
        kept += 1;
    }
    debug!(
        "Aggregated {kept} of {} row(s) into {} group(s)",
        table.row_count(),
        groups.len()
    );

    let mut rows = groups
        .into_iter()
        .map(|(key, mut weights)| ResultRow {
            key,
            count: stable_sum(&mut weights),
            share: None,
        })
        .sorted_by(|a, b| compare_keys(&a.key, &b.key))
        .collect::<Vec<_>>();

    let share_name = match request.share_by {
        Some(partition) => {
            apply_shares(&mut rows, request.group_by, partition)?;
            Some(request.share_name.to_string())
        }
        None => None,
    };

    Ok(ResultTable {
        group_by: request.group_by.to_vec(),
        count_name: request.count_name.to_string(),
        share_name,
        rows,
    })
}

// Summing in sorted order makes the total independent of row arrival order.
fn stable_sum(weights: &mut [f64]) -> f64 {
    weights.sort_by(f64::total_cmp);
    weights.iter().sum()
}

fn apply_shares(
    rows: &mut [ResultRow],
    group_by: &[String],
    partition: &[String],
) -> SummaryResult<()> {
    let positions = partition
        .iter()
        .map(|name| {
            group_by.iter().position(|g| g == name).ok_or_else(|| {
                SummaryError::config(format!(
                    "Share partition column '{name}' is not a group-by column"
                ))
            })
        })
        .collect::<SummaryResult<Vec<_>>>()?;
    let partition_key =
        |row: &ResultRow| positions.iter().map(|p| row.key[*p].clone()).collect::<Vec<_>>();

    let mut totals: HashMap<Vec<String>, Vec<f64>> = HashMap::new();
    for row in rows.iter() {
        totals.entry(partition_key(row)).or_default().push(row.count);
    }
    let totals: HashMap<Vec<String>, f64> = totals
        .into_iter()
        .map(|(key, mut counts)| (key, stable_sum(&mut counts)))
        .collect();

    for row in rows.iter_mut() {
        let total = totals.get(&partition_key(&*row)).copied().unwrap_or(0.0);
        // A partition whose weights are all zero has no meaningful share.
        row.share = Some(if total == 0.0 { 0.0 } else { row.count / total });
    }
    Ok(())
}
