//! Categorical relabeling and aggregation.
//!
//! Both operations return a new [`Frame`]; the input is never modified, so a
//! cached canonical table can be relabeled for many summaries.

use std::collections::BTreeMap;

use crate::{
    error::{SummaryError, SummaryResult},
    frame::Frame,
    schema::{CategoryMapping, SchemaModel, ValueMapping},
};

/// Replaces codes in `name` with their direct labels. Codes without a label
/// pass through unchanged.
pub fn label_column(table: &Frame, model: &SchemaModel, name: &str) -> SummaryResult<Frame> {
    match model.get_value_mapping(name).and_then(ValueMapping::labels) {
        Some(labels) => relabel(table, name, labels),
        None => Ok(table.clone()),
    }
}

/// Adds the aggregation group column derived from `name`, keeping `name`
/// intact. Codes without a group pass through unchanged.
pub fn aggregate_column(table: &Frame, model: &SchemaModel, name: &str) -> SummaryResult<Frame> {
    match model.get_value_mapping(name).and_then(ValueMapping::aggregation) {
        Some((output, groups)) => derive_groups(table, name, output, groups),
        None => Ok(table.clone()),
    }
}

pub fn relabel(
    table: &Frame,
    name: &str,
    labels: &BTreeMap<String, String>,
) -> SummaryResult<Frame> {
    let values = translate(table, name, labels)?;
    table.with_column(name, values)
}

pub fn derive_groups(
    table: &Frame,
    name: &str,
    output: &str,
    groups: &BTreeMap<String, String>,
) -> SummaryResult<Frame> {
    let values = translate(table, name, groups)?;
    table.with_column(output, values)
}

/// Applies every mapping declared for `mapping.column`, aggregation first so
/// groups are keyed by the raw codes.
pub fn apply_mapping(table: &Frame, mapping: &ValueMapping) -> SummaryResult<Frame> {
    let mut current = table.clone();
    for step in &mapping.mappings {
        if let CategoryMapping::AggregationGroup { output, groups } = step {
            current = derive_groups(&current, &mapping.column, output, groups)?;
        }
    }
    for step in &mapping.mappings {
        if let CategoryMapping::DirectLabel(labels) = step {
            current = relabel(&current, &mapping.column, labels)?;
        }
    }
    Ok(current)
}

fn translate(
    table: &Frame,
    name: &str,
    mapping: &BTreeMap<String, String>,
) -> SummaryResult<Vec<String>> {
    let values = table.column_values(name).ok_or_else(|| SummaryError::MissingColumn {
        table: String::new(),
        column: name.to_string(),
        aliases: vec![name.to_string()],
    })?;
    Ok(values
        .map(|raw| lookup(mapping, raw).unwrap_or(raw).to_string())
        .collect())
}

// Codes exported as floats ("1.0") still match integer keys.
fn lookup<'a>(mapping: &'a BTreeMap<String, String>, raw: &str) -> Option<&'a str> {
    let trimmed = raw.trim();
    if let Some(found) = mapping.get(trimmed) {
        return Some(found);
    }
    let number = trimmed.parse::<f64>().ok()?;
    if number.fract() == 0.0 && number.abs() < 1e15 {
        mapping.get(&format!("{number:.0}")).map(String::as_str)
    } else {
        None
    }
}
