//! Column mapping: resolve heterogeneous source headers to canonical names.

use std::collections::BTreeSet;

use log::debug;

use crate::{
    error::{SummaryError, SummaryResult},
    filter::FilterExpr,
    frame::Frame,
    schema::{SchemaModel, SummarySpec, TableSchema},
};

/// Renames `raw`'s columns to the canonical names declared for `table_type`.
///
/// For each canonical column the candidate names are scanned in priority
/// order and the first one present in the raw header wins. Columns that are
/// not declared are dropped, except weight fields named by the table or by
/// one of its summaries. Missing required columns fail with every candidate
/// listed; missing optional columns are simply absent.
pub fn apply(raw: &Frame, model: &SchemaModel, table_type: &str) -> SummaryResult<Frame> {
    let schema = model.table(table_type).ok_or_else(|| {
        SummaryError::config(format!("Table type '{table_type}' is not declared"))
    })?;
    let weights = model.weight_fields(table_type);
    map_columns(raw, schema, table_type, &weights)
}

pub fn map_columns(
    raw: &Frame,
    schema: &TableSchema,
    table_type: &str,
    keep: &BTreeSet<String>,
) -> SummaryResult<Frame> {
    let mut picks = Vec::with_capacity(schema.columns.len() + keep.len());
    let mut defaults = Vec::new();
    for column in &schema.columns {
        let candidates = column.candidate_names();
        let found = candidates
            .iter()
            .find_map(|name| raw.column_index(name).map(|idx| (idx, name)));
        match found {
            Some((idx, source)) => {
                if source != &column.name {
                    debug!(
                        "Table '{table_type}': mapped source column '{source}' to '{}'",
                        column.name
                    );
                }
                if let Some(default) = column.default.as_ref() {
                    defaults.push((picks.len(), default.clone()));
                }
                picks.push((idx, column.name.clone()));
            }
            None if column.required => {
                return Err(SummaryError::MissingColumn {
                    table: table_type.to_string(),
                    column: column.name.clone(),
                    aliases: candidates,
                });
            }
            None => {
                debug!(
                    "Table '{table_type}': optional column '{}' not present",
                    column.name
                );
            }
        }
    }
    for name in keep {
        if schema.column(name).is_some() || picks.iter().any(|(_, picked)| picked == name) {
            continue;
        }
        if let Some(idx) = raw.column_index(name) {
            picks.push((idx, name.clone()));
        }
    }
    let mapped = raw.select_renamed(&picks);
    fill_defaults(mapped, &defaults)
}

// Defaults fill blank cells of columns that exist; absent columns stay absent.
fn fill_defaults(frame: Frame, defaults: &[(usize, String)]) -> SummaryResult<Frame> {
    let mut frame = frame;
    for (idx, default) in defaults {
        let name = frame.columns()[*idx].clone();
        let needs_fill = frame.rows().iter().any(|row| row[*idx].trim().is_empty());
        if !needs_fill {
            continue;
        }
        let values = frame
            .rows()
            .iter()
            .map(|row| {
                if row[*idx].trim().is_empty() {
                    default.clone()
                } else {
                    row[*idx].clone()
                }
            })
            .collect();
        frame = frame.with_column(&name, values)?;
    }
    Ok(frame)
}

/// Confirms every group-by and filter column `spec` references exists in the
/// prepared table.
pub fn validate(
    table: &Frame,
    spec: &SummarySpec,
    model: &SchemaModel,
    filter: Option<&FilterExpr>,
) -> SummaryResult<()> {
    let mut referenced: Vec<&str> = spec.group_by.iter().map(String::as_str).collect();
    if let Some(filter) = filter {
        referenced.extend(filter.columns());
    }
    // An absent weight column degrades to uniform weights in the aggregator.
    for name in referenced {
        if !table.has_column(name) {
            return Err(SummaryError::MissingColumn {
                table: spec.table.clone(),
                column: name.to_string(),
                aliases: attempted_names(model, &spec.table, name),
            });
        }
    }
    Ok(())
}

/// Source names that would have produced `name`, including the source column
/// of a derived (aggregated or binned) column.
fn attempted_names(model: &SchemaModel, table: &str, name: &str) -> Vec<String> {
    if let Some(aliases) = model.get_aliases(table, name) {
        return aliases;
    }
    let derived_from = model
        .value_mappings()
        .find_map(|mapping| {
            mapping
                .aggregation()
                .filter(|(output, _)| *output == name)
                .map(|_| mapping.column.clone())
        })
        .or_else(|| {
            model
                .binning_specs()
                .find(|spec| spec.output_name() == name)
                .map(|spec| spec.column.clone())
        });
    match derived_from {
        Some(source) => model
            .get_aliases(table, &source)
            .unwrap_or_else(|| vec![source]),
        None => vec![name.to_string()],
    }
}
