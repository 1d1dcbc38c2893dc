//! Discretize a continuous column into labeled half-open ranges.

use crate::{
    data::parse_number,
    error::{SummaryError, SummaryResult},
    frame::Frame,
    schema::BinningSpec,
};

/// Label for a non-numeric or blank cell. Such rows are kept, not dropped.
pub const MISSING_LABEL: &str = "missing";

/// Adds `spec.output_name()` to `table`, assigning every row exactly one label.
pub fn bin(table: &Frame, spec: &BinningSpec) -> SummaryResult<Frame> {
    spec.ensure_valid()?;
    let values = table
        .column_values(&spec.column)
        .ok_or_else(|| SummaryError::MissingColumn {
            table: String::new(),
            column: spec.column.clone(),
            aliases: vec![spec.column.clone()],
        })?
        .map(|raw| match parse_number(raw) {
            Some(value) => label_for(spec, value).to_string(),
            None => MISSING_LABEL.to_string(),
        })
        .collect();
    table.with_column(&spec.output_name(), values)
}

/// Convenience form taking breakpoints and labels directly.
pub fn bin_with(
    table: &Frame,
    name: &str,
    breakpoints: &[f64],
    labels: &[&str],
) -> SummaryResult<Frame> {
    let spec = BinningSpec::new(
        name,
        breakpoints.to_vec(),
        labels.iter().map(|l| l.to_string()).collect(),
    );
    bin(table, &spec)
}

/// Interval `[breakpoints[i], breakpoints[i + 1])` containing `value`.
pub fn label_for(spec: &BinningSpec, value: f64) -> &str {
    let points = &spec.breakpoints;
    if value < points[0] {
        return &spec.below_label;
    }
    if value >= points[points.len() - 1] {
        return &spec.above_label;
    }
    // First breakpoint strictly greater than value closes the interval.
    let upper = points.partition_point(|point| *point <= value);
    &spec.labels[upper - 1]
}
