//! Error taxonomy for summary execution.
//!
//! Configuration problems are fatal and abort the run before any table is
//! read. Everything else is scoped to a single (summary, dataset) pair: the
//! orchestrator records it in the run report and moves on.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(
        "Missing column '{column}' in table '{table}' (aliases tried: {})",
        format_aliases(.aliases)
    )]
    MissingColumn {
        table: String,
        column: String,
        aliases: Vec<String>,
    },

    #[error("Filter '{expression}' failed: {reason}")]
    FilterEvaluation { expression: String, reason: String },

    #[error("Weight column '{column}' has non-numeric value '{value}' at row {row}")]
    InvalidWeight {
        column: String,
        row: usize,
        value: String,
    },

    #[error("Table '{table}' is not provided by this dataset")]
    TableUnavailable { table: String },

    #[error("Invalid input data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type SummaryResult<T> = Result<T, SummaryError>;

/// How a skipped (summary, dataset) pair is reported at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipCategory {
    /// The summary does not apply to this dataset's schema.
    NotApplicable,
    /// The summary itself is wrong (bad filter, bad configuration).
    Defect,
    /// The dataset's files could not be read or contain unusable values.
    DataError,
}

impl SkipCategory {
    pub fn label(&self) -> &'static str {
        match self {
            SkipCategory::NotApplicable => "not applicable",
            SkipCategory::Defect => "defect",
            SkipCategory::DataError => "data error",
        }
    }
}

impl fmt::Display for SkipCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl SummaryError {
    pub fn config(message: impl Into<String>) -> Self {
        SummaryError::Config(message.into())
    }

    pub fn filter(expression: &str, reason: impl Into<String>) -> Self {
        SummaryError::FilterEvaluation {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }

    /// Copy of this error for another consumer of the same cached failure.
    /// IO and CSV sources are flattened into `InvalidData`.
    pub fn replicate(&self) -> SummaryError {
        match self {
            SummaryError::Config(message) => SummaryError::Config(message.clone()),
            SummaryError::MissingColumn {
                table,
                column,
                aliases,
            } => SummaryError::MissingColumn {
                table: table.clone(),
                column: column.clone(),
                aliases: aliases.clone(),
            },
            SummaryError::FilterEvaluation { expression, reason } => {
                SummaryError::FilterEvaluation {
                    expression: expression.clone(),
                    reason: reason.clone(),
                }
            }
            SummaryError::InvalidWeight { column, row, value } => SummaryError::InvalidWeight {
                column: column.clone(),
                row: *row,
                value: value.clone(),
            },
            SummaryError::TableUnavailable { table } => SummaryError::TableUnavailable {
                table: table.clone(),
            },
            SummaryError::InvalidData(message) => SummaryError::InvalidData(message.clone()),
            SummaryError::Io(err) => SummaryError::InvalidData(err.to_string()),
            SummaryError::Csv(err) => SummaryError::InvalidData(err.to_string()),
        }
    }

    /// Only configuration errors abort a run.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SummaryError::Config(_))
    }

    pub fn category(&self) -> SkipCategory {
        match self {
            SummaryError::MissingColumn { .. } | SummaryError::TableUnavailable { .. } => {
                SkipCategory::NotApplicable
            }
            SummaryError::Config(_) | SummaryError::FilterEvaluation { .. } => {
                SkipCategory::Defect
            }
            SummaryError::InvalidWeight { .. }
            | SummaryError::InvalidData(_)
            | SummaryError::Io(_)
            | SummaryError::Csv(_) => SkipCategory::DataError,
        }
    }
}

fn format_aliases(aliases: &[String]) -> String {
    if aliases.is_empty() {
        "none".to_string()
    } else {
        aliases.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_column_message_lists_every_alias() {
        let err = SummaryError::MissingColumn {
            table: "households".into(),
            column: "county_name".into(),
            aliases: vec!["county_name".into(), "COUNTY".into(), "cnty".into()],
        };
        let message = err.to_string();
        assert!(message.contains("county_name"));
        assert!(message.contains("COUNTY, cnty"));
        assert_eq!(err.category(), SkipCategory::NotApplicable);
        assert!(err.is_recoverable());
    }

    #[test]
    fn config_errors_are_fatal() {
        let err = SummaryError::config("duplicate column");
        assert!(!err.is_recoverable());
        assert_eq!(err.category(), SkipCategory::Defect);
    }

    #[test]
    fn filter_errors_are_classified_as_defects() {
        let err = SummaryError::filter("mode >", "missing value");
        assert_eq!(err.category(), SkipCategory::Defect);
        assert!(err.to_string().contains("mode >"));
    }
}
