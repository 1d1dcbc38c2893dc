use std::{cmp::Ordering, fmt};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::schema::ColumnType;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => format_number(*f),
            Value::Boolean(b) => b.to_string(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Orders group-by cells: blanks first, then numbers numerically, then text.
///
/// Group keys are stored as text after labeling and binning, so the numeric
/// interpretation is recovered here to keep `2` ahead of `10`.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparableValue<'a>(pub &'a str);

impl ComparableValue<'_> {
    fn rank(&self) -> (u8, Option<f64>) {
        let trimmed = self.0.trim();
        if trimmed.is_empty() {
            return (0, None);
        }
        match trimmed.parse::<f64>() {
            Ok(number) if number.is_finite() => (1, Some(number)),
            _ => (2, None),
        }
    }
}

impl Eq for ComparableValue<'_> {}

impl Ord for ComparableValue<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        let (left_rank, left_number) = self.rank();
        let (right_rank, right_number) = other.rank();
        left_rank.cmp(&right_rank).then_with(|| match (left_number, right_number) {
            (Some(a), Some(b)) => a.total_cmp(&b).then_with(|| self.0.cmp(other.0)),
            _ => self.0.cmp(other.0),
        })
    }
}

impl PartialOrd for ComparableValue<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Lexicographic comparison of two group-by tuples.
pub fn compare_keys(left: &[String], right: &[String]) -> Ordering {
    left.iter()
        .map(|cell| ComparableValue(cell))
        .cmp(right.iter().map(|cell| ComparableValue(cell)))
}

pub fn parse_typed_value(value: &str, ty: &ColumnType) -> Result<Option<Value>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    let parsed = match ty {
        ColumnType::String => Value::String(value.to_string()),
        ColumnType::Integer => match value.parse::<i64>() {
            Ok(parsed) => Value::Integer(parsed),
            // Integral columns written by float-typed tools ("2.0").
            Err(_) => {
                let parsed: f64 = value
                    .parse()
                    .with_context(|| format!("Failed to parse '{value}' as integer"))?;
                if parsed.fract() != 0.0 {
                    bail!("Failed to parse '{value}' as integer");
                }
                Value::Integer(parsed as i64)
            }
        },
        ColumnType::Float => {
            let parsed: f64 = value
                .parse()
                .with_context(|| format!("Failed to parse '{value}' as float"))?;
            Value::Float(parsed)
        }
        ColumnType::Boolean => {
            let lowered = value.to_ascii_lowercase();
            let parsed = match lowered.as_str() {
                "true" | "t" | "yes" | "y" | "1" => true,
                "false" | "f" | "no" | "n" | "0" => false,
                _ => bail!("Failed to parse '{value}' as boolean"),
            };
            Value::Boolean(parsed)
        }
    };
    Ok(Some(parsed))
}

pub fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}
