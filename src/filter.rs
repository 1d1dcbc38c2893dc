//! Row filters restricted to a small closed grammar.
//!
//! ```text
//! filter  := clause (("and" | "&&") clause)*
//! clause  := column op literal
//!          | column ("in" | "not in") "[" literal ("," literal)* "]"
//! op      := "=" | "==" | "!=" | ">" | ">=" | "<" | "<="
//! ```
//!
//! Filters are parsed into a [`FilterExpr`] and evaluated column-wise against
//! a [`Frame`]. Anything outside the grammar, unknown columns, and type
//! mismatches surface as [`SummaryError::FilterEvaluation`].

use std::{cmp::Ordering, fmt, sync::OnceLock};

use regex::Regex;

use crate::{
    data::{Value, parse_number, parse_typed_value},
    error::{SummaryError, SummaryResult},
    frame::Frame,
    schema::{ColumnType, TableSchema},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    NotEq,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    NotIn,
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            FilterOp::Eq => "=",
            FilterOp::NotEq => "!=",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::In => "in",
            FilterOp::NotIn => "not in",
        };
        f.write_str(token)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterClause {
    pub column: String,
    pub op: FilterOp,
    /// One literal for comparisons, one or more for membership.
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterExpr {
    source: String,
    clauses: Vec<FilterClause>,
}

fn clause_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?is)^\s*([A-Za-z_][A-Za-z0-9_.]*)\s*(==|!=|>=|<=|=|>|<|not\s+in\b|in\b)\s*(.*?)\s*$",
        )
        .expect("clause pattern is valid")
    })
}

impl FilterExpr {
    pub fn parse(source: &str) -> SummaryResult<Self> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(SummaryError::filter(source, "empty filter expression"));
        }
        let clauses = split_conjunction(trimmed)
            .map_err(|reason| SummaryError::filter(source, reason))?
            .into_iter()
            .map(|part| parse_clause(&part).map_err(|reason| SummaryError::filter(source, reason)))
            .collect::<SummaryResult<Vec<_>>>()?;
        Ok(Self {
            source: trimmed.to_string(),
            clauses,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn clauses(&self) -> &[FilterClause] {
        &self.clauses
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.clauses.iter().map(|clause| clause.column.as_str())
    }

    /// Evaluates the filter for every row, returning the keep mask.
    pub fn mask(&self, frame: &Frame, schema: Option<&TableSchema>) -> SummaryResult<Vec<bool>> {
        let mut keep = vec![true; frame.row_count()];
        for clause in &self.clauses {
            let idx = frame.column_index(&clause.column).ok_or_else(|| {
                SummaryError::filter(
                    &self.source,
                    format!("column '{}' does not exist", clause.column),
                )
            })?;
            let datatype = schema
                .and_then(|schema| schema.column(&clause.column))
                .map(|column| column.datatype)
                .unwrap_or_default();
            let compiled = CompiledClause::new(clause, datatype)
                .map_err(|reason| SummaryError::filter(&self.source, reason))?;
            for (row_idx, row) in frame.rows().iter().enumerate() {
                if !keep[row_idx] {
                    continue;
                }
                keep[row_idx] = compiled.matches(&row[idx]).map_err(|reason| {
                    SummaryError::filter(&self.source, format!("row {}: {reason}", row_idx + 1))
                })?;
            }
        }
        Ok(keep)
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_clause(text: &str) -> Result<FilterClause, String> {
    let captures = clause_pattern()
        .captures(text)
        .ok_or_else(|| format!("cannot parse clause '{text}'"))?;
    let column = captures[1].to_string();
    let op_token = captures[2].to_ascii_lowercase();
    let rest = captures[3].trim();
    if rest.is_empty() {
        return Err(format!("clause '{text}' is missing a value"));
    }
    let op = match op_token.split_whitespace().collect::<Vec<_>>().as_slice() {
        ["=" | "=="] => FilterOp::Eq,
        ["!="] => FilterOp::NotEq,
        [">"] => FilterOp::Gt,
        [">="] => FilterOp::Ge,
        ["<"] => FilterOp::Lt,
        ["<="] => FilterOp::Le,
        ["in"] => FilterOp::In,
        ["not", "in"] => FilterOp::NotIn,
        _ => return Err(format!("unsupported operator '{op_token}'")),
    };
    let values = match op {
        FilterOp::In | FilterOp::NotIn => parse_list(rest)?,
        _ => vec![unquote(rest)?],
    };
    Ok(FilterClause { column, op, values })
}

fn parse_list(text: &str) -> Result<Vec<String>, String> {
    let inner = text
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .or_else(|| text.strip_prefix('(').and_then(|t| t.strip_suffix(')')))
        .ok_or_else(|| format!("membership list '{text}' must be enclosed in [ ] or ( )"))?;
    let items = split_outside_quotes(inner, |c| c == ',')?
        .into_iter()
        .map(|item| unquote(item.trim()))
        .collect::<Result<Vec<_>, _>>()?;
    if items.is_empty() || items.iter().any(|item| item.is_empty()) {
        return Err(format!("membership list '{text}' contains an empty item"));
    }
    Ok(items)
}

fn unquote(value: &str) -> Result<String, String> {
    let bytes = value.as_bytes();
    match bytes.first() {
        Some(quote @ (b'"' | b'\'')) => {
            if value.len() >= 2 && bytes[value.len() - 1] == *quote {
                Ok(value[1..value.len() - 1].to_string())
            } else {
                Err(format!("unterminated quote in '{value}'"))
            }
        }
        _ if value.contains(['"', '\'']) => Err(format!("stray quote in '{value}'")),
        _ => Ok(value.to_string()),
    }
}

fn split_conjunction(text: &str) -> Result<Vec<String>, String> {
    let mut parts = Vec::new();
    for chunk in split_on_double_ampersand(text)? {
        parts.extend(split_on_and_keyword(&chunk));
    }
    if parts.iter().any(|p| p.trim().is_empty()) || parts.is_empty() {
        return Err("empty clause in conjunction".to_string());
    }
    Ok(parts)
}

/// Splits on `&&` outside quotes and brackets. A lone `&` is not part of the grammar.
fn split_on_double_ampersand(text: &str) -> Result<Vec<String>, String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0i32;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[' | '(') => depth += 1,
            (None, ']' | ')') => depth -= 1,
            (None, '&') if depth == 0 => {
                if chars.next_if_eq(&'&').is_none() {
                    return Err(format!(
                        "single '&' in '{text}'; join clauses with '&&' or 'and', or quote the value"
                    ));
                }
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if quote.is_some() {
        return Err(format!("unterminated quote in '{text}'"));
    }
    parts.push(current);
    Ok(parts)
}

fn split_on_and_keyword(text: &str) -> Vec<String> {
    static AND: OnceLock<Regex> = OnceLock::new();
    let pattern = AND.get_or_init(|| Regex::new(r"(?i)\s+and\s+").expect("and pattern is valid"));
    let mut parts = Vec::new();
    let mut last = 0;
    for found in pattern.find_iter(text) {
        if inside_quotes_or_brackets(&text[..found.start()]) {
            continue;
        }
        parts.push(text[last..found.start()].to_string());
        last = found.end();
    }
    parts.push(text[last..].to_string());
    parts
}

fn inside_quotes_or_brackets(prefix: &str) -> bool {
    let mut quote: Option<char> = None;
    let mut depth = 0i32;
    for c in prefix.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[' | '(') => depth += 1,
            (None, ']' | ')') => depth -= 1,
            _ => {}
        }
    }
    quote.is_some() || depth > 0
}

fn split_outside_quotes(text: &str, is_separator: impl Fn(char) -> bool) -> Result<Vec<String>, String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0i32;
    for c in text.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                current.push(c);
            }
            None => match c {
                '"' | '\'' => {
                    quote = Some(c);
                    current.push(c);
                }
                '[' | '(' => {
                    depth += 1;
                    current.push(c);
                }
                ']' | ')' => {
                    depth -= 1;
                    current.push(c);
                }
                c if depth == 0 && is_separator(c) => {
                    parts.push(std::mem::take(&mut current));
                }
                c => current.push(c),
            },
        }
    }
    if quote.is_some() {
        return Err(format!("unterminated quote in '{text}'"));
    }
    parts.push(current);
    Ok(parts)
}

/// A clause with its literals pre-parsed for the column's type.
struct CompiledClause<'a> {
    clause: &'a FilterClause,
    datatype: ColumnType,
    literals: Vec<Value>,
}

impl<'a> CompiledClause<'a> {
    fn new(clause: &'a FilterClause, datatype: ColumnType) -> Result<Self, String> {
        let ordering = matches!(
            clause.op,
            FilterOp::Gt | FilterOp::Ge | FilterOp::Lt | FilterOp::Le
        );
        let literals = clause
            .values
            .iter()
            .map(|raw| literal_value(raw, datatype, ordering, &clause.column))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            clause,
            datatype,
            literals,
        })
    }

    fn matches(&self, cell: &str) -> Result<bool, String> {
        let cell = cell.trim();
        if cell.is_empty() {
            return Ok(match self.clause.op {
                FilterOp::Eq => self.literals.iter().any(|v| v.as_display().is_empty()),
                FilterOp::NotEq | FilterOp::NotIn => true,
                _ => false,
            });
        }
        let value = self.cell_value(cell)?;
        let mut orderings = self.literals.iter().map(|literal| compare(&value, literal));
        Ok(match self.clause.op {
            FilterOp::Eq | FilterOp::In => orderings.any(|o| o == Some(Ordering::Equal)),
            FilterOp::NotEq | FilterOp::NotIn => orderings.all(|o| o != Some(Ordering::Equal)),
            op => {
                let ordering = orderings.next().flatten().ok_or_else(|| {
                    format!(
                        "cannot compare '{cell}' in column '{}' with {op}",
                        self.clause.column
                    )
                })?;
                match op {
                    FilterOp::Gt => ordering == Ordering::Greater,
                    FilterOp::Ge => ordering != Ordering::Less,
                    FilterOp::Lt => ordering == Ordering::Less,
                    FilterOp::Le => ordering != Ordering::Greater,
                    _ => unreachable!("membership handled above"),
                }
            }
        })
    }

    fn cell_value(&self, cell: &str) -> Result<Value, String> {
        let ordering_on_text = self.datatype == ColumnType::String
            && matches!(self.literals.first(), Some(Value::Float(_)));
        if ordering_on_text {
            return parse_number(cell).map(Value::Float).ok_or_else(|| {
                format!(
                    "value '{cell}' in column '{}' is not numeric",
                    self.clause.column
                )
            });
        }
        match parse_typed_value(cell, &self.datatype) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Ok(Value::String(String::new())),
            Err(err) => Err(format!("column '{}': {err}", self.clause.column)),
        }
    }
}

fn literal_value(
    raw: &str,
    datatype: ColumnType,
    ordering: bool,
    column: &str,
) -> Result<Value, String> {
    if datatype == ColumnType::String {
        if ordering {
            return parse_number(raw).map(Value::Float).ok_or_else(|| {
                format!("ordering comparison on '{column}' needs a numeric value, got '{raw}'")
            });
        }
        return Ok(Value::String(raw.to_string()));
    }
    if ordering && datatype == ColumnType::Boolean {
        return Err(format!("ordering comparison is not defined for boolean column '{column}'"));
    }
    match parse_typed_value(raw, &datatype) {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Ok(Value::String(String::new())),
        Err(err) => Err(format!("literal for column '{column}': {err}")),
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaModel;

    fn trips() -> Frame {
        Frame::from_rows(
            &["trip_mode", "distance", "purpose"],
            &[
                &["Auto", "3.5", "work"],
                &["Transit", "12", "school"],
                &["Walk", "0.4", "work"],
                &["Auto", "", "shop"],
            ],
        )
        .unwrap()
    }

    fn schema() -> SchemaModel {
        SchemaModel::from_yaml_str(
            r#"
tables:
  trips:
    columns:
      - name: trip_mode
      - name: distance
        type: float
      - name: purpose
"#,
        )
        .unwrap()
    }

    #[test]
    fn parses_comparison_and_membership_clauses() {
        let expr = FilterExpr::parse("distance >= 1 and purpose in ['work', school]").unwrap();
        assert_eq!(expr.clauses().len(), 2);
        assert_eq!(expr.clauses()[0].op, FilterOp::Ge);
        assert_eq!(expr.clauses()[1].op, FilterOp::In);
        assert_eq!(expr.clauses()[1].values, vec!["work", "school"]);
    }

    #[test]
    fn parses_not_in_and_double_ampersand() {
        let expr = FilterExpr::parse("trip_mode NOT IN (Walk, Bike) && purpose != 'shop'").unwrap();
        assert_eq!(expr.clauses()[0].op, FilterOp::NotIn);
        assert_eq!(expr.clauses()[1].op, FilterOp::NotEq);
        assert_eq!(expr.clauses()[1].values, vec!["shop"]);
    }

    #[test]
    fn quoted_and_is_not_a_conjunction() {
        let expr = FilterExpr::parse("purpose = 'work and school'").unwrap();
        assert_eq!(expr.clauses().len(), 1);
        assert_eq!(expr.clauses()[0].values, vec!["work and school"]);
    }

    #[test]
    fn single_ampersand_is_rejected_unless_quoted() {
        let err = FilterExpr::parse("purpose = R&D").unwrap_err();
        assert!(err.to_string().contains("single '&'"));
        assert!(FilterExpr::parse("distance > 1 & purpose = work").is_err());
        assert!(FilterExpr::parse("distance > 1 &&& purpose = work").is_err());

        let expr = FilterExpr::parse("purpose = 'R&D' && distance > 1").unwrap();
        assert_eq!(expr.clauses.len(), 2);
        assert_eq!(expr.clauses[0].values, vec!["R&D".to_string()]);
    }

    #[test]
    fn rejects_expressions_outside_the_grammar() {
        assert!(FilterExpr::parse("").is_err());
        assert!(FilterExpr::parse("distance").is_err());
        assert!(FilterExpr::parse("distance > ").is_err());
        assert!(FilterExpr::parse("len(purpose) > 3").is_err());
        assert!(FilterExpr::parse("purpose in work").is_err());
        assert!(FilterExpr::parse("purpose = 'open").is_err());
    }

    #[test]
    fn mask_applies_typed_comparisons() {
        let model = schema();
        let expr = FilterExpr::parse("distance > 1").unwrap();
        let mask = expr.mask(&trips(), model.table("trips")).unwrap();
        assert_eq!(mask, vec![true, true, false, false]);
    }

    #[test]
    fn mask_combines_clauses_with_and() {
        let model = schema();
        let expr = FilterExpr::parse("trip_mode = Auto and purpose in [work, shop]").unwrap();
        let mask = expr.mask(&trips(), model.table("trips")).unwrap();
        assert_eq!(mask, vec![true, false, false, true]);
    }

    #[test]
    fn unknown_column_is_a_filter_error() {
        let expr = FilterExpr::parse("county = 'Kings'").unwrap();
        let err = expr.mask(&trips(), None).unwrap_err();
        assert!(matches!(err, SummaryError::FilterEvaluation { .. }));
        assert!(err.to_string().contains("county"));
    }

    #[test]
    fn ordering_against_text_values_is_a_filter_error() {
        let expr = FilterExpr::parse("trip_mode > 2").unwrap();
        let err = expr.mask(&trips(), None).unwrap_err();
        assert!(err.to_string().contains("not numeric"));
    }

    #[test]
    fn numeric_literal_for_typed_column_must_parse() {
        let model = schema();
        let expr = FilterExpr::parse("distance = far").unwrap();
        assert!(expr.mask(&trips(), model.table("trips")).is_err());
    }
}
