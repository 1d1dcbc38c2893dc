//! Immutable in-memory tables.
//!
//! A [`Frame`] is a header row plus text cells. Every transformation returns a
//! new frame, so a cached table can be shared between summaries (and worker
//! threads) without copying or locking.

use crate::error::{SummaryError, SummaryResult};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Frame {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> SummaryResult<Self> {
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(SummaryError::InvalidData(format!(
                "Row {} has {} field(s) but the header has {}",
                idx + 1,
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    /// Convenience constructor for literal tables.
    pub fn from_rows(columns: &[&str], rows: &[&[&str]]) -> SummaryResult<Self> {
        Self::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        )
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_values(&self, name: &str) -> Option<impl Iterator<Item = &str>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| row[idx].as_str()))
    }

    /// Returns a copy with `name` replaced by `values`, or appended when the
    /// column does not exist yet.
    pub fn with_column(&self, name: &str, values: Vec<String>) -> SummaryResult<Frame> {
        if values.len() != self.rows.len() {
            return Err(SummaryError::InvalidData(format!(
                "Column '{name}' has {} value(s) for {} row(s)",
                values.len(),
                self.rows.len()
            )));
        }
        let mut columns = self.columns.clone();
        let mut rows = self.rows.clone();
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                columns.push(name.to_string());
                for (row, value) in rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(Frame { columns, rows })
    }

    /// Keeps the listed columns, renaming each `(source, target)` pair.
    pub fn select_renamed(&self, picks: &[(usize, String)]) -> Frame {
        let columns = picks.iter().map(|(_, name)| name.clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| picks.iter().map(|(idx, _)| row[*idx].clone()).collect())
            .collect();
        Frame { columns, rows }
    }

    /// Concatenates frames that share an identical header.
    pub fn concat(frames: Vec<Frame>) -> SummaryResult<Frame> {
        let mut iter = frames.into_iter();
        let Some(mut first) = iter.next() else {
            return Ok(Frame::default());
        };
        for frame in iter {
            if frame.columns != first.columns {
                return Err(SummaryError::InvalidData(format!(
                    "Cannot concatenate tables with different headers: [{}] vs [{}]",
                    first.columns.join(", "),
                    frame.columns.join(", ")
                )));
            }
            first.rows.extend(frame.rows);
        }
        Ok(first)
    }
}
