//! Dataset descriptors: which model runs and observed summaries to compare,
//! and where their tables live.
//!
//! ```yaml
//! datasets:
//!   - id: run_2023
//!     name: 2023 run
//!     source: model
//!     tables:
//!       households: [outputs/2023/households.csv]
//!       trips: [outputs/2023/trips_1.csv, outputs/2023/trips_2.csv]
//! ```

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt, fs,
    path::{Path, PathBuf},
};

use heck::ToSnakeCase;
use serde::{Deserialize, Serialize};

use crate::{
    error::{SummaryError, SummaryResult},
    schema::SchemaModel,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    #[default]
    Model,
    Observed,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Model => "model",
            SourceType::Observed => "observed",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetDescriptor {
    pub id: String,
    #[serde(default, alias = "display_name")]
    pub name: String,
    #[serde(default, alias = "source_type")]
    pub source: SourceType,
    #[serde(default)]
    pub order: Option<i64>,
    /// Files per table type, concatenated in the listed order.
    #[serde(default, alias = "files")]
    pub tables: BTreeMap<String, Vec<PathBuf>>,
}

impl DatasetDescriptor {
    pub fn new(id: &str, name: &str, source: SourceType) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            source,
            order: None,
            tables: BTreeMap::new(),
        }
    }

    pub fn with_table(mut self, table: &str, paths: Vec<PathBuf>) -> Self {
        self.tables.insert(table.to_string(), paths);
        self
    }

    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// File stem of this dataset's per-summary outputs.
    pub fn slug(&self) -> String {
        self.id.to_snake_case()
    }

    pub fn files(&self, table: &str) -> Option<&[PathBuf]> {
        self.tables
            .get(table)
            .map(Vec::as_slice)
            .filter(|paths| !paths.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
struct DatasetConfig {
    #[serde(default)]
    datasets: Vec<DatasetDescriptor>,
}

/// Validated, ordered list of datasets.
#[derive(Debug, Clone, Default)]
pub struct DatasetCatalog {
    datasets: Vec<DatasetDescriptor>,
}

impl DatasetCatalog {
    /// Loads dataset configuration; relative file paths resolve against the
    /// configuration file's directory.
    pub fn load(path: &Path, model: &SchemaModel) -> SummaryResult<Self> {
        let yaml = fs::read_to_string(path).map_err(|err| {
            SummaryError::config(format!("Reading dataset configuration {path:?}: {err}"))
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::from_yaml_str(&yaml, base, model)
    }

    pub fn from_yaml_str(yaml: &str, base: &Path, model: &SchemaModel) -> SummaryResult<Self> {
        let config: DatasetConfig = serde_yaml::from_str(yaml)
            .map_err(|err| SummaryError::config(format!("Parsing dataset YAML: {err}")))?;
        let datasets = config
            .datasets
            .into_iter()
            .map(|mut dataset| {
                for paths in dataset.tables.values_mut() {
                    for file in paths.iter_mut() {
                        if file.is_relative() {
                            *file = base.join(&*file);
                        }
                    }
                }
                dataset
            })
            .collect();
        Self::new(datasets, model)
    }

    pub fn new(datasets: Vec<DatasetDescriptor>, model: &SchemaModel) -> SummaryResult<Self> {
        let mut seen = BTreeSet::new();
        let mut slugs: BTreeMap<String, &str> = BTreeMap::new();
        let mut names: BTreeMap<&str, &str> = BTreeMap::new();
        for dataset in &datasets {
            if dataset.id.trim().is_empty() {
                return Err(SummaryError::config("Dataset id must not be empty"));
            }
            if !seen.insert(dataset.id.as_str()) {
                return Err(SummaryError::config(format!(
                    "Duplicate dataset id '{}'",
                    dataset.id
                )));
            }
            let slug = dataset.slug();
            if slug.is_empty() {
                return Err(SummaryError::config(format!(
                    "Dataset id '{}' yields an empty output file name",
                    dataset.id
                )));
            }
            if let Some(other) = slugs.insert(slug.clone(), &dataset.id) {
                return Err(SummaryError::config(format!(
                    "Datasets '{other}' and '{}' share the output file name '{slug}'",
                    dataset.id
                )));
            }
            if let Some(other) = names.insert(dataset.display_name(), &dataset.id) {
                return Err(SummaryError::config(format!(
                    "Datasets '{other}' and '{}' share the display name '{}'",
                    dataset.id,
                    dataset.display_name()
                )));
            }
            if let Some(table) = dataset.tables.keys().find(|t| !model.has_table(t)) {
                return Err(SummaryError::config(format!(
                    "Dataset '{}' provides undeclared table type '{table}'",
                    dataset.id
                )));
            }
        }
        let mut datasets = datasets;
        let positions: BTreeMap<String, usize> = datasets
            .iter()
            .enumerate()
            .map(|(idx, d)| (d.id.clone(), idx))
            .collect();
        datasets.sort_by_key(|d| (d.order.unwrap_or(positions[&d.id] as i64), positions[&d.id]));
        Ok(Self { datasets })
    }

    pub fn datasets(&self) -> &[DatasetDescriptor] {
        &self.datasets
    }

    pub fn get(&self, id: &str) -> Option<&DatasetDescriptor> {
        self.datasets.iter().find(|d| d.id == id)
    }

    /// Position of `id` in run order; unknown ids sort last.
    pub fn rank(&self, id: &str) -> usize {
        self.datasets
            .iter()
            .position(|d| d.id == id)
            .unwrap_or(usize::MAX)
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> SchemaModel {
        SchemaModel::from_yaml_str(
            r#"
tables:
  households:
    columns: [{ name: hh_id }]
  trips:
    columns: [{ name: trip_mode }]
"#,
        )
        .unwrap()
    }

    #[test]
    fn loads_and_orders_datasets() {
        let yaml = r#"
datasets:
  - id: survey
    name: Household survey
    source: observed
    order: 2
    tables:
      households: [survey/hh.csv]
  - id: run_2023
    display_name: 2023 run
    tables:
      households: [/abs/hh.csv]
      trips: [t1.csv, t2.csv]
"#;
        let catalog = DatasetCatalog::from_yaml_str(yaml, Path::new("/cfg"), &model()).unwrap();
        let ids: Vec<&str> = catalog.datasets().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["run_2023", "survey"]);
        let survey = catalog.get("survey").unwrap();
        assert_eq!(survey.source, SourceType::Observed);
        assert_eq!(survey.files("households").unwrap()[0], PathBuf::from("/cfg/survey/hh.csv"));
        let run = catalog.get("run_2023").unwrap();
        assert_eq!(run.display_name(), "2023 run");
        assert_eq!(run.files("households").unwrap()[0], PathBuf::from("/abs/hh.csv"));
        assert_eq!(run.files("trips").unwrap().len(), 2);
        assert!(run.files("tours").is_none());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let yaml = "datasets: [{ id: a }, { id: a }]";
        let err = DatasetCatalog::from_yaml_str(yaml, Path::new(""), &model()).unwrap_err();
        assert!(err.to_string().contains("Duplicate dataset id"));
    }

    #[test]
    fn rejects_ids_and_names_that_collide_on_output() {
        let yaml = "datasets: [{ id: Run A }, { id: run_a }]";
        let err = DatasetCatalog::from_yaml_str(yaml, Path::new(""), &model()).unwrap_err();
        assert!(matches!(err, SummaryError::Config(_)));
        assert!(err.to_string().contains("share the output file name 'run_a'"));

        let yaml = "datasets: [{ id: a, name: Base }, { id: b, name: Base }]";
        let err = DatasetCatalog::from_yaml_str(yaml, Path::new(""), &model()).unwrap_err();
        assert!(err.to_string().contains("share the display name 'Base'"));

        let yaml = "datasets: [{ id: a }, { id: b, name: a }]";
        assert!(DatasetCatalog::from_yaml_str(yaml, Path::new(""), &model()).is_err());

        let yaml = "datasets: [{ id: '***' }]";
        let err = DatasetCatalog::from_yaml_str(yaml, Path::new(""), &model()).unwrap_err();
        assert!(err.to_string().contains("empty output file name"));
    }

    #[test]
    fn rejects_undeclared_table_types() {
        let yaml = "datasets: [{ id: a, tables: { tours: [x.csv] } }]";
        let err = DatasetCatalog::from_yaml_str(yaml, Path::new(""), &model()).unwrap_err();
        assert!(err.to_string().contains("undeclared table type 'tours'"));
    }

    #[test]
    fn display_name_falls_back_to_id() {
        let dataset = DatasetDescriptor::new("base", "", SourceType::Model);
        assert_eq!(dataset.display_name(), "base");
    }
}
