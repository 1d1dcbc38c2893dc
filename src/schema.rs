//! Schema registry: canonical tables, categorical mappings, binning, and the
//! ordered list of summary specifications.
//!
//! The registry is loaded once from YAML into an immutable [`SchemaModel`] and
//! passed by reference to every component. Structural problems are reported
//! as [`SummaryError::Config`] and abort the run before any table is read.
//!
//! ## Layout
//!
//! ```yaml
//! tables:
//!   households:
//!     columns:
//!       - name: num_vehicles
//!         aliases: [autos, auto_ownership]
//!         type: integer
//!     weight: { field: sample_rate, default: 1.0 }
//! value_mappings:
//!   tour_mode:
//!     labels: { 1: Drive alone, 2: Shared ride }
//!     groups: { 1: Auto, 2: Auto }
//! binning:
//!   trip_distance:
//!     breakpoints: [0, 5, 10, 20]
//!     labels: ["0-5", "5-10", "10-20"]
//! summaries:
//!   - name: auto_ownership
//!     table: households
//!     group_by: [num_vehicles]
//!     count: households
//!     share_by: []
//! ```

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
    fs,
    path::Path,
    str::FromStr,
};

use heck::ToSnakeCase;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use serde_yaml::Value as YamlValue;

use crate::error::{SummaryError, SummaryResult};

pub const DEFAULT_GROUP_SUFFIX: &str = "_group";
pub const DEFAULT_BIN_SUFFIX: &str = "_bin";
pub const DEFAULT_SHARE_NAME: &str = "share";
pub const DEFAULT_COUNT_NAME: &str = "count";
pub const BELOW_RANGE_LABEL: &str = "below range";
pub const ABOVE_RANGE_LABEL: &str = "above range";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnType {
    #[default]
    String,
    Integer,
    Float,
    Boolean,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &["string", "integer", "float", "boolean"]
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = SummaryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "string" | "str" | "text" => Ok(ColumnType::String),
            "integer" | "int" => Ok(ColumnType::Integer),
            "float" | "double" | "number" => Ok(ColumnType::Float),
            "boolean" | "bool" => Ok(ColumnType::Boolean),
            _ => Err(SummaryError::config(format!(
                "Unknown column type '{value}'. Supported types: {}",
                ColumnType::variants().join(", ")
            ))),
        }
    }
}

impl Serialize for ColumnType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        ColumnType::from_str(&token).map_err(|err| de::Error::custom(err.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_scalar_list")]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, rename = "type")]
    pub datatype: ColumnType,
    #[serde(default, deserialize_with = "deserialize_optional_scalar")]
    pub default: Option<String>,
}

impl ColumnSpec {
    /// Source names accepted for this column, in resolution order. The
    /// canonical name itself always comes first.
    pub fn candidate_names(&self) -> Vec<String> {
        let mut names = vec![self.name.clone()];
        for alias in &self.aliases {
            if !names.contains(alias) {
                names.push(alias.clone());
            }
        }
        names
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightFieldSpec {
    pub field: String,
    #[serde(default = "WeightFieldSpec::default_value")]
    pub default: f64,
    #[serde(default)]
    pub invert: bool,
    #[serde(default = "WeightFieldSpec::default_enabled")]
    pub enabled: bool,
}

impl WeightFieldSpec {
    pub const fn default_value() -> f64 {
        1.0
    }

    pub const fn default_enabled() -> bool {
        true
    }

    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            default: Self::default_value(),
            invert: false,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TableSchema {
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<WeightFieldSpec>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|column| column.name == name)
    }
}

/// One way of reinterpreting a coded categorical column.
#[derive(Debug, Clone, PartialEq)]
pub enum CategoryMapping {
    /// Replace codes with labels in place.
    DirectLabel(BTreeMap<String, String>),
    /// Derive a broader grouping into a new column, keeping the original.
    AggregationGroup {
        output: String,
        groups: BTreeMap<String, String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueMapping {
    pub column: String,
    pub mappings: Vec<CategoryMapping>,
}

impl ValueMapping {
    pub fn labels(&self) -> Option<&BTreeMap<String, String>> {
        self.mappings.iter().find_map(|mapping| match mapping {
            CategoryMapping::DirectLabel(labels) => Some(labels),
            _ => None,
        })
    }

    pub fn aggregation(&self) -> Option<(&str, &BTreeMap<String, String>)> {
        self.mappings.iter().find_map(|mapping| match mapping {
            CategoryMapping::AggregationGroup { output, groups } => {
                Some((output.as_str(), groups))
            }
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
struct ValueMappingConfig {
    #[serde(default, deserialize_with = "deserialize_optional_scalar_map")]
    labels: Option<BTreeMap<String, String>>,
    #[serde(default, deserialize_with = "deserialize_optional_scalar_map")]
    groups: Option<BTreeMap<String, String>>,
    #[serde(default)]
    group_column: Option<String>,
}

impl ValueMappingConfig {
    fn into_mapping(self, column: &str) -> ValueMapping {
        let mut mappings = Vec::new();
        // Aggregation reads raw codes, so it is listed ahead of relabeling.
        if let Some(groups) = self.groups {
            let output = self
                .group_column
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| format!("{column}{DEFAULT_GROUP_SUFFIX}"));
            mappings.push(CategoryMapping::AggregationGroup { output, groups });
        }
        if let Some(labels) = self.labels {
            mappings.push(CategoryMapping::DirectLabel(labels));
        }
        ValueMapping {
            column: column.to_string(),
            mappings,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BinningSpec {
    #[serde(default)]
    pub column: String,
    pub breakpoints: Vec<f64>,
    #[serde(deserialize_with = "deserialize_scalar_list")]
    pub labels: Vec<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default = "BinningSpec::default_below")]
    pub below_label: String,
    #[serde(default = "BinningSpec::default_above")]
    pub above_label: String,
}

impl BinningSpec {
    fn default_below() -> String {
        BELOW_RANGE_LABEL.to_string()
    }

    fn default_above() -> String {
        ABOVE_RANGE_LABEL.to_string()
    }

    pub fn new(column: &str, breakpoints: Vec<f64>, labels: Vec<String>) -> Self {
        Self {
            column: column.to_string(),
            breakpoints,
            labels,
            output: None,
            below_label: Self::default_below(),
            above_label: Self::default_above(),
        }
    }

    pub fn output_name(&self) -> String {
        self.output
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("{}{DEFAULT_BIN_SUFFIX}", self.column))
    }

    pub fn ensure_valid(&self) -> SummaryResult<()> {
        let column = &self.column;
        if self.breakpoints.len() < 2 {
            return Err(SummaryError::config(format!(
                "Binning for '{column}' needs at least two breakpoints"
            )));
        }
        if self.breakpoints.iter().any(|value| !value.is_finite()) {
            return Err(SummaryError::config(format!(
                "Binning for '{column}' has a non-finite breakpoint"
            )));
        }
        if self.breakpoints.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(SummaryError::config(format!(
                "Binning breakpoints for '{column}' must be strictly increasing"
            )));
        }
        if self.labels.len() != self.breakpoints.len() - 1 {
            return Err(SummaryError::config(format!(
                "Binning for '{column}' has {} label(s) for {} breakpoint(s); expected {}",
                self.labels.len(),
                self.breakpoints.len(),
                self.breakpoints.len() - 1
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummarySpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(alias = "source_table")]
    pub table: String,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
    #[serde(default = "SummarySpec::default_count", alias = "count_name")]
    pub count: String,
    /// `None` disables shares; `Some([])` computes shares of the grand total.
    #[serde(default, alias = "share_partition", skip_serializing_if = "Option::is_none")]
    pub share_by: Option<Vec<String>>,
    #[serde(default = "SummarySpec::default_share_name")]
    pub share_name: String,
}

impl SummarySpec {
    fn default_count() -> String {
        DEFAULT_COUNT_NAME.to_string()
    }

    fn default_share_name() -> String {
        DEFAULT_SHARE_NAME.to_string()
    }

    pub fn new(name: &str, table: &str, group_by: &[&str], count: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            table: table.to_string(),
            group_by: group_by.iter().map(|c| c.to_string()).collect(),
            filter: None,
            weight: None,
            count: count.to_string(),
            share_by: None,
            share_name: Self::default_share_name(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
struct SchemaConfig {
    #[serde(default)]
    tables: BTreeMap<String, TableSchema>,
    #[serde(default)]
    value_mappings: BTreeMap<String, ValueMappingConfig>,
    #[serde(default)]
    binning: BTreeMap<String, BinningSpec>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct SummaryConfig {
    #[serde(default)]
    summaries: Vec<SummarySpec>,
}

/// Immutable, validated view of the schema and summary configuration.
#[derive(Debug, Clone, Default)]
pub struct SchemaModel {
    tables: BTreeMap<String, TableSchema>,
    value_mappings: BTreeMap<String, ValueMapping>,
    binning: BTreeMap<String, BinningSpec>,
    summaries: Vec<SummarySpec>,
}

impl SchemaModel {
    /// Loads schema and summary configuration from two files (which may be
    /// the same file).
    pub fn load(schema_path: &Path, summaries_path: &Path) -> SummaryResult<Self> {
        let schema_yaml = read_config(schema_path)?;
        let summaries_yaml = if summaries_path == schema_path {
            schema_yaml.clone()
        } else {
            read_config(summaries_path)?
        };
        Self::from_yaml_strs(&schema_yaml, &summaries_yaml)
    }

    pub fn from_yaml_strs(schema_yaml: &str, summaries_yaml: &str) -> SummaryResult<Self> {
        let schema: SchemaConfig = serde_yaml::from_str(schema_yaml)
            .map_err(|err| SummaryError::config(format!("Parsing schema YAML: {err}")))?;
        let summaries: SummaryConfig = serde_yaml::from_str(summaries_yaml)
            .map_err(|err| SummaryError::config(format!("Parsing summary YAML: {err}")))?;
        Self::from_parts(
            schema.tables,
            schema
                .value_mappings
                .into_iter()
                .map(|(column, config)| {
                    let mapping = config.into_mapping(&column);
                    (column, mapping)
                })
                .collect(),
            schema
                .binning
                .into_iter()
                .map(|(column, mut spec)| {
                    spec.column = column.clone();
                    (column, spec)
                })
                .collect(),
            summaries.summaries,
        )
    }

    /// Single-document form holding every top-level key.
    pub fn from_yaml_str(yaml: &str) -> SummaryResult<Self> {
        Self::from_yaml_strs(yaml, yaml)
    }

    pub fn from_parts(
        tables: BTreeMap<String, TableSchema>,
        value_mappings: BTreeMap<String, ValueMapping>,
        binning: BTreeMap<String, BinningSpec>,
        summaries: Vec<SummarySpec>,
    ) -> SummaryResult<Self> {
        let model = Self {
            tables,
            value_mappings,
            binning,
            summaries,
        };
        model.validate()?;
        Ok(model)
    }

    pub fn table(&self, table: &str) -> Option<&TableSchema> {
        self.tables.get(table)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Accepted source names for a canonical column, canonical name first.
    pub fn get_aliases(&self, table: &str, name: &str) -> Option<Vec<String>> {
        self.tables
            .get(table)
            .and_then(|schema| schema.column(name))
            .map(ColumnSpec::candidate_names)
    }

    pub fn get_value_mapping(&self, name: &str) -> Option<&ValueMapping> {
        self.value_mappings.get(name)
    }

    pub fn value_mappings(&self) -> impl Iterator<Item = &ValueMapping> {
        self.value_mappings.values()
    }

    pub fn get_weight_field(&self, table: &str) -> Option<&WeightFieldSpec> {
        self.tables.get(table).and_then(|schema| schema.weight.as_ref())
    }

    /// Every weight column a table's rows may be read with: the declared
    /// field plus any per-summary override.
    pub fn weight_fields(&self, table: &str) -> BTreeSet<String> {
        let mut fields: BTreeSet<String> = self
            .get_weight_field(table)
            .map(|spec| spec.field.clone())
            .into_iter()
            .collect();
        fields.extend(
            self.summaries
                .iter()
                .filter(|spec| spec.table == table)
                .filter_map(|spec| spec.weight.clone()),
        );
        fields
    }

    pub fn get_binning_spec(&self, name: &str) -> Option<&BinningSpec> {
        self.binning.get(name)
    }

    pub fn binning_specs(&self) -> impl Iterator<Item = &BinningSpec> {
        self.binning.values()
    }

    pub fn get_summary_specs(&self) -> &[SummarySpec] {
        &self.summaries
    }

    pub fn summary(&self, name: &str) -> Option<&SummarySpec> {
        self.summaries.iter().find(|spec| spec.name == name)
    }

    /// Every column a table can expose once mapping and derivation run.
    pub fn known_columns(&self, table: &str) -> BTreeSet<String> {
        let mut known: BTreeSet<String> = self
            .tables
            .get(table)
            .map(|schema| schema.columns.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default();
        for mapping in self.value_mappings.values() {
            if let Some((output, _)) = mapping.aggregation()
                && known.contains(&mapping.column)
            {
                known.insert(output.to_string());
            }
        }
        for spec in self.binning.values() {
            if known.contains(&spec.column) {
                known.insert(spec.output_name());
            }
        }
        known
    }

    /// Group-by columns that no mapping or derivation can produce.
    /// These pairs will be skipped at run time; `check` reports them early.
    pub fn unresolvable_columns(&self, spec: &SummarySpec) -> Vec<String> {
        let known = self.known_columns(&spec.table);
        spec.group_by
            .iter()
            .filter(|name| !known.contains(*name))
            .cloned()
            .collect()
    }

    fn validate(&self) -> SummaryResult<()> {
        for (table, schema) in &self.tables {
            validate_table(table, schema)?;
        }
        for (column, mapping) in &self.value_mappings {
            if mapping.mappings.is_empty() {
                return Err(SummaryError::config(format!(
                    "Value mapping for '{column}' declares neither labels nor groups"
                )));
            }
            if let Some((output, _)) = mapping.aggregation()
                && output == column
            {
                return Err(SummaryError::config(format!(
                    "Aggregation column for '{column}' must not overwrite the source column"
                )));
            }
        }
        for spec in self.binning.values() {
            spec.ensure_valid()?;
        }
        self.validate_summaries()
    }

    fn validate_summaries(&self) -> SummaryResult<()> {
        let mut seen = BTreeSet::new();
        let mut slugs: BTreeMap<String, &str> = BTreeMap::new();
        for spec in &self.summaries {
            let name = spec.name.trim();
            if name.is_empty() {
                return Err(SummaryError::config("Summary name must not be empty"));
            }
            if !seen.insert(name.to_string()) {
                return Err(SummaryError::config(format!(
                    "Duplicate summary name '{name}'"
                )));
            }
            let slug = name.to_snake_case();
            if slug.is_empty() {
                return Err(SummaryError::config(format!(
                    "Summary name '{name}' yields an empty output directory name"
                )));
            }
            if let Some(other) = slugs.insert(slug.clone(), name) {
                return Err(SummaryError::config(format!(
                    "Summaries '{other}' and '{name}' share the output directory '{slug}'"
                )));
            }
            if !self.tables.contains_key(&spec.table) {
                return Err(SummaryError::config(format!(
                    "Summary '{name}' references undeclared table type '{}'",
                    spec.table
                )));
            }
            if spec.count.trim().is_empty() {
                return Err(SummaryError::config(format!(
                    "Summary '{name}' has an empty count column name"
                )));
            }
            let mut group_seen = BTreeSet::new();
            for column in &spec.group_by {
                if !group_seen.insert(column.as_str()) {
                    return Err(SummaryError::config(format!(
                        "Summary '{name}' groups by '{column}' more than once"
                    )));
                }
            }
            if group_seen.contains(spec.count.as_str()) {
                return Err(SummaryError::config(format!(
                    "Summary '{name}' count column '{}' collides with a group-by column",
                    spec.count
                )));
            }
            if let Some(partition) = &spec.share_by {
                if let Some(stray) = partition.iter().find(|c| !group_seen.contains(c.as_str())) {
                    return Err(SummaryError::config(format!(
                        "Summary '{name}' shares by '{stray}', which is not a group-by column"
                    )));
                }
                if spec.share_name == spec.count || group_seen.contains(spec.share_name.as_str())
                {
                    return Err(SummaryError::config(format!(
                        "Summary '{name}' share column '{}' collides with another output column",
                        spec.share_name
                    )));
                }
            }
        }
        Ok(())
    }
}

fn validate_table(table: &str, schema: &TableSchema) -> SummaryResult<()> {
    let mut names = BTreeSet::new();
    let mut claimed: HashMap<&str, &str> = HashMap::new();
    for column in &schema.columns {
        if column.name.trim().is_empty() {
            return Err(SummaryError::config(format!(
                "Table '{table}' declares a column with an empty name"
            )));
        }
        if !names.insert(column.name.as_str()) {
            return Err(SummaryError::config(format!(
                "Table '{table}' declares canonical column '{}' more than once",
                column.name
            )));
        }
        for alias in &column.aliases {
            if let Some(owner) = claimed.insert(alias.as_str(), column.name.as_str())
                && owner != column.name
            {
                return Err(SummaryError::config(format!(
                    "Table '{table}' alias '{alias}' is claimed by both '{owner}' and '{}'",
                    column.name
                )));
            }
        }
    }
    if let Some(weight) = &schema.weight {
        if weight.field.trim().is_empty() {
            return Err(SummaryError::config(format!(
                "Table '{table}' declares a weight with an empty field name"
            )));
        }
        if !weight.default.is_finite() {
            return Err(SummaryError::config(format!(
                "Table '{table}' weight default must be finite"
            )));
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> SummaryResult<String> {
    fs::read_to_string(path)
        .map_err(|err| SummaryError::config(format!("Reading configuration {path:?}: {err}")))
}

fn scalar_to_string(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// YAML code tables are usually written with bare integer keys (`1: Walk`);
// keys and values are normalized to text here.
fn deserialize_optional_scalar_map<'de, D>(
    deserializer: D,
) -> Result<Option<BTreeMap<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_yaml::Mapping>::deserialize(deserializer)?;
    let Some(mapping) = raw else {
        return Ok(None);
    };
    let mut out = BTreeMap::new();
    for (key, value) in mapping {
        let key = scalar_to_string(&key)
            .ok_or_else(|| de::Error::custom(format!("Mapping key {key:?} must be a scalar")))?;
        let value = scalar_to_string(&value).ok_or_else(|| {
            de::Error::custom(format!("Mapping value for '{key}' must be a scalar"))
        })?;
        out.insert(key, value);
    }
    Ok(Some(out))
}

fn deserialize_scalar_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<YamlValue>::deserialize(deserializer)?;
    raw.iter()
        .map(|value| {
            scalar_to_string(value)
                .ok_or_else(|| de::Error::custom(format!("Expected a scalar, found {value:?}")))
        })
        .collect()
}

fn deserialize_optional_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<YamlValue>::deserialize(deserializer)?;
    match raw {
        None | Some(YamlValue::Null) => Ok(None),
        Some(value) => scalar_to_string(&value)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("Expected a scalar, found {value:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
tables:
  households:
    columns:
      - name: hh_id
        aliases: [HHID, household_id]
        required: true
        type: integer
      - name: num_vehicles
        aliases: [autos]
        type: integer
      - name: rate
        type: float
    weight:
      field: rate
  trips:
    columns:
      - name: trip_mode
        aliases: [mode]
      - name: trip_distance
        aliases: [dist]
        type: float
value_mappings:
  trip_mode:
    labels: { 1: Drive alone, 2: Transit }
    groups: { 1: Auto, 2: Transit }
binning:
  trip_distance:
    breakpoints: [0, 5, 10, 20]
    labels: ["0-5", "5-10", "10-20"]
summaries:
  - name: auto_ownership
    table: households
    group_by: [num_vehicles]
    count: households
    share_by: []
"#;

    #[test]
    fn loads_tables_mappings_and_summaries() {
        let model = SchemaModel::from_yaml_str(SCHEMA).expect("schema loads");
        assert_eq!(
            model.get_aliases("households", "hh_id").unwrap(),
            vec!["hh_id", "HHID", "household_id"]
        );
        assert_eq!(model.get_weight_field("households").unwrap().field, "rate");
        assert_eq!(model.get_weight_field("households").unwrap().default, 1.0);
        let mapping = model.get_value_mapping("trip_mode").unwrap();
        assert_eq!(mapping.labels().unwrap()["1"], "Drive alone");
        let (output, groups) = mapping.aggregation().unwrap();
        assert_eq!(output, "trip_mode_group");
        assert_eq!(groups["2"], "Transit");
        let bins = model.get_binning_spec("trip_distance").unwrap();
        assert_eq!(bins.output_name(), "trip_distance_bin");
        assert_eq!(model.get_summary_specs().len(), 1);
        assert_eq!(model.get_summary_specs()[0].share_by, Some(Vec::new()));
    }

    #[test]
    fn known_columns_include_derived_outputs() {
        let model = SchemaModel::from_yaml_str(SCHEMA).expect("schema loads");
        let known = model.known_columns("trips");
        assert!(known.contains("trip_mode_group"));
        assert!(known.contains("trip_distance_bin"));
        assert!(!model.known_columns("households").contains("trip_mode_group"));
    }

    #[test]
    fn rejects_duplicate_canonical_names() {
        let yaml = r#"
tables:
  persons:
    columns:
      - name: age
      - name: age
"#;
        let err = SchemaModel::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, SummaryError::Config(_)));
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn rejects_bin_label_count_mismatch() {
        let yaml = r#"
binning:
  trip_distance:
    breakpoints: [0, 5, 10]
    labels: ["0-5"]
"#;
        let err = SchemaModel::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("label(s)"));
    }

    #[test]
    fn rejects_non_increasing_breakpoints() {
        let yaml = r#"
binning:
  age:
    breakpoints: [0, 10, 10]
    labels: ["a", "b"]
"#;
        let err = SchemaModel::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("strictly increasing"));
    }

    #[test]
    fn rejects_summary_for_undeclared_table() {
        let yaml = r#"
tables:
  households:
    columns: [{ name: hh_id }]
summaries:
  - name: tours_by_purpose
    table: tours
    group_by: [purpose]
"#;
        let err = SchemaModel::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("undeclared table type 'tours'"));
    }

    #[test]
    fn rejects_share_partition_outside_group_by() {
        let yaml = r#"
tables:
  households:
    columns: [{ name: num_vehicles }, { name: county }]
summaries:
  - name: autos
    table: households
    group_by: [num_vehicles]
    share_by: [county]
"#;
        let err = SchemaModel::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("not a group-by column"));
    }

    #[test]
    fn rejects_summaries_sharing_an_output_directory() {
        let yaml = r#"
tables:
  households:
    columns: [{ name: num_vehicles }]
summaries:
  - { name: Auto Ownership, table: households, group_by: [num_vehicles] }
  - { name: auto_ownership, table: households, group_by: [num_vehicles] }
"#;
        let err = SchemaModel::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, SummaryError::Config(_)));
        assert!(err.to_string().contains("share the output directory 'auto_ownership'"));

        let yaml = r#"
tables:
  households:
    columns: [{ name: num_vehicles }]
summaries:
  - { name: "--", table: households, group_by: [num_vehicles] }
"#;
        let err = SchemaModel::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("empty output directory name"));
    }

    #[test]
    fn unresolvable_columns_are_reported_not_rejected() {
        let yaml = r#"
tables:
  households:
    columns: [{ name: num_vehicles }]
summaries:
  - name: by_county
    table: households
    group_by: [county_name]
"#;
        let model = SchemaModel::from_yaml_str(yaml).expect("loads");
        let spec = model.summary("by_county").unwrap();
        assert_eq!(model.unresolvable_columns(spec), vec!["county_name"]);
    }

    #[test]
    fn column_type_parses_synonyms() {
        assert_eq!(ColumnType::from_str("INT").unwrap(), ColumnType::Integer);
        assert_eq!(ColumnType::from_str("double").unwrap(), ColumnType::Float);
        assert!(ColumnType::from_str("money").is_err());
    }
}
