#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

/// Schema and summary configuration shared by the integration tests.
pub const MODEL_CONFIG: &str = r#"
tables:
  households:
    columns:
      - { name: hh_id, aliases: [HHID, household_id], required: true }
      - { name: num_vehicles, aliases: [autos, VEHICL], type: integer }
      - { name: county_name, aliases: [COUNTY, cnty] }
    weight: { field: rate }
  tours:
    columns:
      - { name: tour_id, required: true }
      - { name: tour_mode, aliases: [mode], type: integer }
      - { name: tour_distance, aliases: [dist], type: float }
value_mappings:
  tour_mode:
    labels: { 1: Auto, 2: Transit, 3: TNC }
    groups: { 1: Private, 2: Public, 3: Private }
binning:
  tour_distance:
    breakpoints: [0, 5, 10, 20]
    labels: ["0-5", "5-10", "10-20"]
summaries:
  - name: auto_ownership
    table: households
    group_by: [num_vehicles]
    count: households
    share_by: []
  - name: households_by_county
    table: households
    group_by: [county_name]
    count: households
  - name: tour_mode_choice
    table: tours
    group_by: [tour_mode]
    count: tours
    share_by: []
  - name: long_tours
    table: tours
    group_by: [tour_mode_group, tour_distance_bin]
    filter: "tour_distance >= 5"
    count: tours
"#;

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace, creating parent
    /// directories, and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent directories");
        }
        fs::write(&path, contents).expect("write temp file contents");
        path
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.temp_dir.path().join(name)).expect("read workspace file")
    }

    /// Writes the shared model configuration plus two datasets: a 2023 run
    /// with every column and a 2015 run without county names.
    pub fn write_standard_config(&self) -> (PathBuf, PathBuf) {
        let model = self.write("config/model.yml", MODEL_CONFIG);
        self.write(
            "data/2023/households.csv",
            "HHID,autos,COUNTY,rate\n1,0,King,2.0\n2,1,King,2.0\n3,2,Pierce,2.0\n",
        );
        self.write(
            "data/2023/tours.csv",
            "tour_id,mode,dist\n1,1,3\n2,2,7\n3,1,12\n4,2,25\n",
        );
        self.write("data/2015/households.csv", "household_id,VEHICL\n1,1\n2,1\n");
        self.write(
            "data/2015/tours.csv",
            "tour_id,mode,dist\n1,1,4\n2,2,6\n3,3,9\n",
        );
        let datasets = self.write(
            "config/datasets.yml",
            r#"
datasets:
  - id: run_2023
    name: 2023 run
    source: model
    tables:
      households: [../data/2023/households.csv]
      tours: [../data/2023/tours.csv]
  - id: run_2015
    name: 2015 run
    source: model
    tables:
      households: [../data/2015/households.csv]
      tours: [../data/2015/tours.csv]
"#,
        );
        (model, datasets)
    }
}

/// Parses a written CSV into (header, rows).
pub fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).expect("open csv");
    let headers = reader
        .headers()
        .expect("headers")
        .iter()
        .map(str::to_string)
        .collect();
    let rows = reader
        .records()
        .map(|record| record.expect("record").iter().map(str::to_string).collect())
        .collect();
    (headers, rows)
}
