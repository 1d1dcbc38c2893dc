mod common;

use common::{MODEL_CONFIG, TestWorkspace, read_csv};
use demand_summaries::aggregate::{SummaryRequest, compute_summary};
use demand_summaries::binner;
use demand_summaries::dataset::DatasetCatalog;
use demand_summaries::error::SkipCategory;
use demand_summaries::frame::Frame;
use demand_summaries::orchestrator::{Orchestrator, RunOptions};
use demand_summaries::report::RunReport;
use demand_summaries::schema::{SchemaModel, WeightFieldSpec};

fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn run_grid(workspace: &TestWorkspace) -> RunReport {
    let model_path = workspace.path().join("config/model.yml");
    let datasets_path = workspace.path().join("config/datasets.yml");
    let model = SchemaModel::load(&model_path, &model_path).expect("model");
    let catalog = DatasetCatalog::load(&datasets_path, &model).expect("datasets");
    let options = RunOptions::new(workspace.path().join("out"));
    Orchestrator::new(&model, &catalog, &options)
        .run()
        .expect("run")
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn weighted_vehicle_ownership_with_grand_total_shares() {
    let households = Frame::from_rows(
        &["hh_id", "num_vehicles", "rate"],
        &[&["1", "0", "2.0"], &["2", "1", "2.0"], &["3", "2", "2.0"]],
    )
    .expect("frame");
    let group_by = names(&["num_vehicles"]);
    let weight = WeightFieldSpec::new("rate");
    let request = SummaryRequest {
        weight: Some(&weight),
        share_by: Some(&[][..]),
        ..SummaryRequest::new(&group_by, "households")
    };
    let result = compute_summary(&households, &request, None).expect("summary");

    assert_eq!(result.rows.len(), 3);
    for (row, vehicles) in result.rows.iter().zip(["0", "1", "2"]) {
        assert_eq!(row.key, vec![vehicles.to_string()]);
        assert_close(row.count, 2.0);
        assert_close(row.share.expect("share"), 1.0 / 3.0);
    }
    assert_close(result.total(), 6.0);
}

#[test]
fn absent_weight_column_falls_back_to_uniform_weight() {
    let households = Frame::from_rows(
        &["hh_id", "num_vehicles"],
        &[&["1", "0"], &["2", "1"], &["3", "2"]],
    )
    .expect("frame");
    let group_by = names(&["num_vehicles"]);
    let weight = WeightFieldSpec::new("rate");
    let request = SummaryRequest {
        weight: Some(&weight),
        share_by: Some(&[][..]),
        ..SummaryRequest::new(&group_by, "households")
    };
    let result = compute_summary(&households, &request, None).expect("summary");

    let counts: Vec<f64> = result.rows.iter().map(|row| row.count).collect();
    assert_eq!(counts, vec![1.0, 1.0, 1.0]);
    for row in &result.rows {
        assert_close(row.share.expect("share"), 1.0 / 3.0);
    }
}

#[test]
fn binning_keeps_out_of_range_values() {
    let trips = Frame::from_rows(
        &["trip_distance"],
        &[&["-1"], &["3"], &["7"], &["25"]],
    )
    .expect("frame");
    let binned = binner::bin_with(
        &trips,
        "trip_distance",
        &[0.0, 5.0, 10.0, 20.0],
        &["0-5", "5-10", "10-20"],
    )
    .expect("bin");
    let labels: Vec<&str> = binned
        .column_values("trip_distance_bin")
        .expect("bin column")
        .collect();
    assert_eq!(labels, vec!["below range", "0-5", "5-10", "above range"]);
    assert_eq!(binned.row_count(), trips.row_count());
}

#[test]
fn summary_is_skipped_only_for_datasets_missing_its_column() {
    let workspace = TestWorkspace::new();
    let (model_path, datasets_path) = workspace.write_standard_config();
    let model = SchemaModel::load(&model_path, &model_path).expect("model");
    let catalog = DatasetCatalog::load(&datasets_path, &model).expect("datasets");
    let options = RunOptions::new(workspace.path().join("out"));
    let report = Orchestrator::new(&model, &catalog, &options)
        .run()
        .expect("run");

    assert!(report.output_for("households_by_county", "run_2023").is_some());
    assert!(report.output_for("households_by_county", "run_2015").is_none());
    let skip = report
        .skip_for("households_by_county", "run_2015")
        .expect("skip recorded");
    assert_eq!(skip.category, SkipCategory::NotApplicable);
    assert!(skip.reason.contains("county_name"));
    assert!(skip.reason.contains("COUNTY, cnty"));
    assert!(
        !workspace
            .path()
            .join("out/households_by_county/run_2015.csv")
            .exists()
    );

    let (headers, rows) = read_csv(&workspace.path().join("out/households_by_county/run_2023.csv"));
    assert_eq!(headers, vec!["county_name", "households"]);
    assert_eq!(rows, vec![vec!["King", "4"], vec!["Pierce", "2"]]);

    let rendered = report.render();
    assert!(rendered.contains("Not applicable"));
    assert!(rendered.contains("households_by_county"));
}

#[test]
fn combined_mode_choice_does_not_fabricate_missing_categories() {
    let workspace = TestWorkspace::new();
    let (model_path, datasets_path) = workspace.write_standard_config();
    let model = SchemaModel::load(&model_path, &model_path).expect("model");
    let catalog = DatasetCatalog::load(&datasets_path, &model).expect("datasets");
    let options = RunOptions::new(workspace.path().join("out"));
    Orchestrator::new(&model, &catalog, &options)
        .run()
        .expect("run");

    let (headers, rows) = read_csv(&workspace.path().join("out/tour_mode_choice/combined.csv"));
    assert_eq!(
        headers,
        vec!["dataset", "source_type", "tour_mode", "tours", "share"]
    );
    let tagged: Vec<(&str, &str)> = rows
        .iter()
        .map(|row| (row[0].as_str(), row[2].as_str()))
        .collect();
    assert_eq!(
        tagged,
        vec![
            ("2023 run", "Auto"),
            ("2015 run", "Auto"),
            ("2015 run", "TNC"),
            ("2023 run", "Transit"),
            ("2015 run", "Transit"),
        ]
    );
    assert_eq!(rows.iter().filter(|row| row[0] == "2023 run").count(), 2);
    assert_eq!(rows.iter().filter(|row| row[0] == "2015 run").count(), 3);
    assert!(!tagged.contains(&("2023 run", "TNC")));
}

#[test]
fn derived_group_and_bin_columns_feed_filtered_summaries() {
    let workspace = TestWorkspace::new();
    let (model_path, datasets_path) = workspace.write_standard_config();
    let model = SchemaModel::load(&model_path, &model_path).expect("model");
    let catalog = DatasetCatalog::load(&datasets_path, &model).expect("datasets");
    let options = RunOptions::new(workspace.path().join("out"));
    let orchestrator = Orchestrator::new(&model, &catalog, &options);
    let spec = model.summary("long_tours").expect("spec");
    let dataset = catalog.get("run_2023").expect("dataset");
    let result = orchestrator.execute_pair(spec, dataset).expect("result");

    let keys: Vec<Vec<String>> = result.rows.iter().map(|row| row.key.clone()).collect();
    assert_eq!(
        keys,
        vec![
            names(&["Private", "10-20"]),
            names(&["Public", "5-10"]),
            names(&["Public", "above range"]),
        ]
    );
    assert!(result.rows.iter().all(|row| row.count == 1.0));
}

#[test]
fn parallel_run_matches_sequential_output() {
    let workspace = TestWorkspace::new();
    let (model_path, datasets_path) = workspace.write_standard_config();
    let model = SchemaModel::load(&model_path, &model_path).expect("model");
    let catalog = DatasetCatalog::load(&datasets_path, &model).expect("datasets");

    let sequential = RunOptions::new(workspace.path().join("seq"));
    Orchestrator::new(&model, &catalog, &sequential)
        .run()
        .expect("sequential run");
    let parallel = RunOptions {
        jobs: Some(4),
        ..RunOptions::new(workspace.path().join("par"))
    };
    Orchestrator::new(&model, &catalog, &parallel)
        .run()
        .expect("parallel run");

    for summary in ["auto_ownership", "tour_mode_choice", "long_tours"] {
        let name = format!("{summary}/combined.csv");
        assert_eq!(
            workspace.read(&format!("seq/{name}")),
            workspace.read(&format!("par/{name}"))
        );
    }
}

#[test]
fn uniform_weight_applies_when_raw_households_have_no_weight_column() {
    let workspace = TestWorkspace::new();
    workspace.write_standard_config();
    workspace.write(
        "data/2015/households.csv",
        "household_id,VEHICL\n1,0\n2,1\n3,1\n4,2\n",
    );
    let report = run_grid(&workspace);

    assert!(report.output_for("auto_ownership", "run_2015").is_some());
    let (headers, rows) = read_csv(&workspace.path().join("out/auto_ownership/run_2015.csv"));
    assert_eq!(headers, vec!["num_vehicles", "households", "share"]);
    assert_eq!(
        rows,
        vec![
            vec!["0", "1", "0.25"],
            vec!["1", "2", "0.5"],
            vec!["2", "1", "0.25"],
        ]
    );
}

#[test]
fn broken_filters_are_reported_as_defects_and_the_grid_continues() {
    let workspace = TestWorkspace::new();
    workspace.write_standard_config();
    workspace.write(
        "config/model.yml",
        &format!(
            "{MODEL_CONFIG}  - name: far_tours\n    table: tours\n    group_by: [tour_mode]\n    filter: \"tour_distance > far\"\n  - name: unfinished_filter\n    table: tours\n    group_by: [tour_mode]\n    filter: \"tour_distance >\"\n"
        ),
    );
    let report = run_grid(&workspace);

    for summary in ["far_tours", "unfinished_filter"] {
        for dataset in ["run_2023", "run_2015"] {
            let skip = report.skip_for(summary, dataset).expect("skip recorded");
            assert_eq!(skip.category, SkipCategory::Defect, "{summary}/{dataset}");
        }
        assert!(report.combined_output(summary).is_none());
    }
    assert_eq!(
        report
            .skip_for("households_by_county", "run_2015")
            .expect("skip recorded")
            .category,
        SkipCategory::NotApplicable
    );
    assert!(report.output_for("tour_mode_choice", "run_2023").is_some());
    assert!(report.combined_output("long_tours").is_some());

    let rendered = report.render();
    let failed = rendered.find("Failed:").expect("failures listed");
    let (head, tail) = rendered.split_at(failed);
    assert!(head.contains("households_by_county"));
    assert!(!head.contains("far_tours"));
    assert!(tail.contains("far_tours"));
    assert!(tail.contains("unfinished_filter"));
    assert!(tail.contains("defect"));
}

#[test]
fn non_numeric_weight_skips_only_the_affected_dataset() {
    let workspace = TestWorkspace::new();
    workspace.write_standard_config();
    workspace.write(
        "data/2023/households.csv",
        "HHID,autos,COUNTY,rate\n1,0,King,2.0\n2,1,King,heavy\n",
    );
    let report = run_grid(&workspace);

    let skip = report
        .skip_for("auto_ownership", "run_2023")
        .expect("skip recorded");
    assert_eq!(skip.category, SkipCategory::DataError);
    assert!(skip.reason.contains("heavy"));
    assert!(report.output_for("auto_ownership", "run_2015").is_some());
    assert!(report.output_for("tour_mode_choice", "run_2023").is_some());

    let combined = report
        .combined_output("auto_ownership")
        .expect("combined output");
    let (_, rows) = read_csv(&combined.path);
    assert!(rows.iter().all(|row| row[0] == "2015 run"));
    assert!(report.render().contains("data error"));
}

#[test]
fn multi_file_tables_concatenate_and_mismatched_parts_are_data_errors() {
    let workspace = TestWorkspace::new();
    workspace.write_standard_config();
    workspace.write("data/2023/tours_2.csv", "tour_id,mode\n5,1\n");
    workspace.write("data/2015/tours_2.csv", "tour_id,mode,dist\n4,1,2\n");
    workspace.write(
        "config/datasets.yml",
        r#"
datasets:
  - id: run_2023
    name: 2023 run
    tables:
      households: [../data/2023/households.csv]
      tours: [../data/2023/tours.csv, ../data/2023/tours_2.csv]
  - id: run_2015
    name: 2015 run
    tables:
      households: [../data/2015/households.csv]
      tours: [../data/2015/tours.csv, ../data/2015/tours_2.csv]
"#,
    );
    let report = run_grid(&workspace);

    for summary in ["tour_mode_choice", "long_tours"] {
        let skip = report.skip_for(summary, "run_2023").expect("skip recorded");
        assert_eq!(skip.category, SkipCategory::DataError);
        assert!(skip.reason.contains("different headers"));
    }
    assert!(report.output_for("auto_ownership", "run_2023").is_some());

    let (_, rows) = read_csv(&workspace.path().join("out/tour_mode_choice/run_2015.csv"));
    assert_eq!(
        rows.iter().map(|row| row[1].as_str()).collect::<Vec<_>>(),
        vec!["2", "1", "1"]
    );
}
