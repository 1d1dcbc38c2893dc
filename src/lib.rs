pub mod aggregate;
pub mod binner;
pub mod cache;
pub mod cli;
pub mod combine;
pub mod data;
pub mod dataset;
pub mod error;
pub mod filter;
pub mod frame;
pub mod io_utils;
pub mod labeler;
pub mod mapper;
pub mod orchestrator;
pub mod report;
pub mod schema;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, ColumnsArgs, Commands, ConfigArgs, RunArgs},
    dataset::DatasetCatalog,
    orchestrator::{Orchestrator, RunOptions},
    schema::SchemaModel,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("demand_summaries", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => handle_run(&args),
        Commands::Check(args) => handle_check(&args),
        Commands::Columns(args) => handle_columns(&args),
    }
}

/// Loads schema, summary, and dataset configuration. Any error here is fatal.
pub fn load_configuration(args: &ConfigArgs) -> Result<(SchemaModel, DatasetCatalog)> {
    let model = SchemaModel::load(&args.schema, args.summaries_path())
        .with_context(|| format!("Loading schema configuration from {:?}", args.schema))?;
    let catalog = DatasetCatalog::load(args.datasets_path(), &model).with_context(|| {
        format!(
            "Loading dataset configuration from {:?}",
            args.datasets_path()
        )
    })?;
    info!(
        "Loaded {} table type(s), {} summary(ies), {} dataset(s)",
        model.table_names().count(),
        model.get_summary_specs().len(),
        catalog.len()
    );
    Ok((model, catalog))
}

fn handle_run(args: &RunArgs) -> Result<()> {
    let (model, catalog) = load_configuration(&args.config)?;
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let options = RunOptions {
        output_dir: args.output_dir.clone(),
        delimiter: args.delimiter,
        encoding,
        jobs: args.jobs,
        share_name: args.share_name.clone(),
        config_files: args.config.files(),
    };
    debug!(
        "Writing outputs to {:?} with delimiter override '{}'",
        options.output_dir,
        options
            .delimiter
            .map(printable_delimiter)
            .unwrap_or_else(|| "auto".to_string())
    );
    let report = Orchestrator::new(&model, &catalog, &options).run()?;
    print!("{}", report.render());
    Ok(())
}

fn handle_check(args: &ConfigArgs) -> Result<()> {
    let (model, catalog) = load_configuration(args)?;
    let mut rows = Vec::new();
    for spec in model.get_summary_specs() {
        let unresolvable = model.unresolvable_columns(spec);
        for dataset in catalog.datasets() {
            let status = if dataset.files(&spec.table).is_none() {
                format!("no '{}' table", spec.table)
            } else if !unresolvable.is_empty() {
                format!("unresolvable: {}", unresolvable.join(", "))
            } else {
                "ok".to_string()
            };
            rows.push(vec![
                spec.name.clone(),
                spec.table.clone(),
                dataset.id.clone(),
                dataset.source.to_string(),
                status,
            ]);
        }
    }
    let headers = ["summary", "table", "dataset", "source", "status"].map(String::from);
    table::print_table(&headers, &rows);
    Ok(())
}

fn handle_columns(args: &ColumnsArgs) -> Result<()> {
    let model = SchemaModel::load(&args.schema, &args.schema)
        .with_context(|| format!("Loading schema configuration from {:?}", args.schema))?;
    let tables: Vec<String> = match &args.table {
        Some(table) if model.has_table(table) => vec![table.clone()],
        Some(table) => anyhow::bail!("Table type '{table}' is not declared in {:?}", args.schema),
        None => model.table_names().map(str::to_string).collect(),
    };
    let mut rows = Vec::new();
    for table in &tables {
        let Some(schema) = model.table(table) else {
            continue;
        };
        for column in &schema.columns {
            rows.push(vec![
                table.clone(),
                column.name.clone(),
                column.datatype.to_string(),
                if column.required { "yes" } else { "no" }.to_string(),
                column.aliases.join(", "),
            ]);
        }
        if let Some(weight) = &schema.weight {
            rows.push(vec![
                table.clone(),
                weight.field.clone(),
                "weight".to_string(),
                "no".to_string(),
                String::new(),
            ]);
        }
    }
    let headers = ["table", "column", "type", "required", "aliases"].map(String::from);
    table::print_table(&headers, &rows);
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}
