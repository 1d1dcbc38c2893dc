use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Standardized weighted summaries across travel-demand datasets",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Execute every summary against every dataset and write the results
    Run(RunArgs),
    /// Load and validate configuration without reading any tables
    Check(ConfigArgs),
    /// List canonical columns and their accepted aliases
    Columns(ColumnsArgs),
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Schema configuration (tables, value mappings, binning)
    #[arg(short, long)]
    pub schema: PathBuf,
    /// Summary configuration (defaults to the schema file)
    #[arg(short = 'q', long)]
    pub summaries: Option<PathBuf>,
    /// Dataset configuration (defaults to the schema file)
    #[arg(short, long)]
    pub datasets: Option<PathBuf>,
}

impl ConfigArgs {
    pub fn summaries_path(&self) -> &Path {
        self.summaries.as_deref().unwrap_or(&self.schema)
    }

    pub fn datasets_path(&self) -> &Path {
        self.datasets.as_deref().unwrap_or(&self.schema)
    }

    /// Distinct configuration files, in schema/summaries/datasets order.
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = Vec::with_capacity(3);
        for path in [&*self.schema, self.summaries_path(), self.datasets_path()] {
            if !files.iter().any(|existing| existing == path) {
                files.push(path.to_path_buf());
            }
        }
        files
    }
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Directory receiving per-summary outputs and the manifest
    #[arg(short = 'o', long = "output-dir")]
    pub output_dir: PathBuf,
    /// Worker threads per summary (1 runs sequentially)
    #[arg(short, long)]
    pub jobs: Option<usize>,
    /// Input delimiter override (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of input tables (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Name of the share column in every output
    #[arg(long = "share-name")]
    pub share_name: Option<String>,
}

#[derive(Debug, Args)]
pub struct ColumnsArgs {
    /// Schema configuration
    #[arg(short, long)]
    pub schema: PathBuf,
    /// Table type to list (all tables when omitted)
    #[arg(short, long)]
    pub table: Option<String>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
