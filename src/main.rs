mod config;
mod error;
mod input;
mod model;
mod pipeline;
mod render;
mod report;
mod telemetry;

#[cfg(test)]
#[path = "../tests/src_inline/fixtures.rs"]
mod fixtures;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::config::RunParams;
use crate::error::Result;
use crate::input::fcs::read_fcs_metadata;
use crate::pipeline::run_pipeline;

#[derive(Debug, Parser)]
#[command(
    name = "cytoflow-rs",
    version,
    about = "Flow-cytometry batch pipeline: import, population gating, compensation, gates and export."
)]
struct Cli {
    /// Log filter used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the full pipeline described by a JSON parameter file.
    Run {
        #[arg(long)]
        params: PathBuf,
        /// Overrides `output_directory` from the parameter file.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Overrides `seed` from the parameter file.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print the channels and key metadata of one FCS file.
    Inspect { fcs: PathBuf },
}

fn main() {
    let cli = Cli::parse();
    telemetry::init(&cli.log_level);
    if let Err(err) = run(cli.command) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Run { params, out, seed } => {
            let params = load_params(&params, out, seed)?;
            let out_dir = run_pipeline(&params)?;
            println!("{}", out_dir.display());
            Ok(())
        }
        Command::Inspect { fcs } => {
            print!("{}", inspect(&fcs)?);
            Ok(())
        }
    }
}

fn load_params(path: &Path, out: Option<PathBuf>, seed: Option<u64>) -> Result<RunParams> {
    let mut params = RunParams::from_json_file(path)?;
    if let Some(out) = out {
        params.output_directory = out;
    }
    if let Some(seed) = seed {
        params.seed = seed;
    }
    Ok(params)
}

fn inspect(path: &Path) -> Result<String> {
    let meta = read_fcs_metadata(path)?;
    let mut out = String::new();
    out.push_str(&format!("file\t{}\n", path.display()));
    out.push_str(&format!("version\t{}\n", meta.version));
    out.push_str(&format!("events\t{}\n", meta.n_events));
    out.push_str(&format!("datatype\t{:?}\n", meta.datatype));
    out.push_str(&format!("byteorder\t{:?}\n", meta.byte_order));
    for key in ["$CYT", "$DATE", "$FIL"] {
        if let Some(value) = meta.keyword(key) {
            out.push_str(&format!("{}\t{}\n", key, value));
        }
    }
    for (i, channel) in meta.channels.iter().enumerate() {
        out.push_str(&format!(
            "P{}\t{}\t{}\t{}\n",
            i + 1,
            channel.name,
            channel.label.as_deref().unwrap_or(""),
            channel.bits
        ));
    }
    Ok(out)
}

#[cfg(test)]
#[path = "../tests/src_inline/main_inline.rs"]
mod tests;
