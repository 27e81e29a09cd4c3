//! hhprep command line.
//!
//! Mirrors [`PrepOptions`] one flag per field, installs a `tracing`
//! subscriber, and maps any fatal error to a non-zero exit code.

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::{
    config::{PrepOptions, DEFAULT_OUTDIR, DEFAULT_TARGET},
    reader::DEFAULT_BATCH_SIZE,
    run::run as run_prep,
};

/// HH résumé CSV preprocessing into x_data.npy, y_data.npy and
/// feature_names.txt
#[derive(Debug, Parser)]
#[command(name = "hhprep")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the résumé CSV export
    #[arg(short, long)]
    input: PathBuf,
    /// Directory to write outputs
    #[arg(short, long, default_value = DEFAULT_OUTDIR)]
    outdir: PathBuf,
    /// Rows per chunk
    #[arg(short = 'c', long = "chunksize", default_value_t = DEFAULT_BATCH_SIZE)]
    chunk_size: usize,
    /// Force CSV encoding
    #[arg(long)]
    encoding: Option<String>,
    /// Force delimiter (`\t` or `tab` for a tab)
    #[arg(long)]
    delimiter: Option<String>,
    /// Target column after parsing
    #[arg(long, default_value = DEFAULT_TARGET)]
    target: String,
    /// Drop rows where the target is missing
    #[arg(long)]
    drop_missing_target: bool,
    /// Log level, used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    loglevel: String,
}

impl Args {
    fn options(&self) -> PrepOptions {
        let mut options = PrepOptions::new(&self.input)
            .with_outdir(&self.outdir)
            .with_chunk_size(self.chunk_size)
            .with_target(&self.target)
            .with_drop_missing_target(self.drop_missing_target);
        if let Some(encoding) = &self.encoding {
            options = options.with_encoding(encoding);
        }
        if let Some(delimiter) = &self.delimiter {
            options = options.with_delimiter(delimiter);
        }
        options
    }
}

fn init_tracing(loglevel: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(loglevel.to_lowercase()));
    // A subscriber may already be installed when embedded.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Parses arguments, runs both passes, and reports the outcome.
pub fn run() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args.loglevel);

    match run_prep(&args.options()) {
        Ok(summary) => {
            println!(
                "Wrote {} rows x {} features to {}",
                summary.rows_kept,
                summary.n_features,
                summary.output_dir.display()
            );
            if summary.skipped_lines > 0 {
                println!("Skipped {} malformed lines", summary.skipped_lines);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("hhprep").chain(args.iter().copied()))
            .unwrap_or_else(|e| panic!("Should parse: {e}"))
    }

    #[test]
    fn test_defaults() {
        let options = parse(&["-i", "hh.csv"]).options();
        assert_eq!(options, PrepOptions::new("hh.csv"));
    }

    #[test]
    fn test_all_flags() {
        let args = parse(&[
            "--input",
            "hh.csv",
            "-o",
            "out",
            "-c",
            "1000",
            "--encoding",
            "cp1251",
            "--delimiter",
            ";",
            "--target",
            "salary_value",
            "--drop-missing-target",
            "--loglevel",
            "DEBUG",
        ]);
        assert_eq!(args.loglevel, "DEBUG");
        let expected = PrepOptions::new("hh.csv")
            .with_outdir("out")
            .with_chunk_size(1000)
            .with_encoding("cp1251")
            .with_delimiter(";")
            .with_target("salary_value")
            .with_drop_missing_target(true);
        assert_eq!(args.options(), expected);
    }

    #[test]
    fn test_input_is_required() {
        assert!(Args::try_parse_from(["hhprep"]).is_err());
    }
}
