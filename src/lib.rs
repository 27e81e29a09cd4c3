//! hhprep - two-pass streaming preprocessing of résumé CSV exports
//!
//! Turns a large job-site résumé export into a dense `float32` feature
//! matrix and target vector without holding the dataset in memory.
//!
//! # Design Principles
//!
//! 1. **Bounded memory** - one chunk resident at a time; outputs are
//!    preallocated `.npy` files filled through a memory map
//! 2. **Two passes** - fit column roles and code tables first, then encode
//!    against the frozen state
//! 3. **Arrow throughout** - every chunk is a `RecordBatch`
//! 4. **Absorb cell errors** - a bad salary or date becomes a missing value;
//!    only structural problems abort a run
//!
//! # Quick Start
//!
//! ```no_run
//! use hhprep::{run, PrepOptions};
//!
//! let options = PrepOptions::new("hh.csv")
//!     .with_outdir("data/processed")
//!     .with_drop_missing_target(true);
//! let summary = run(&options).unwrap();
//! println!("{} rows x {} features", summary.rows_kept, summary.n_features);
//! ```

// unsafe_code is forbidden except where explicitly allowed (the writer's mmap)
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
// Allow common test patterns
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::cast_lossless,
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::unreadable_literal
    )
)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

/// CLI module for command-line interface
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod encoder;
pub mod error;
pub mod parse;
pub mod pipeline;
pub mod reader;
pub mod run;
pub mod streaming;
pub mod tensor;
pub mod transform;
pub mod writer;

pub use arrow::{
    array::RecordBatch,
    datatypes::{Schema, SchemaRef},
};
pub use config::PrepOptions;
pub use encoder::{ColumnRole, EncodedChunk, FitSnapshot, FitState};
pub use error::{Error, Result};
pub use pipeline::{build_pipeline, Pipeline};
pub use reader::{CsvSource, Engine, ReadOptions};
pub use run::{run, run_with_source, RunSummary};
pub use streaming::{DataSource, MemorySource};
pub use tensor::TensorData;
pub use writer::NpyWriter;
