//! Two-pass driver.
//!
//! Pass 1 runs every chunk through the pipeline and fits column roles and
//! code tables, counting the rows that survive. Pass 2 replays the input,
//! encodes each chunk with the frozen fit state, and writes it at a running
//! row offset into arrays preallocated from the pass-1 count.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
};

use arrow::array::{ArrayRef, RecordBatch};
use tracing::{debug, info};

use crate::{
    config::PrepOptions,
    encoder::FitState,
    error::{Error, Result},
    pipeline::{build_pipeline, Pipeline},
    reader::CsvSource,
    streaming::DataSource,
    transform::PipelineContext,
    writer::{NpyWriter, X_FILE, Y_FILE},
};

/// Fitted state file name.
pub const FIT_STATE_FILE: &str = "fit_state.json";

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Rows produced by the reader in pass 1.
    pub rows_read: usize,
    /// Rows written to the output arrays.
    pub rows_kept: usize,
    /// Feature columns.
    pub n_features: usize,
    /// Malformed lines the reader skipped.
    pub skipped_lines: usize,
    /// Directory holding the outputs.
    pub output_dir: PathBuf,
}

/// Reads `options.input` and writes the processed arrays.
///
/// # Errors
///
/// Fails on invalid options, an unreadable input, a missing target column,
/// an empty result, or any I/O failure while writing.
pub fn run(options: &PrepOptions) -> Result<RunSummary> {
    let read_options = options.read_options()?;
    let mut source = CsvSource::open(&options.input, read_options)?;
    run_with_source(&mut source, options)
}

/// Runs both passes over an arbitrary source. The source is reset between
/// passes.
///
/// # Errors
///
/// See [`run`].
pub fn run_with_source<S: DataSource>(source: &mut S, options: &PrepOptions) -> Result<RunSummary> {
    options.validate()?;
    let pipeline = build_pipeline(&options.target, options.drop_missing_target);

    let (fit, rows_read, rows_kept) = fit_pass(source, &pipeline)?;
    if rows_kept == 0 {
        return Err(Error::EmptyResult);
    }
    let feature_names = fit.feature_names();
    info!(
        rows_read,
        rows_kept,
        n_features = feature_names.len(),
        "fit pass complete"
    );

    source.reset()?;
    let mut writer = NpyWriter::create(&options.outdir, rows_kept, &feature_names)?;
    if let Err(e) = transform_pass(source, &pipeline, &fit, &mut writer, rows_kept) {
        writer.abort();
        return Err(e);
    }
    writer.close()?;

    let state_path = options.outdir.join(FIT_STATE_FILE);
    let file = File::create(&state_path).map_err(|e| Error::io(e, &state_path))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, &fit.snapshot())?;
    out.flush().map_err(|e| Error::io(e, &state_path))?;

    let skipped_lines = source.skipped_records();
    info!(
        x = %options.outdir.join(X_FILE).display(),
        y = %options.outdir.join(Y_FILE).display(),
        rows = rows_kept,
        n_features = feature_names.len(),
        skipped_lines,
        "wrote processed arrays"
    );

    Ok(RunSummary {
        rows_read,
        rows_kept,
        n_features: feature_names.len(),
        skipped_lines,
        output_dir: options.outdir.clone(),
    })
}

/// Returns the fitted state, rows read, and rows kept.
fn fit_pass<S: DataSource>(source: &mut S, pipeline: &Pipeline) -> Result<(FitState, usize, usize)> {
    let mut fit = FitState::new();
    let mut rows_read = 0;
    let mut rows_kept = 0;

    for chunk_idx in 0_usize.. {
        let Some(batch) = source.next_batch()? else {
            break;
        };
        rows_read += batch.num_rows();
        let ctx = pipeline.process_chunk(batch)?;
        let (features, _) = selected(&ctx)?;
        fit.fit_chunk(features)?;
        rows_kept += features.num_rows();
        debug!(chunk = chunk_idx, rows = features.num_rows(), rows_kept, "fitted chunk");
    }
    Ok((fit, rows_read, rows_kept))
}

fn transform_pass<S: DataSource>(
    source: &mut S,
    pipeline: &Pipeline,
    fit: &FitState,
    writer: &mut NpyWriter,
    expected: usize,
) -> Result<()> {
    let mut offset = 0;
    while let Some(batch) = source.next_batch()? {
        let ctx = pipeline.process_chunk(batch)?;
        let (features, target) = selected(&ctx)?;
        let chunk = fit.transform_chunk(features, target.as_ref())?;
        if offset + chunk.rows() > expected {
            return Err(Error::RowCountMismatch {
                expected,
                actual: offset + chunk.rows(),
            });
        }
        writer.write(offset, &chunk)?;
        offset += chunk.rows();
        debug!(rows = chunk.rows(), offset, "wrote chunk");
    }
    if offset != expected {
        return Err(Error::RowCountMismatch {
            expected,
            actual: offset,
        });
    }
    Ok(())
}

fn selected(ctx: &PipelineContext) -> Result<(&RecordBatch, &ArrayRef)> {
    match (&ctx.features, &ctx.target) {
        (Some(features), Some(target)) => Ok((features, target)),
        _ => Err(Error::schema_mismatch(
            "pipeline finished without selecting features and target",
        )),
    }
}
