//! Chain pipeline stages.
//!
//! A stage receives the [`PipelineContext`] for one chunk, may add, replace,
//! or drop columns on the working batch, and hands the context back. Stages
//! hold configuration only; nothing they compute survives the chunk.

use std::sync::Arc;

use arrow::{
    array::{Array, ArrayRef, AsArray, RecordBatch, RecordBatchOptions, StringArray},
    compute::cast,
    datatypes::{DataType, Field, Schema},
};

use crate::error::{Error, Result};

mod columns;
mod fields;
mod select;

pub use columns::{CleanText, NormalizeColumns};
pub use fields::{
    ParseCar, ParseCity, ParseEducation, ParseExperience, ParseGenderAge, ParseSalary,
    CLEAN_TEXT_COLUMNS,
};
pub use select::{SelectXY, FEATURE_COLUMNS, RESUME_UPDATED_AT};

/// State for a single chunk as it moves through the chain.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    raw: RecordBatch,
    /// The batch being reshaped by the stages.
    pub working: RecordBatch,
    /// Feature columns, set by the final stage.
    pub features: Option<RecordBatch>,
    /// Target values aligned with `features`, set by the final stage.
    pub target: Option<ArrayRef>,
}

impl PipelineContext {
    /// Starts a context whose working batch is the raw chunk.
    pub fn new(raw: RecordBatch) -> Self {
        Self {
            working: raw.clone(),
            raw,
            features: None,
            target: None,
        }
    }

    /// The chunk exactly as the reader produced it.
    pub fn raw(&self) -> &RecordBatch {
        &self.raw
    }

    /// Number of rows that made it into the features batch.
    pub fn kept_rows(&self) -> usize {
        self.features.as_ref().map_or(0, RecordBatch::num_rows)
    }
}

/// A stage in the chain pipeline.
///
/// Stages must be `Send + Sync` so a built pipeline can be shared, but the
/// driver runs them on one thread in a fixed order.
pub trait Transform: Send + Sync {
    /// Applies the stage to a chunk's context.
    ///
    /// # Errors
    ///
    /// Returns an error only for structural problems; unparsable cells
    /// become missing values instead.
    fn apply(&self, ctx: PipelineContext) -> Result<PipelineContext>;
}

/// An ordered list of stages applied in sequence.
///
/// # Example
///
/// ```
/// use hhprep::transform::{Chain, NormalizeColumns, SelectXY};
///
/// let chain = Chain::new()
///     .then(NormalizeColumns)
///     .then(SelectXY::new("salary_rub", true));
/// assert_eq!(chain.len(), 2);
/// ```
pub struct Chain {
    transforms: Vec<Box<dyn Transform>>,
}

impl Chain {
    /// Creates a new empty chain.
    pub fn new() -> Self {
        Self {
            transforms: Vec::new(),
        }
    }

    /// Appends a stage to the chain.
    #[must_use]
    pub fn then<T: Transform + 'static>(mut self, transform: T) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    /// Returns the number of stages in the chain.
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Returns true if the chain has no stages.
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("stages", &self.transforms.len())
            .finish()
    }
}

impl Transform for Chain {
    fn apply(&self, ctx: PipelineContext) -> Result<PipelineContext> {
        let mut result = ctx;
        for transform in &self.transforms {
            result = transform.apply(result)?;
        }
        Ok(result)
    }
}

/// Reads a column as strings, casting non-string columns.
///
/// Returns `None` when the column is absent.
pub(crate) fn text_column(batch: &RecordBatch, name: &str) -> Result<Option<StringArray>> {
    let Some(array) = batch.column_by_name(name) else {
        return Ok(None);
    };
    let utf8 = match array.data_type() {
        DataType::Utf8 => Arc::clone(array),
        _ => cast(array, &DataType::Utf8)?,
    };
    Ok(Some(utf8.as_string::<i32>().clone()))
}

/// Applies `f` to every cell of a text column; null cells are seen as `""`.
pub(crate) fn map_text<T>(
    batch: &RecordBatch,
    name: &str,
    f: impl Fn(&str) -> T,
) -> Result<Option<Vec<T>>> {
    let Some(values) = text_column(batch, name)? else {
        return Ok(None);
    };
    Ok(Some(
        values.iter().map(|cell| f(cell.unwrap_or_default())).collect(),
    ))
}

/// Returns a batch with the given columns set: existing names are replaced
/// in place, new names are appended in order.
pub(crate) fn with_columns(
    batch: &RecordBatch,
    columns: Vec<(&str, ArrayRef)>,
) -> Result<RecordBatch> {
    let schema = batch.schema();
    let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    let mut arrays: Vec<ArrayRef> = batch.columns().to_vec();

    for (name, array) in columns {
        if array.len() != batch.num_rows() {
            return Err(Error::schema_mismatch(format!(
                "column '{}' has {} rows, batch has {}",
                name,
                array.len(),
                batch.num_rows()
            )));
        }
        let field = Field::new(name, array.data_type().clone(), true);
        match fields.iter().position(|f| f.name() == name) {
            Some(idx) => {
                fields[idx] = field;
                arrays[idx] = array;
            }
            None => {
                fields.push(field);
                arrays.push(array);
            }
        }
    }

    build_batch(fields, arrays, batch.num_rows())
}

/// Builds a batch, keeping the row count even when there are no columns.
pub(crate) fn build_batch(
    fields: Vec<Field>,
    arrays: Vec<ArrayRef>,
    num_rows: usize,
) -> Result<RecordBatch> {
    let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
    RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), arrays, &options)
        .map_err(Error::Arrow)
}
