//! Restartable batch sources.
//!
//! The driver walks a source twice: once to fit, then again after
//! [`DataSource::reset`] to transform. Sources must yield the same batches
//! in the same order both times.

use std::sync::Arc;

use arrow::{array::RecordBatch, datatypes::SchemaRef};

use crate::error::{Error, Result};

/// A data source that can produce RecordBatches on demand.
pub trait DataSource: Send {
    /// Returns the schema of the data.
    fn schema(&self) -> SchemaRef;

    /// Returns the next batch of data, or None if exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the next batch fails.
    fn next_batch(&mut self) -> Result<Option<RecordBatch>>;

    /// Rewinds the source to its first batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be reopened.
    fn reset(&mut self) -> Result<()>;

    /// Input records skipped as malformed since the last reset.
    fn skipped_records(&self) -> usize {
        0
    }
}

/// A data source backed by in-memory RecordBatches.
///
/// Useful for testing or when you have data already in memory
/// but want to use the streaming interface.
#[derive(Debug)]
pub struct MemorySource {
    batches: Vec<RecordBatch>,
    schema: SchemaRef,
    position: usize,
}

impl MemorySource {
    /// Creates a new memory source from a vector of batches.
    ///
    /// # Errors
    ///
    /// Returns an error if the batches vector is empty or the batches do not
    /// share one schema.
    pub fn new(batches: Vec<RecordBatch>) -> Result<Self> {
        let Some(first) = batches.first() else {
            return Err(Error::EmptyResult);
        };
        let schema = first.schema();
        if let Some(other) = batches.iter().find(|b| b.schema() != schema) {
            return Err(Error::schema_mismatch(format!(
                "expected {:?}, got {:?}",
                schema.fields(),
                other.schema().fields()
            )));
        }
        Ok(Self {
            batches,
            schema,
            position: 0,
        })
    }
}

impl DataSource for MemorySource {
    fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        let batch = self.batches.get(self.position).cloned();
        if batch.is_some() {
            self.position += 1;
        }
        Ok(batch)
    }

    fn reset(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }
}
