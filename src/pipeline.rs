//! The fixed résumé preprocessing chain.

use arrow::array::RecordBatch;

use crate::{
    error::Result,
    transform::{
        Chain, CleanText, NormalizeColumns, ParseCar, ParseCity, ParseEducation, ParseExperience,
        ParseGenderAge, ParseSalary, PipelineContext, SelectXY, Transform, CLEAN_TEXT_COLUMNS,
    },
};

/// A chain built once per run and applied to every chunk in both passes.
///
/// The pipeline carries no state between chunks, so re-running it in the
/// transform pass reproduces exactly what the fit pass saw.
#[derive(Debug)]
pub struct Pipeline {
    chain: Chain,
}

impl Pipeline {
    /// Wraps an arbitrary chain.
    pub fn new(chain: Chain) -> Self {
        Self { chain }
    }

    /// Runs one chunk through every stage.
    ///
    /// # Errors
    ///
    /// Returns an error if a stage hits a structural problem, such as the
    /// target column being absent.
    pub fn process_chunk(&self, chunk: RecordBatch) -> Result<PipelineContext> {
        self.chain.apply(PipelineContext::new(chunk))
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Returns true if the pipeline has no stages.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

/// Builds the standard pipeline: normalize, clean, parse, then select.
pub fn build_pipeline(target: &str, drop_missing_target: bool) -> Pipeline {
    let chain = Chain::new()
        .then(NormalizeColumns)
        .then(CleanText::new(CLEAN_TEXT_COLUMNS))
        .then(ParseGenderAge)
        .then(ParseSalary)
        .then(ParseCity)
        .then(ParseExperience)
        .then(ParseEducation)
        .then(ParseCar)
        .then(SelectXY::new(target, drop_missing_target));
    Pipeline::new(chain)
}
