//! Column-level cleanup stages.

use std::sync::Arc;

use arrow::{
    array::{ArrayRef, StringArray},
    datatypes::Field,
};

use super::{build_batch, map_text, with_columns, PipelineContext, Transform};
use crate::{error::Result, parse::clean_text};

/// Drops unnamed columns and trims the remaining names.
///
/// A column is unnamed when its trimmed name is empty or starts with
/// `unnamed` (any case), which is how index columns of re-saved exports
/// show up.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeColumns;

impl Transform for NormalizeColumns {
    fn apply(&self, mut ctx: PipelineContext) -> Result<PipelineContext> {
        let batch = &ctx.working;
        let schema = batch.schema();
        let mut fields = Vec::with_capacity(schema.fields().len());
        let mut arrays = Vec::with_capacity(schema.fields().len());

        for (field, array) in schema.fields().iter().zip(batch.columns()) {
            let name = field.name().trim_start_matches('\u{feff}').trim();
            if name.is_empty() || name.to_lowercase().starts_with("unnamed") {
                continue;
            }
            fields.push(Field::new(name, field.data_type().clone(), field.is_nullable()));
            arrays.push(Arc::clone(array));
        }

        ctx.working = build_batch(fields, arrays, batch.num_rows())?;
        Ok(ctx)
    }
}

/// Applies [`clean_text`] to the listed columns that are present.
///
/// Missing cells become empty strings.
#[derive(Debug, Clone)]
pub struct CleanText {
    columns: Vec<String>,
}

impl CleanText {
    /// Creates a new CleanText stage for the given column names.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the columns this stage cleans.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl Transform for CleanText {
    fn apply(&self, mut ctx: PipelineContext) -> Result<PipelineContext> {
        let mut cleaned = Vec::new();
        for name in &self.columns {
            if let Some(values) = map_text(&ctx.working, name, clean_text)? {
                cleaned.push((name.as_str(), Arc::new(StringArray::from(values)) as ArrayRef));
            }
        }
        if !cleaned.is_empty() {
            ctx.working = with_columns(&ctx.working, cleaned)?;
        }
        Ok(ctx)
    }
}
