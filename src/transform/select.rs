//! Final stage: split the working batch into features and target.

use std::sync::Arc;

use arrow::{
    array::{Array, ArrayRef, RecordBatch, StringArray, TimestampSecondArray},
    compute::{filter_record_batch, is_not_null},
    datatypes::Field,
};

use super::{build_batch, text_column, PipelineContext, Transform};
use crate::{
    error::{Error, Result},
    parse::{clean_text, parse_resume_date},
};

/// Feature allow-list, in output order.
pub const FEATURE_COLUMNS: [&str; 14] = [
    "gender",
    "age",
    "city",
    "relocation_ready",
    "business_trips_ready",
    "Занятость",
    "График",
    "experience_total_months",
    "education_level",
    "has_car",
    "Ищет работу на должность:",
    "Последенее/нынешнее место работы",
    "Последеняя/нынешняя должность",
    RESUME_UPDATED,
];

/// Multi-valued tag columns that are lower-cased before encoding.
const TAG_COLUMNS: [&str; 2] = ["Занятость", "График"];

/// Raw résumé update column.
const RESUME_UPDATED: &str = "Обновление резюме";

/// Parsed résumé update timestamp, appended after the other features.
pub const RESUME_UPDATED_AT: &str = "resume_updated_at";

/// Resolves the target, optionally drops rows without one, and projects the
/// feature allow-list.
///
/// A target column that does not exist after parsing is a configuration
/// error, not something a chunk can skip.
#[derive(Debug, Clone)]
pub struct SelectXY {
    target: String,
    drop_missing_target: bool,
}

impl SelectXY {
    /// Creates the stage for `target`.
    pub fn new(target: impl Into<String>, drop_missing_target: bool) -> Self {
        Self {
            target: target.into(),
            drop_missing_target,
        }
    }

    /// Returns the target column name.
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Transform for SelectXY {
    fn apply(&self, mut ctx: PipelineContext) -> Result<PipelineContext> {
        let schema = ctx.working.schema();
        let Some((target_idx, _)) = schema.column_with_name(&self.target) else {
            return Err(Error::TargetNotFound {
                target: self.target.clone(),
                available: schema.fields().iter().map(|f| f.name().clone()).collect(),
            });
        };

        if self.drop_missing_target {
            let mask = is_not_null(ctx.working.column(target_idx))?;
            ctx.working = filter_record_batch(&ctx.working, &mask)?;
        }
        let working = &ctx.working;
        let num_rows = working.num_rows();

        let mut fields = Vec::with_capacity(FEATURE_COLUMNS.len());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(FEATURE_COLUMNS.len());
        let mut resume_updated_at = None;

        for name in FEATURE_COLUMNS {
            let Some(array) = working.column_by_name(name) else {
                continue;
            };
            if name == RESUME_UPDATED {
                if let Some(text) = text_column(working, name)? {
                    let parsed: TimestampSecondArray = text
                        .iter()
                        .map(|cell| cell.and_then(parse_resume_date))
                        .collect();
                    resume_updated_at = Some(Arc::new(parsed) as ArrayRef);
                }
                continue;
            }
            let array = if TAG_COLUMNS.contains(&name) {
                normalize_tags(working, name)?.unwrap_or_else(|| Arc::clone(array))
            } else {
                Arc::clone(array)
            };
            fields.push(Field::new(name, array.data_type().clone(), true));
            arrays.push(array);
        }

        if let Some(array) = resume_updated_at {
            fields.push(Field::new(RESUME_UPDATED_AT, array.data_type().clone(), true));
            arrays.push(array);
        }

        ctx.target = Some(Arc::clone(working.column(target_idx)));
        ctx.features = Some(build_batch(fields, arrays, num_rows)?);
        Ok(ctx)
    }
}

// Lower-case and collapse whitespace; nulls stay null.
fn normalize_tags(batch: &RecordBatch, name: &str) -> Result<Option<ArrayRef>> {
    let Some(text) = text_column(batch, name)? else {
        return Ok(None);
    };
    let normalized: StringArray = text
        .iter()
        .map(|cell| cell.map(|value| clean_text(&value.to_lowercase())))
        .collect();
    Ok(Some(Arc::new(normalized)))
}
