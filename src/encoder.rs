//! Cross-chunk fit state and the fixed-width f32 encoder.
//!
//! The fit pass calls [`FitState::fit_chunk`] on every features batch. That
//! decides each column's [`ColumnRole`], extends the feature schema, and
//! grows one [`CodeTable`] per categorical column. The transform pass calls
//! [`FitState::transform_chunk`], which only borrows the state, so codes
//! can no longer move once fitting is over.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use arrow::{
//!     array::{ArrayRef, Int64Array, RecordBatch, StringArray},
//!     datatypes::{DataType, Field, Schema},
//! };
//! use hhprep::encoder::FitState;
//!
//! # fn main() -> hhprep::Result<()> {
//! let schema = Arc::new(Schema::new(vec![
//!     Field::new("city", DataType::Utf8, true),
//!     Field::new("age", DataType::Int64, true),
//! ]));
//! let batch = RecordBatch::try_new(
//!     schema,
//!     vec![
//!         Arc::new(StringArray::from(vec![Some("Москва"), None])) as ArrayRef,
//!         Arc::new(Int64Array::from(vec![Some(33), None])) as ArrayRef,
//!     ],
//! )?;
//! let target: ArrayRef = Arc::new(Int64Array::from(vec![Some(50_000), None]));
//!
//! let mut fit = FitState::new();
//! fit.fit_chunk(&batch)?;
//! let encoded = fit.transform_chunk(&batch, target.as_ref())?;
//!
//! assert_eq!(encoded.x.row(0), Some(&[1.0_f32, 33.0][..]));
//! assert_eq!(encoded.x.get(1, 0), Some(0.0));
//! assert!(encoded.x.get(1, 1).is_some_and(f32::is_nan));
//! assert!(encoded.y[1].is_nan());
//! # Ok(())
//! # }
//! ```

use std::{collections::HashMap, sync::Arc};

use arrow::{
    array::{Array, ArrayRef, AsArray, RecordBatch, StringArray},
    compute::{can_cast_types, cast},
    datatypes::{DataType, Float64Type, TimeUnit, TimestampSecondType},
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    tensor::TensorData,
};

/// Normalized form of a missing or unseen categorical value; always code 0.
pub const NA_TOKEN: &str = "__NA__";

/// How a feature column is turned into f32 values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    /// Best-effort numeric coercion; missing becomes NaN.
    Numeric,
    /// Integer code from the column's code table; unseen becomes 0.
    Categorical,
    /// Seconds since the Unix epoch; missing becomes -1.
    Datetime,
    /// 1 for true, 0 for false or missing.
    Boolean,
}

impl ColumnRole {
    /// Role implied by an Arrow data type.
    pub fn from_data_type(data_type: &DataType) -> Self {
        match data_type {
            DataType::Boolean => Self::Boolean,
            DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64 => Self::Datetime,
            t if t.is_numeric() => Self::Numeric,
            _ => Self::Categorical,
        }
    }

    /// Value written for a missing cell.
    pub fn missing_value(self) -> f32 {
        match self {
            Self::Numeric => f32::NAN,
            Self::Categorical | Self::Boolean => 0.0,
            Self::Datetime => -1.0,
        }
    }
}

/// String-to-code table for one categorical column.
///
/// Codes are dense and assigned in first-seen order; [`NA_TOKEN`] is
/// always present with code 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeTable {
    codes: IndexMap<String, u32>,
}

impl CodeTable {
    /// Creates a table holding only the sentinel.
    pub fn new() -> Self {
        let mut codes = IndexMap::new();
        codes.insert(NA_TOKEN.to_string(), 0);
        Self { codes }
    }

    /// Returns the code for an already-normalized value, or 0 if unseen.
    pub fn code(&self, value: &str) -> u32 {
        self.codes.get(value).copied().unwrap_or(0)
    }

    /// Adds a normalized value if it is new and returns its code.
    pub fn observe(&mut self, value: &str) -> u32 {
        if let Some(code) = self.codes.get(value) {
            return *code;
        }
        let code = u32::try_from(self.codes.len()).unwrap_or(u32::MAX);
        self.codes.insert(value.to_string(), code);
        code
    }

    /// Number of codes, including the sentinel.
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Always false: the sentinel is never removed.
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Values in code order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.codes.keys().map(String::as_str)
    }
}

impl Default for CodeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalizes a categorical cell: missing or blank becomes [`NA_TOKEN`].
pub fn normalize_category(cell: Option<&str>) -> &str {
    match cell.map(str::trim) {
        Some(value) if !value.is_empty() => value,
        _ => NA_TOKEN,
    }
}

/// One transformed chunk, ready to be written.
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    /// Features, shaped `[rows, n_features]`.
    pub x: TensorData<f32>,
    /// Target, one value per row; missing is NaN.
    pub y: Vec<f32>,
}

impl EncodedChunk {
    /// Number of rows in the chunk.
    pub fn rows(&self) -> usize {
        self.x.rows()
    }
}

/// Column roles, feature order, and categorical code tables for one run.
#[derive(Debug, Clone, Default)]
pub struct FitState {
    roles: IndexMap<String, ColumnRole>,
    tables: HashMap<String, CodeTable>,
    rows_fitted: usize,
}

impl FitState {
    /// Creates an empty fit state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Learns from one features batch of the fit pass.
    ///
    /// New columns are appended to the feature schema. A categorical column
    /// that arrives with a numeric, boolean, or datetime type takes that
    /// role for good; a non-categorical column never goes back.
    ///
    /// # Errors
    ///
    /// Returns an error if a categorical column cannot be read as strings.
    pub fn fit_chunk(&mut self, features: &RecordBatch) -> Result<()> {
        let schema = features.schema();
        for (field, array) in schema.fields().iter().zip(features.columns()) {
            let name = field.name();
            let observed = ColumnRole::from_data_type(field.data_type());
            let role = match self.roles.get(name).copied() {
                None => {
                    debug!(column = %name, role = ?observed, "classified feature column");
                    self.roles.insert(name.clone(), observed);
                    observed
                }
                Some(ColumnRole::Categorical) if observed != ColumnRole::Categorical => {
                    debug!(column = %name, role = ?observed, "column is no longer categorical");
                    self.roles.insert(name.clone(), observed);
                    self.tables.remove(name);
                    observed
                }
                Some(role) => role,
            };

            if role == ColumnRole::Categorical {
                let table = self.tables.entry(name.clone()).or_default();
                for cell in as_strings(array)?.iter() {
                    table.observe(normalize_category(cell));
                }
            }
        }
        self.rows_fitted += features.num_rows();
        Ok(())
    }

    /// Encodes one features batch and its target into f32 values.
    ///
    /// Columns follow [`FitState::feature_names`]. A schema column absent
    /// from the batch is filled with its role's missing value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] if the target length differs from
    /// the batch row count.
    pub fn transform_chunk(&self, features: &RecordBatch, target: &dyn Array) -> Result<EncodedChunk> {
        let rows = features.num_rows();
        if target.len() != rows {
            return Err(Error::schema_mismatch(format!(
                "{} feature rows but {} target values",
                rows,
                target.len()
            )));
        }

        let mut x = TensorData::filled(rows, self.roles.len(), 0.0_f32);
        for (col, (name, role)) in self.roles.iter().enumerate() {
            match features.column_by_name(name) {
                Some(array) => {
                    let values = self.encode_column(name, *role, array)?;
                    x.set_column(col, values.into_iter())?;
                }
                None => {
                    debug!(column = %name, "column absent from chunk, filling missing");
                    x.set_column(col, vec![role.missing_value(); rows].into_iter())?;
                }
            }
        }

        let y = to_f64(target)?
            .map(|values| {
                values
                    .iter()
                    .map(|v| v.map_or(f32::NAN, |v| v as f32))
                    .collect()
            })
            .unwrap_or_else(|| vec![f32::NAN; rows]);

        Ok(EncodedChunk { x, y })
    }

    fn encode_column(&self, name: &str, role: ColumnRole, array: &ArrayRef) -> Result<Vec<f32>> {
        let missing = role.missing_value();
        let values = match role {
            ColumnRole::Categorical => {
                let table = self.tables.get(name);
                as_strings(array)?
                    .iter()
                    .map(|cell| {
                        table.map_or(0.0, |t| t.code(normalize_category(cell)) as f32)
                    })
                    .collect()
            }
            ColumnRole::Numeric => match to_f64(array)? {
                Some(values) => values
                    .iter()
                    .map(|v| v.map_or(missing, |v| v as f32))
                    .collect(),
                None => incompatible(name, array, role),
            },
            ColumnRole::Boolean => match cast_if_possible(array, &DataType::Boolean)? {
                Some(values) => values
                    .as_boolean()
                    .iter()
                    .map(|v| v.map_or(missing, |v| if v { 1.0 } else { 0.0 }))
                    .collect(),
                None => incompatible(name, array, role),
            },
            ColumnRole::Datetime => {
                let seconds = DataType::Timestamp(TimeUnit::Second, None);
                match cast_if_possible(array, &seconds)? {
                    Some(values) => values
                        .as_primitive::<TimestampSecondType>()
                        .iter()
                        .map(|v| v.map_or(missing, |v| v as f32))
                        .collect(),
                    None => incompatible(name, array, role),
                }
            }
        };
        Ok(values)
    }

    /// Feature names in matrix column order.
    pub fn feature_names(&self) -> Vec<String> {
        self.roles.keys().cloned().collect()
    }

    /// Number of feature columns.
    pub fn n_features(&self) -> usize {
        self.roles.len()
    }

    /// Rows seen by [`FitState::fit_chunk`].
    pub fn rows_fitted(&self) -> usize {
        self.rows_fitted
    }

    /// The frozen role of a column, if it has been seen.
    pub fn role(&self, name: &str) -> Option<ColumnRole> {
        self.roles.get(name).copied()
    }

    /// The code table of a categorical column.
    pub fn table(&self, name: &str) -> Option<&CodeTable> {
        self.tables.get(name)
    }

    /// A serializable description of the fitted state.
    pub fn snapshot(&self) -> FitSnapshot {
        let features = self
            .roles
            .iter()
            .map(|(name, role)| FeatureSpec {
                name: name.clone(),
                role: *role,
                categories: self
                    .tables
                    .get(name)
                    .filter(|_| *role == ColumnRole::Categorical)
                    .map(|t| t.values().map(str::to_string).collect()),
            })
            .collect();
        FitSnapshot {
            rows: self.rows_fitted,
            features,
        }
    }
}

/// Serializable form of a [`FitState`], written as `fit_state.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitSnapshot {
    /// Rows seen during fitting.
    pub rows: usize,
    /// Feature columns in matrix order.
    pub features: Vec<FeatureSpec>,
}

/// One feature column in a [`FitSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Column name.
    pub name: String,
    /// Encoding role.
    pub role: ColumnRole,
    /// Categorical values in code order; index `i` is code `i`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
}

fn as_strings(array: &ArrayRef) -> Result<StringArray> {
    let utf8 = match array.data_type() {
        DataType::Utf8 => Arc::clone(array),
        _ => cast(array, &DataType::Utf8)?,
    };
    Ok(utf8.as_string::<i32>().clone())
}

fn cast_if_possible(array: &dyn Array, to: &DataType) -> Result<Option<ArrayRef>> {
    if !can_cast_types(array.data_type(), to) {
        return Ok(None);
    }
    Ok(Some(cast(array, to)?))
}

fn to_f64(array: &dyn Array) -> Result<Option<arrow::array::Float64Array>> {
    Ok(cast_if_possible(array, &DataType::Float64)?
        .map(|values| values.as_primitive::<Float64Type>().clone()))
}

fn incompatible(name: &str, array: &ArrayRef, role: ColumnRole) -> Vec<f32> {
    warn!(
        column = %name,
        data_type = %array.data_type(),
        role = ?role,
        "cannot convert column for its fitted role, writing missing values"
    );
    vec![role.missing_value(); array.len()]
}
