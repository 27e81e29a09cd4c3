//! Run configuration.

use std::path::{Path, PathBuf};

use crate::{
    error::{Error, Result},
    reader::{ReadOptions, DEFAULT_BATCH_SIZE},
};

/// Default output directory.
pub const DEFAULT_OUTDIR: &str = "data/processed";
/// Default target column.
pub const DEFAULT_TARGET: &str = "salary_rub";

/// Options for one preprocessing run.
///
/// # Example
///
/// ```
/// use hhprep::PrepOptions;
///
/// let options = PrepOptions::new("hh.csv")
///     .with_outdir("out")
///     .with_chunk_size(10_000)
///     .with_drop_missing_target(true);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepOptions {
    /// Input CSV file.
    pub input: PathBuf,
    /// Directory for `x_data.npy`, `y_data.npy`, and `feature_names.txt`.
    pub outdir: PathBuf,
    /// Rows per chunk.
    pub chunk_size: usize,
    /// Forced encoding label; probed when `None`.
    pub encoding: Option<String>,
    /// Forced delimiter; sniffed when `None`.
    pub delimiter: Option<String>,
    /// Column used as the target vector.
    pub target: String,
    /// Drop rows whose target is missing.
    pub drop_missing_target: bool,
}

impl PrepOptions {
    /// Creates options for `input` with every other setting at its default.
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            outdir: PathBuf::from(DEFAULT_OUTDIR),
            chunk_size: DEFAULT_BATCH_SIZE,
            encoding: None,
            delimiter: None,
            target: DEFAULT_TARGET.to_string(),
            drop_missing_target: false,
        }
    }

    /// Sets the output directory.
    #[must_use]
    pub fn with_outdir(mut self, outdir: impl Into<PathBuf>) -> Self {
        self.outdir = outdir.into();
        self
    }

    /// Sets the chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Forces an encoding.
    #[must_use]
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// Forces a delimiter.
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    /// Sets the target column.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Sets whether rows with a missing target are dropped.
    #[must_use]
    pub fn with_drop_missing_target(mut self, drop: bool) -> Self {
        self.drop_missing_target = drop;
        self
    }

    /// Input path.
    pub fn input(&self) -> &Path {
        &self.input
    }

    /// Checks the options without touching the filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a zero chunk size, an empty
    /// target, or a delimiter that is not a single ASCII character.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::invalid_config("chunk size must be positive"));
        }
        if self.target.trim().is_empty() {
            return Err(Error::invalid_config("target column must not be empty"));
        }
        self.delimiter_byte()?;
        Ok(())
    }

    /// The forced delimiter as a byte. `\t` and `tab` mean a tab.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the delimiter is not a single
    /// ASCII character.
    pub fn delimiter_byte(&self) -> Result<Option<u8>> {
        let Some(delimiter) = self.delimiter.as_deref() else {
            return Ok(None);
        };
        match delimiter {
            "\\t" | "tab" => Ok(Some(b'\t')),
            d if d.len() == 1 && d.is_ascii() => Ok(d.as_bytes().first().copied()),
            d => Err(Error::invalid_config(format!(
                "delimiter must be a single ASCII character, got {:?}",
                d
            ))),
        }
    }

    /// Reader options derived from these settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the options do not validate.
    pub fn read_options(&self) -> Result<ReadOptions> {
        self.validate()?;
        let mut options = ReadOptions::new().with_batch_size(self.chunk_size);
        if let Some(encoding) = &self.encoding {
            options = options.with_encoding(encoding.clone());
        }
        if let Some(delimiter) = self.delimiter_byte()? {
            options = options.with_delimiter(delimiter);
        }
        Ok(options)
    }
}
