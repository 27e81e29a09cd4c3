//! Preallocated `.npy` outputs filled chunk by chunk.
//!
//! [`NpyWriter`] creates `x_data.npy` (`float32`, shape `(N, M)`) and
//! `y_data.npy` (`float32`, shape `(N,)`) at their final size and maps them
//! into memory, so each transformed chunk is copied straight into its row
//! range. Only one chunk is ever resident besides the mapping.
//!
//! # Safety
//!
//! `MmapMut::map_mut` is unsafe because another process could truncate or
//! modify the file while it is mapped. The writer creates both files itself
//! and holds them open for its whole lifetime.

#![allow(unsafe_code)]

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use memmap2::MmapMut;
use tracing::debug;

use crate::{
    encoder::EncodedChunk,
    error::{Error, Result},
};

/// Feature matrix file name.
pub const X_FILE: &str = "x_data.npy";
/// Target vector file name.
pub const Y_FILE: &str = "y_data.npy";
/// Feature names file name.
pub const FEATURE_NAMES_FILE: &str = "feature_names.txt";

const NPY_MAGIC: &[u8] = b"\x93NUMPY";
const NPY_VERSION: [u8; 2] = [1, 0];
const NPY_ALIGN: usize = 64;
const F32_SIZE: usize = std::mem::size_of::<f32>();

/// Builds a version 1.0 `.npy` header for little-endian `float32` data.
///
/// The header is padded with spaces so the data starts on a 64-byte
/// boundary, and ends with a newline.
pub fn npy_header(shape: &[usize]) -> Vec<u8> {
    let shape = match shape {
        [n] => format!("({},)", n),
        dims => format!(
            "({})",
            dims.iter().map(usize::to_string).collect::<Vec<_>>().join(", ")
        ),
    };
    let mut dict = format!("{{'descr': '<f4', 'fortran_order': False, 'shape': {}, }}", shape);

    let prefix = NPY_MAGIC.len() + NPY_VERSION.len() + 2;
    let unpadded = prefix + dict.len() + 1;
    let padding = (NPY_ALIGN - unpadded % NPY_ALIGN) % NPY_ALIGN;
    dict.extend(std::iter::repeat(' ').take(padding));
    dict.push('\n');

    let mut header = Vec::with_capacity(prefix + dict.len());
    header.extend_from_slice(NPY_MAGIC);
    header.extend_from_slice(&NPY_VERSION);
    // the dict stays far below u16::MAX for two dimensions
    header.extend_from_slice(&(dict.len() as u16).to_le_bytes());
    header.extend_from_slice(dict.as_bytes());
    header
}

/// One preallocated, mapped `.npy` file.
#[derive(Debug)]
struct NpyArray {
    path: PathBuf,
    header_len: usize,
    row_width: usize,
    mmap: Option<MmapMut>,
}

impl NpyArray {
    fn create(path: PathBuf, shape: &[usize]) -> Result<Self> {
        let header = npy_header(shape);
        let elements: usize = shape.iter().product();
        let row_width = shape.get(1).copied().unwrap_or(1);
        let total = header.len() + elements * F32_SIZE;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::io(e, &path))?;
        file.write_all(&header).map_err(|e| Error::io(e, &path))?;
        file.set_len(total as u64).map_err(|e| Error::io(e, &path))?;

        // An empty mapping is rejected on some platforms.
        let mmap = if elements == 0 {
            None
        } else {
            // SAFETY: the file was just created by us and stays open through
            // the mapping; nothing else is expected to resize it.
            Some(unsafe { MmapMut::map_mut(&file) }.map_err(|e| Error::io(e, &path))?)
        };

        debug!(path = %path.display(), shape = ?shape, bytes = total, "allocated npy array");
        Ok(Self {
            path,
            header_len: header.len(),
            row_width,
            mmap,
        })
    }

    fn write_rows(&mut self, row: usize, values: &[f32]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let Some(mmap) = self.mmap.as_mut() else {
            return Err(Error::write(format!("{} has no data section", self.path.display())));
        };
        let start = self.header_len + row * self.row_width * F32_SIZE;
        let end = start + values.len() * F32_SIZE;
        let dst = mmap.get_mut(start..end).ok_or_else(|| {
            Error::write(format!(
                "rows starting at {} overflow {}",
                row,
                self.path.display()
            ))
        })?;
        for (bytes, value) in dst.chunks_exact_mut(F32_SIZE).zip(values) {
            bytes.copy_from_slice(&value.to_le_bytes());
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        if let Some(mmap) = &self.mmap {
            mmap.flush().map_err(|e| Error::io(e, &self.path))?;
        }
        Ok(())
    }
}

/// Sequential writer for the feature matrix, target vector, and feature
/// names of one run.
///
/// # Example
///
/// ```no_run
/// use hhprep::writer::NpyWriter;
///
/// let names = vec!["age".to_string(), "city".to_string()];
/// let writer = NpyWriter::create("data/processed", 1_000, &names).unwrap();
/// // ... writer.write(offset, &chunk) for every chunk ...
/// writer.close().unwrap();
/// ```
#[derive(Debug)]
pub struct NpyWriter {
    outdir: PathBuf,
    x: NpyArray,
    y: NpyArray,
    n_rows: usize,
    n_features: usize,
    rows_written: usize,
}

impl NpyWriter {
    /// Creates `outdir` if needed, writes `feature_names.txt`, and allocates
    /// both arrays for `n_rows` rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or any file cannot be created.
    pub fn create(outdir: impl AsRef<Path>, n_rows: usize, feature_names: &[String]) -> Result<Self> {
        let outdir = outdir.as_ref().to_path_buf();
        fs::create_dir_all(&outdir).map_err(|e| Error::io(e, &outdir))?;

        let names_path = outdir.join(FEATURE_NAMES_FILE);
        fs::write(&names_path, feature_names.join("\n")).map_err(|e| Error::io(e, &names_path))?;

        let n_features = feature_names.len();
        let x = NpyArray::create(outdir.join(X_FILE), &[n_rows, n_features])?;
        let y = NpyArray::create(outdir.join(Y_FILE), &[n_rows])?;

        Ok(Self {
            outdir,
            x,
            y,
            n_rows,
            n_features,
            rows_written: 0,
        })
    }

    /// Copies `chunk` into rows `offset..offset + chunk.rows()`.
    ///
    /// Chunks must arrive in order: `offset` has to equal the number of rows
    /// already written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Write`] for an out-of-order offset, a width that does
    /// not match the feature count, or rows past the allocated end.
    pub fn write(&mut self, offset: usize, chunk: &EncodedChunk) -> Result<()> {
        let rows = chunk.rows();
        if offset != self.rows_written {
            return Err(Error::write(format!(
                "chunk offset {} but {} rows written",
                offset, self.rows_written
            )));
        }
        if chunk.x.cols() != self.n_features {
            return Err(Error::write(format!(
                "chunk has {} features, expected {}",
                chunk.x.cols(),
                self.n_features
            )));
        }
        if chunk.y.len() != rows {
            return Err(Error::write(format!(
                "chunk has {} targets for {} rows",
                chunk.y.len(),
                rows
            )));
        }
        if offset + rows > self.n_rows {
            return Err(Error::write(format!(
                "writing {} rows at {} exceeds allocated {}",
                rows, offset, self.n_rows
            )));
        }

        self.x.write_rows(offset, chunk.x.as_slice())?;
        self.y.write_rows(offset, &chunk.y)?;
        self.rows_written += rows;
        Ok(())
    }

    /// Rows written so far.
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Rows allocated.
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Output directory.
    pub fn outdir(&self) -> &Path {
        &self.outdir
    }

    /// Flushes both mappings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RowCountMismatch`] if fewer rows were written than
    /// allocated, or an I/O error if flushing fails.
    pub fn close(self) -> Result<()> {
        if self.rows_written != self.n_rows {
            return Err(Error::RowCountMismatch {
                expected: self.n_rows,
                actual: self.rows_written,
            });
        }
        self.x.flush()?;
        self.y.flush()?;
        debug!(outdir = %self.outdir.display(), rows = self.n_rows, "npy arrays flushed");
        Ok(())
    }

    /// Drops the mappings and removes every file the writer created.
    pub fn abort(self) {
        let Self { outdir, x, y, .. } = self;
        let mut paths = Vec::with_capacity(3);
        for array in [x, y] {
            let NpyArray { path, mmap, .. } = array;
            drop(mmap);
            paths.push(path);
        }
        paths.push(outdir.join(FEATURE_NAMES_FILE));
        for path in paths {
            if let Err(e) = fs::remove_file(&path) {
                debug!(path = %path.display(), error = %e, "could not remove partial output");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::TensorData;

    fn chunk(rows: usize, cols: usize, start: f32) -> EncodedChunk {
        let data = (0..rows * cols).map(|i| start + i as f32).collect();
        EncodedChunk {
            x: TensorData::from_vec(data, rows, cols)
                .ok()
                .unwrap_or_else(|| panic!("Should build tensor")),
            y: (0..rows).map(|i| start + i as f32).collect(),
        }
    }

    fn read_npy(path: &Path) -> (Vec<u64>, Vec<f32>) {
        let bytes = fs::read(path).unwrap_or_else(|e| panic!("read: {e}"));
        let npy = npyz::NpyFile::new(&bytes[..]).unwrap_or_else(|e| panic!("npy: {e}"));
        let shape = npy.shape().to_vec();
        let data = npy.into_vec::<f32>().unwrap_or_else(|e| panic!("data: {e}"));
        (shape, data)
    }

    #[test]
    fn test_header_is_aligned() {
        for shape in [vec![3, 2], vec![0], vec![123_456, 17]] {
            let header = npy_header(&shape);
            assert_eq!(header.len() % NPY_ALIGN, 0);
            assert!(header.starts_with(NPY_MAGIC));
            assert_eq!(header.last(), Some(&b'\n'));
        }
        let header_1d = npy_header(&[5]);
        let text = String::from_utf8_lossy(&header_1d);
        assert!(text.contains("'shape': (5,)"));
        let header_2d = npy_header(&[5, 3]);
        let text = String::from_utf8_lossy(&header_2d);
        assert!(text.contains("'shape': (5, 3)"));
        assert!(text.contains("'descr': '<f4'"));
    }

    #[test]
    fn test_write_chunks_and_read_back() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let names = vec!["a".to_string(), "b".to_string()];
        let mut writer = NpyWriter::create(dir.path(), 3, &names)
            .ok()
            .unwrap_or_else(|| panic!("Should create"));
        writer.write(0, &chunk(2, 2, 0.0)).ok().unwrap_or_else(|| panic!("Should write"));
        writer.write(2, &chunk(1, 2, 10.0)).ok().unwrap_or_else(|| panic!("Should write"));
        assert_eq!(writer.rows_written(), 3);
        writer.close().ok().unwrap_or_else(|| panic!("Should close"));

        let (shape, x) = read_npy(&dir.path().join(X_FILE));
        assert_eq!(shape, vec![3, 2]);
        assert_eq!(x, vec![0.0, 1.0, 2.0, 3.0, 10.0, 11.0]);
        let (shape, y) = read_npy(&dir.path().join(Y_FILE));
        assert_eq!(shape, vec![3]);
        assert_eq!(y, vec![0.0, 1.0, 10.0]);

        let names = fs::read_to_string(dir.path().join(FEATURE_NAMES_FILE))
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(names, "a\nb");
    }

    #[test]
    fn test_out_of_order_and_overflow_rejected() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let mut writer = NpyWriter::create(dir.path(), 2, &["a".to_string()])
            .ok()
            .unwrap_or_else(|| panic!("Should create"));
        assert!(matches!(writer.write(1, &chunk(1, 1, 0.0)), Err(Error::Write { .. })));
        assert!(matches!(writer.write(0, &chunk(3, 1, 0.0)), Err(Error::Write { .. })));
        assert!(matches!(writer.write(0, &chunk(1, 2, 0.0)), Err(Error::Write { .. })));
        assert_eq!(writer.rows_written(), 0);
    }

    #[test]
    fn test_close_incomplete_is_row_count_mismatch() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let mut writer = NpyWriter::create(dir.path(), 2, &["a".to_string()])
            .ok()
            .unwrap_or_else(|| panic!("Should create"));
        writer.write(0, &chunk(1, 1, 0.0)).ok().unwrap_or_else(|| panic!("Should write"));
        match writer.close() {
            Err(Error::RowCountMismatch { expected, actual }) => {
                assert_eq!((expected, actual), (2, 1));
            }
            other => panic!("expected RowCountMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_features_still_writes_target() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let mut writer = NpyWriter::create(dir.path(), 2, &[])
            .ok()
            .unwrap_or_else(|| panic!("Should create"));
        writer.write(0, &chunk(2, 0, 7.0)).ok().unwrap_or_else(|| panic!("Should write"));
        writer.close().ok().unwrap_or_else(|| panic!("Should close"));

        let (shape, x) = read_npy(&dir.path().join(X_FILE));
        assert_eq!(shape, vec![2, 0]);
        assert!(x.is_empty());
        let (_, y) = read_npy(&dir.path().join(Y_FILE));
        assert_eq!(y, vec![7.0, 8.0]);
        let names = fs::read_to_string(dir.path().join(FEATURE_NAMES_FILE))
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(names.is_empty());
    }

    #[test]
    fn test_abort_removes_arrays() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let writer = NpyWriter::create(dir.path(), 4, &["a".to_string()])
            .ok()
            .unwrap_or_else(|| panic!("Should create"));
        writer.abort();
        assert!(!dir.path().join(X_FILE).exists());
        assert!(!dir.path().join(Y_FILE).exists());
        assert!(!dir.path().join(FEATURE_NAMES_FILE).exists());
    }
}
