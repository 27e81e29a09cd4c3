//! Dense row-major blocks handed from the encoder to the writer.

use crate::error::{Error, Result};

/// Tensor data in a contiguous row-major layout.
///
/// Holds one chunk's worth of encoded features, shaped `[rows, cols]`, in
/// the same byte order the `.npy` writer lays rows out on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorData<T> {
    /// The underlying data buffer
    data: Vec<T>,
    /// Shape of the tensor [rows, cols]
    shape: [usize; 2],
}

impl<T: Copy> TensorData<T> {
    /// Creates a tensor of the given shape with every element set to `fill`.
    pub fn filled(rows: usize, cols: usize, fill: T) -> Self {
        Self {
            data: vec![fill; rows * cols],
            shape: [rows, cols],
        }
    }

    /// Creates a tensor from existing row-major data.
    ///
    /// # Errors
    ///
    /// Returns an error if the data length doesn't match rows * cols.
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::schema_mismatch(format!(
                "Data length {} doesn't match shape [{}, {}]",
                data.len(),
                rows,
                cols
            )));
        }
        Ok(Self {
            data,
            shape: [rows, cols],
        })
    }

    /// Returns the shape of the tensor as [rows, cols].
    pub fn shape(&self) -> [usize; 2] {
        self.shape
    }

    /// Returns the number of rows.
    pub fn rows(&self) -> usize {
        self.shape[0]
    }

    /// Returns the number of columns.
    pub fn cols(&self) -> usize {
        self.shape[1]
    }

    /// Returns the underlying data as a slice.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Returns one row, or `None` if out of bounds.
    pub fn row(&self, row: usize) -> Option<&[T]> {
        if row >= self.rows() {
            return None;
        }
        let start = row * self.cols();
        self.data.get(start..start + self.cols())
    }

    /// Gets the element at (row, col), or `None` if out of bounds.
    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        if row >= self.rows() || col >= self.cols() {
            return None;
        }
        self.data.get(row * self.cols() + col).copied()
    }

    /// Overwrites column `col` with `values`, one per row.
    ///
    /// # Errors
    ///
    /// Returns an error if `col` is out of bounds or the value count differs
    /// from the row count.
    pub fn set_column(&mut self, col: usize, values: impl ExactSizeIterator<Item = T>) -> Result<()> {
        let [rows, cols] = self.shape;
        if col >= cols || values.len() != rows {
            return Err(Error::schema_mismatch(format!(
                "cannot set column {} with {} values in a [{}, {}] tensor",
                col,
                values.len(),
                rows,
                cols
            )));
        }
        for (row, value) in values.enumerate() {
            self.data[row * cols + col] = value;
        }
        Ok(())
    }

    /// Consumes the tensor and returns the underlying data.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filled_shape() {
        let t = TensorData::filled(2, 3, 0.0_f32);
        assert_eq!(t.shape(), [2, 3]);
        assert_eq!(t.rows(), 2);
        assert_eq!(t.cols(), 3);
        assert_eq!(t.as_slice().len(), 6);
    }

    #[test]
    fn test_from_vec_shape_mismatch() {
        assert!(TensorData::from_vec(vec![1.0_f32, 2.0, 3.0], 2, 2).is_err());
        let t = TensorData::from_vec(vec![1.0_f32, 2.0, 3.0, 4.0], 2, 2)
            .ok()
            .unwrap_or_else(|| panic!("Should create tensor"));
        assert_eq!(t.get(1, 0), Some(3.0));
        assert_eq!(t.get(2, 0), None);
        assert_eq!(t.row(1), Some(&[3.0_f32, 4.0][..]));
        assert_eq!(t.row(2), None);
    }

    #[test]
    fn test_set_column_is_row_major() {
        let mut t = TensorData::filled(2, 2, 0.0_f32);
        t.set_column(1, [5.0, 6.0].into_iter())
            .ok()
            .unwrap_or_else(|| panic!("Should set"));
        assert_eq!(t.into_vec(), vec![0.0, 5.0, 0.0, 6.0]);
    }

    #[test]
    fn test_set_column_rejects_bad_input() {
        let mut t = TensorData::filled(2, 2, 0.0_f32);
        assert!(t.set_column(2, [1.0, 2.0].into_iter()).is_err());
        assert!(t.set_column(0, [1.0].into_iter()).is_err());
    }

    #[test]
    fn test_zero_rows() {
        let t = TensorData::filled(0, 4, f32::NAN);
        assert_eq!(t.shape(), [0, 4]);
        assert!(t.as_slice().is_empty());
        assert_eq!(t.row(0), None);
    }
}
