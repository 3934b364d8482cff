use crate::{Cell, Columns, Error, RasterSize, Result, Rows};

/// Row-major 2-D array used for the matching windows and the cross power
/// spectra. Nodata is tracked by value (the accompanying georeference knows
/// which value that is), not by a separate mask.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseArray<T> {
    size: RasterSize,
    data: Vec<T>,
}

impl<T: Copy> DenseArray<T> {
    pub fn new(size: RasterSize, data: Vec<T>) -> Result<Self> {
        if data.len() != size.cell_count() {
            return Err(Error::InvalidArgument(format!(
                "Array data length {} does not match size {}",
                data.len(),
                size
            )));
        }

        Ok(DenseArray { size, data })
    }

    pub fn filled_with(val: T, size: RasterSize) -> Self {
        DenseArray {
            size,
            data: vec![val; size.cell_count()],
        }
    }

    pub fn size(&self) -> RasterSize {
        self.size
    }

    pub fn rows(&self) -> usize {
        self.size.rows.count() as usize
    }

    pub fn columns(&self) -> usize {
        self.size.cols.count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.size.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    pub fn row(&self, row: usize) -> &[T] {
        let cols = self.columns();
        &self.data[row * cols..(row + 1) * cols]
    }

    pub fn cell_value(&self, cell: Cell) -> T {
        debug_assert!(cell.is_valid());
        self.data[cell.row as usize * self.columns() + cell.col as usize]
    }

    pub fn value(&self, row: usize, col: usize) -> T {
        self.data[row * self.columns() + col]
    }

    /// Copies a sub window of the array, the window has to be fully inside.
    pub fn sub_array(&self, origin: Cell, size: RasterSize) -> Result<DenseArray<T>> {
        let (r0, c0) = (origin.row, origin.col);
        if r0 < 0
            || c0 < 0
            || r0 + size.rows.count() > self.size.rows.count()
            || c0 + size.cols.count() > self.size.cols.count()
        {
            return Err(Error::InvalidArgument(format!(
                "Sub array {size} at {origin} does not fit in array of size {}",
                self.size
            )));
        }

        let cols = size.cols.count() as usize;
        let mut data = Vec::with_capacity(size.cell_count());
        for row in r0..r0 + size.rows.count() {
            let start = row as usize * self.columns() + c0 as usize;
            data.extend_from_slice(&self.data[start..start + cols]);
        }

        DenseArray::new(size, data)
    }

    /// The largest window of the given size centered on `center` (fractional
    /// row/col position), clipped the way an integer division based center
    /// crop clips.
    pub fn clipped_around(&self, center_rc: (f64, f64), size_rc: (usize, usize)) -> Result<DenseArray<T>> {
        let (center_row, center_col) = center_rc;
        let (rows, cols) = size_rc;

        let row0 = (center_row - rows as f64 / 2.0) as i32;
        let col0 = (center_col - cols as f64 / 2.0) as i32;

        self.sub_array(
            Cell::from_row_col(row0, col0),
            RasterSize::with_rows_cols(Rows(rows as i32), Columns(cols as i32)),
        )
    }

    /// Drops a trailing row and/or column so both dimensions are even.
    pub fn trimmed_to_even(&self) -> Result<DenseArray<T>> {
        let trimmed = self.size.trimmed_to_even();
        if trimmed == self.size {
            return Ok(self.clone());
        }

        self.sub_array(Cell::from_row_col(0, 0), trimmed)
    }

}

impl DenseArray<f64> {
    pub fn zeros(size: RasterSize) -> Self {
        DenseArray::filled_with(0.0, size)
    }

    /// Index of the first occurrence of the maximum value.
    pub fn argmax(&self) -> Cell {
        let mut max = f64::NEG_INFINITY;
        let mut max_idx = 0;
        for (idx, &v) in self.data.iter().enumerate() {
            if v > max {
                max = v;
                max_idx = idx;
            }
        }

        Cell::from_row_col((max_idx / self.columns()) as i32, (max_idx % self.columns()) as i32)
    }

    pub fn max_value(&self) -> f64 {
        self.data.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn min_value(&self) -> f64 {
        self.data.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f64>() / self.data.len() as f64
    }

    /// Population standard deviation.
    pub fn std(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        (self.data.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / self.data.len() as f64).sqrt()
    }
}
