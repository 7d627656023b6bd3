use ndarray::Array2;

/// Summed-area tables of a grayscale image and of its squares.
///
/// Both tables are `(height + 1) x (width + 1)` with a zero first row and
/// column, so any rectangle sum is four lookups.
pub struct IntegralImage {
    sum: Array2<i64>,
    sq_sum: Array2<i64>,
}

impl IntegralImage {
    pub fn new(pixels: &[u8], width: usize, height: usize) -> Self {
        debug_assert_eq!(pixels.len(), width * height);
        let mut sum = Array2::<i64>::zeros((height + 1, width + 1));
        let mut sq_sum = Array2::<i64>::zeros((height + 1, width + 1));
        for y in 0..height {
            let mut row_sum = 0i64;
            let mut row_sq = 0i64;
            for x in 0..width {
                let v = pixels[y * width + x] as i64;
                row_sum += v;
                row_sq += v * v;
                sum[[y + 1, x + 1]] = sum[[y, x + 1]] + row_sum;
                sq_sum[[y + 1, x + 1]] = sq_sum[[y, x + 1]] + row_sq;
            }
        }
        Self { sum, sq_sum }
    }

    pub fn width(&self) -> usize {
        self.sum.ncols() - 1
    }

    pub fn height(&self) -> usize {
        self.sum.nrows() - 1
    }

    #[inline]
    pub fn rect_sum(&self, x: usize, y: usize, w: usize, h: usize) -> i64 {
        Self::lookup(&self.sum, x, y, w, h)
    }

    #[inline]
    pub fn rect_sq_sum(&self, x: usize, y: usize, w: usize, h: usize) -> i64 {
        Self::lookup(&self.sq_sum, x, y, w, h)
    }

    #[inline]
    fn lookup(table: &Array2<i64>, x: usize, y: usize, w: usize, h: usize) -> i64 {
        table[[y + h, x + w]] - table[[y, x + w]] - table[[y + h, x]] + table[[y, x]]
    }
}
