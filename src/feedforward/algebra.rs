//! Vector and matrix primitives for the network core.
//!
//! A [`Vector`] is an owned, fixed-length sequence of `f64` values. A
//! [`Matrix`] is an ordered sequence of row vectors, which may be ragged at
//! rest; operations that need a rectangular operand validate that property
//! and fail with [`AlgebraError::NotRectangular`] instead of assuming it.

use std::fmt;
use std::ops::{Index, IndexMut};

use itertools::izip;

/// Logistic sigmoid, `1 / (1 + e^-x)`.
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Derivative of the sigmoid at `x`.
pub fn sigmoid_prime(x: f64) -> f64 {
    sigmoid_prime_from(sigmoid(x))
}

/// Derivative of the sigmoid expressed through an already-computed
/// `s = sigmoid(x)`, so hot paths can skip the exponential.
pub fn sigmoid_prime_from(s: f64) -> f64 {
    s * (1.0 - s)
}

/// Owned fixed-length sequence of real values.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    elems: Vec<f64>,
}

impl Vector {
    /// Zero-filled vector of the given length.
    pub fn zeros(len: usize) -> Vector {
        Vector {
            elems: vec![0.0; len],
        }
    }

    /// Vector whose element at index `i` is `rule(i)`.
    pub fn from_fn<F>(len: usize, mut rule: F) -> Vector
    where
        F: FnMut(usize) -> f64,
    {
        Vector {
            elems: (0..len).map(|i| rule(i)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, f64> {
        self.elems.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, f64> {
        self.elems.iter_mut()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.elems
    }

    /// New vector with `f` applied to every element.
    pub fn map<F>(&self, f: F) -> Vector
    where
        F: Fn(f64) -> f64,
    {
        Vector {
            elems: self.elems.iter().map(|&value| f(value)).collect(),
        }
    }

    /// Applies `f` to every element in place.
    pub fn apply<F>(&mut self, f: F)
    where
        F: Fn(f64) -> f64,
    {
        for value in &mut self.elems {
            *value = f(*value);
        }
    }

    /// Resets every element to zero.
    pub fn fill_zero(&mut self) {
        self.apply(|_| 0.0);
    }

    /// Multiplies every element by `factor`. Always defined.
    pub fn scale(&mut self, factor: f64) {
        self.apply(|value| value * factor);
    }

    /// Adds `offset` to every element. Always defined.
    pub fn shift(&mut self, offset: f64) {
        self.apply(|value| value + offset);
    }

    /// Overwrites this vector with the contents of `source`.
    ///
    /// # Panics
    /// Panics if the lengths differ; callers are expected to have validated
    /// shapes beforehand.
    pub fn copy_from(&mut self, source: &Vector) {
        self.elems.copy_from_slice(&source.elems);
    }

    /// Scalar (dot) product of two vectors of the same length.
    ///
    /// # Returns
    /// * `Ok(f64)` when the lengths agree;
    /// * `Err(AlgebraError::ShapeMismatch)` otherwise.
    pub fn dot(&self, right: &Vector) -> Result<f64, AlgebraError> {
        self.check_same_len(right)?;
        Ok(izip!(&self.elems, &right.elems)
            .map(|(a, b)| a * b)
            .sum())
    }

    /// Elementwise sum of two vectors of the same length.
    pub fn add(&self, right: &Vector) -> Result<Vector, AlgebraError> {
        self.check_same_len(right)?;
        Ok(Vector {
            elems: izip!(&self.elems, &right.elems).map(|(a, b)| a + b).collect(),
        })
    }

    /// Elementwise difference of two vectors of the same length.
    pub fn sub(&self, right: &Vector) -> Result<Vector, AlgebraError> {
        self.check_same_len(right)?;
        Ok(Vector {
            elems: izip!(&self.elems, &right.elems).map(|(a, b)| a - b).collect(),
        })
    }

    /// Elementwise (Hadamard) product of two vectors of the same length.
    pub fn hadamard(&self, right: &Vector) -> Result<Vector, AlgebraError> {
        self.check_same_len(right)?;
        Ok(Vector {
            elems: izip!(&self.elems, &right.elems).map(|(a, b)| a * b).collect(),
        })
    }

    fn check_same_len(&self, right: &Vector) -> Result<(), AlgebraError> {
        if self.len() != right.len() {
            return Err(AlgebraError::ShapeMismatch(SizeMismatch {
                expected: self.len(),
                got: right.len(),
            }));
        }
        Ok(())
    }
}

impl From<Vec<f64>> for Vector {
    fn from(elems: Vec<f64>) -> Vector {
        Vector { elems }
    }
}

impl Index<usize> for Vector {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.elems[index]
    }
}

impl IndexMut<usize> for Vector {
    fn index_mut(&mut self, index: usize) -> &mut f64 {
        &mut self.elems[index]
    }
}

/// Ordered sequence of row vectors.
///
/// Rows may have different lengths; [`Matrix::is_rectangular`] reports
/// whether they all match, and the operations that require a rectangular
/// operand check it themselves. [`Matrix::width`] is the first row's length
/// (zero for an empty matrix).
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: Vec<Vector>,
}

impl Matrix {
    /// Matrix built from the given rows, ragged or not.
    pub fn from_rows(rows: Vec<Vector>) -> Matrix {
        Matrix { rows }
    }

    /// Zero-filled rectangular matrix.
    pub fn zeros(height: usize, width: usize) -> Matrix {
        Matrix {
            rows: (0..height).map(|_| Vector::zeros(width)).collect(),
        }
    }

    /// Rectangular matrix whose element at `(i, j)` is `rule(i, j)`.
    pub fn from_fn<F>(height: usize, width: usize, mut rule: F) -> Matrix
    where
        F: FnMut(usize, usize) -> f64,
    {
        Matrix {
            rows: (0..height)
                .map(|i| Vector::from_fn(width, |j| rule(i, j)))
                .collect(),
        }
    }

    /// Parses a block of text into a matrix, one row per line.
    ///
    /// Tokens are whitespace-separated; tokens that do not parse as numbers
    /// are skipped. Rows are allowed to end up with different lengths:
    /// rectangularity is a separately checked property, never a parse
    /// failure.
    ///
    /// # Examples
    /// ```
    /// # use srsnet::feedforward::Matrix;
    /// let m = Matrix::parse("0.10 0.50\n0.20 0.40\n0.30 0.30");
    /// assert_eq!(m.height(), 3);
    /// assert_eq!(m.width(), 2);
    /// assert!(m.is_rectangular());
    /// ```
    pub fn parse(text: &str) -> Matrix {
        Matrix {
            rows: text
                .lines()
                .map(|line| Vector {
                    elems: line
                        .split_whitespace()
                        .filter_map(|token| token.parse::<f64>().ok())
                        .collect(),
                })
                .collect(),
        }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Length of the first row; zero for an empty matrix.
    pub fn width(&self) -> usize {
        self.rows.first().map_or(0, Vector::len)
    }

    pub fn row(&self, index: usize) -> &Vector {
        &self.rows[index]
    }

    pub fn row_mut(&mut self, index: usize) -> &mut Vector {
        &mut self.rows[index]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Vector> {
        self.rows.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Vector> {
        self.rows.iter_mut()
    }

    /// True iff every row has the same length as the first row.
    pub fn is_rectangular(&self) -> bool {
        match self.rows.split_first() {
            None => true,
            Some((first, rest)) => rest.iter().all(|row| row.len() == first.len()),
        }
    }

    /// New matrix with `f` applied to every element.
    pub fn map<F>(&self, f: F) -> Matrix
    where
        F: Fn(f64) -> f64,
    {
        Matrix {
            rows: self.rows.iter().map(|row| row.map(&f)).collect(),
        }
    }

    /// Resets every element to zero, keeping the shape.
    pub fn fill_zero(&mut self) {
        for row in &mut self.rows {
            row.fill_zero();
        }
    }

    /// Zero matrix with the same row lengths as this one.
    pub fn zeros_like(&self) -> Matrix {
        self.map(|_| 0.0)
    }

    /// Multiplies every element by `factor`. Always defined.
    pub fn scale(&mut self, factor: f64) {
        for row in &mut self.rows {
            row.scale(factor);
        }
    }

    /// Adds `offset` to every element. Always defined.
    pub fn shift(&mut self, offset: f64) {
        for row in &mut self.rows {
            row.shift(offset);
        }
    }

    /// Transposed copy of a rectangular matrix.
    ///
    /// Transposing twice gives the starting matrix back.
    ///
    /// # Returns
    /// * `Ok(Matrix)` with swapped dimensions;
    /// * `Err(AlgebraError::NotRectangular)` when the rows are ragged.
    pub fn transpose(&self) -> Result<Matrix, AlgebraError> {
        self.require_rectangular()?;
        let (height, width) = (self.height(), self.width());
        Ok(Matrix::from_fn(width, height, |i, j| self.rows[j][i]))
    }

    /// Matrix product `self · right` by plain triple-loop accumulation.
    ///
    /// # Returns
    /// * `Ok(Matrix)` of shape `self.height() × right.width()`;
    /// * `Err(AlgebraError::ShapeMismatch)` when `self.width() != right.height()`;
    /// * `Err(AlgebraError::NotRectangular)` when either operand is ragged.
    pub fn matmul(&self, right: &Matrix) -> Result<Matrix, AlgebraError> {
        self.require_rectangular()?;
        right.require_rectangular()?;
        if self.width() != right.height() {
            return Err(AlgebraError::ShapeMismatch(SizeMismatch {
                expected: self.width(),
                got: right.height(),
            }));
        }

        let mut out = Matrix::zeros(self.height(), right.width());
        for i in 0..self.height() {
            for k in 0..self.width() {
                let left = self.rows[i][k];
                let out_row = &mut out.rows[i];
                let right_row = &right.rows[k];
                for j in 0..right_row.len() {
                    out_row[j] += left * right_row[j];
                }
            }
        }
        Ok(out)
    }

    /// Matrix-vector product `self · v`.
    pub fn mat_vec(&self, v: &Vector) -> Result<Vector, AlgebraError> {
        self.require_rectangular()?;
        if self.width() != v.len() {
            return Err(AlgebraError::ShapeMismatch(SizeMismatch {
                expected: self.width(),
                got: v.len(),
            }));
        }
        Ok(Vector::from_fn(self.height(), |i| {
            izip!(self.rows[i].iter(), v.iter())
                .map(|(a, b)| a * b)
                .sum()
        }))
    }

    /// Elementwise sum of two same-shaped matrices.
    pub fn add(&self, right: &Matrix) -> Result<Matrix, AlgebraError> {
        self.zip_rows(right, Vector::add)
    }

    /// Elementwise difference of two same-shaped matrices.
    pub fn sub(&self, right: &Matrix) -> Result<Matrix, AlgebraError> {
        self.zip_rows(right, Vector::sub)
    }

    /// Elementwise (Hadamard) product of two same-shaped matrices.
    pub fn hadamard(&self, right: &Matrix) -> Result<Matrix, AlgebraError> {
        self.zip_rows(right, Vector::hadamard)
    }

    fn zip_rows<F>(&self, right: &Matrix, op: F) -> Result<Matrix, AlgebraError>
    where
        F: Fn(&Vector, &Vector) -> Result<Vector, AlgebraError>,
    {
        if self.height() != right.height() {
            return Err(AlgebraError::ShapeMismatch(SizeMismatch {
                expected: self.height(),
                got: right.height(),
            }));
        }
        let rows = izip!(&self.rows, &right.rows)
            .map(|(a, b)| op(a, b))
            .collect::<Result<Vec<Vector>, AlgebraError>>()?;
        Ok(Matrix { rows })
    }

    fn require_rectangular(&self) -> Result<(), AlgebraError> {
        if let Some(first) = self.rows.first() {
            for (index, row) in self.rows.iter().enumerate() {
                if row.len() != first.len() {
                    return Err(AlgebraError::NotRectangular {
                        row: index,
                        expected: first.len(),
                        got: row.len(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Index<usize> for Matrix {
    type Output = Vector;

    fn index(&self, index: usize) -> &Vector {
        &self.rows[index]
    }
}

impl IndexMut<usize> for Matrix {
    fn index_mut(&mut self, index: usize) -> &mut Vector {
        &mut self.rows[index]
    }
}

/// Payload for size disagreements between two operands.
#[derive(Debug, Clone, PartialEq)]
pub struct SizeMismatch {
    pub expected: usize,
    pub got: usize,
}

impl fmt::Display for SizeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "wanted {} element(s), found {}", self.expected, self.got)
    }
}

/// Error raised by vector/matrix operations with incompatible operands.
#[derive(Debug, Clone, PartialEq)]
pub enum AlgebraError {
    /// Operand lengths or dimensions do not agree for the operation.
    ShapeMismatch(SizeMismatch),
    /// A rectangular matrix was required but a row deviates from row 0.
    NotRectangular {
        row: usize,
        expected: usize,
        got: usize,
    },
}

impl fmt::Display for AlgebraError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AlgebraError::ShapeMismatch(mismatch) => {
                write!(f, "operand shapes disagree: {}", mismatch)
            }
            AlgebraError::NotRectangular { row, expected, got } => write!(
                f,
                "matrix is not rectangular: row {} has {} element(s), row 0 has {}",
                row, got, expected
            ),
        }
    }
}

impl std::error::Error for AlgebraError {}
