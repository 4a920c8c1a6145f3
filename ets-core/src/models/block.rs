use ndarray::{Array1, Array2, Axis};

/// A diagonal matrix, stored as its diagonal.
///
/// Per-year sensitivities (a quantity in year `y` depending only on another
/// quantity in the same year) are diagonal. Keeping them diagonal through
/// composition avoids building `m × m` dense matrices that are mostly zeros.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagonal(Array1<f64>);

impl Diagonal {
    /// A diagonal matrix with the given diagonal
    pub fn new(values: Vec<f64>) -> Self {
        Self(Array1::from_vec(values))
    }

    /// The `n × n` identity
    pub fn identity(n: usize) -> Self {
        Self(Array1::ones(n))
    }

    /// The size of the (square) matrix
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the matrix is `0 × 0`
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The diagonal
    pub fn values(&self) -> &Array1<f64> {
        &self.0
    }

    /// Expand into a dense matrix
    pub fn to_dense(&self) -> Array2<f64> {
        Array2::from_diag(&self.0)
    }
}

/// The partial derivative `d(output)/d(input)` of one declared pair.
///
/// Blocks are immutable values: composing or summing blocks always builds a
/// new block, so a block handed to the composer is never altered by it. The
/// representation is kept as sparse as the composition rules allow:
///
/// | left × right      | result   |
/// |-------------------|----------|
/// | zero × any        | zero     |
/// | diagonal × diagonal | diagonal |
/// | diagonal × dense  | dense (row scaling) |
/// | dense × diagonal  | dense (column scaling) |
/// | dense × dense     | dense    |
#[derive(Clone, Debug, PartialEq)]
pub enum DerivativeBlock {
    /// A structurally zero block of the given shape
    Zero {
        /// Number of rows (output dimension)
        rows: usize,
        /// Number of columns (input dimension)
        cols: usize,
    },
    /// A square diagonal block
    Diagonal(Diagonal),
    /// A general dense block
    Dense(Array2<f64>),
}

/// Two blocks whose shapes cannot be combined
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cannot {op} blocks of shape {left:?} and {right:?}")]
pub struct ShapeError {
    /// The attempted operation
    pub op: &'static str,
    /// Shape of the left operand
    pub left: (usize, usize),
    /// Shape of the right operand
    pub right: (usize, usize),
}

impl DerivativeBlock {
    /// A zero block
    pub fn zero(rows: usize, cols: usize) -> Self {
        Self::Zero { rows, cols }
    }

    /// The `n × n` identity
    pub fn identity(n: usize) -> Self {
        Self::Diagonal(Diagonal::identity(n))
    }

    /// A diagonal block with the given diagonal
    pub fn diagonal(values: Vec<f64>) -> Self {
        Self::Diagonal(Diagonal::new(values))
    }

    /// A `1 × n` block, the gradient of a scalar
    pub fn row(values: Vec<f64>) -> Self {
        Self::Dense(Array1::from_vec(values).insert_axis(Axis(0)))
    }

    /// An `n × 1` block, the derivative of a series with respect to a scalar
    pub fn column(values: Vec<f64>) -> Self {
        Self::Dense(Array1::from_vec(values).insert_axis(Axis(1)))
    }

    /// A `1 × 1` block
    pub fn scalar(value: f64) -> Self {
        Self::diagonal(vec![value])
    }

    /// Number of rows (output dimension)
    pub fn rows(&self) -> usize {
        match self {
            Self::Zero { rows, .. } => *rows,
            Self::Diagonal(diagonal) => diagonal.len(),
            Self::Dense(matrix) => matrix.nrows(),
        }
    }

    /// Number of columns (input dimension)
    pub fn cols(&self) -> usize {
        match self {
            Self::Zero { cols, .. } => *cols,
            Self::Diagonal(diagonal) => diagonal.len(),
            Self::Dense(matrix) => matrix.ncols(),
        }
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        (self.rows(), self.cols())
    }

    /// Whether the block is structurally zero
    pub fn is_zero(&self) -> bool {
        matches!(self, Self::Zero { .. })
    }

    /// The entry at `(row, col)`
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        let (rows, cols) = self.shape();
        assert!(row < rows && col < cols, "index out of bounds");
        match self {
            Self::Zero { .. } => 0.0,
            Self::Diagonal(diagonal) => {
                if row == col {
                    diagonal.0[row]
                } else {
                    0.0
                }
            }
            Self::Dense(matrix) => matrix[[row, col]],
        }
    }

    /// Expand into a dense matrix
    pub fn to_dense(&self) -> Array2<f64> {
        match self {
            Self::Zero { rows, cols } => Array2::zeros((*rows, *cols)),
            Self::Diagonal(diagonal) => diagonal.to_dense(),
            Self::Dense(matrix) => matrix.clone(),
        }
    }

    /// Multiply every entry by `factor`
    pub fn scale(&self, factor: f64) -> Self {
        match self {
            Self::Zero { rows, cols } => Self::zero(*rows, *cols),
            Self::Diagonal(diagonal) => Self::Diagonal(Diagonal(&diagonal.0 * factor)),
            Self::Dense(matrix) => Self::Dense(matrix * factor),
        }
    }

    /// The matrix product `self · rhs`, i.e. the chain rule for one edge pair.
    pub fn compose(&self, rhs: &Self) -> Result<Self, ShapeError> {
        if self.cols() != rhs.rows() {
            return Err(ShapeError {
                op: "compose",
                left: self.shape(),
                right: rhs.shape(),
            });
        }

        let result = match (self, rhs) {
            (Self::Zero { .. }, _) | (_, Self::Zero { .. }) => Self::zero(self.rows(), rhs.cols()),
            (Self::Diagonal(a), Self::Diagonal(b)) => Self::Diagonal(Diagonal(&a.0 * &b.0)),
            (Self::Diagonal(d), Self::Dense(m)) => {
                Self::Dense(m * &d.0.view().insert_axis(Axis(1)))
            }
            (Self::Dense(m), Self::Diagonal(d)) => Self::Dense(m * &d.0),
            (Self::Dense(a), Self::Dense(b)) => Self::Dense(a.dot(b)),
        };
        Ok(result)
    }

    /// The sum `self + rhs`, used to accumulate the contributions of several paths.
    pub fn add(&self, rhs: &Self) -> Result<Self, ShapeError> {
        if self.shape() != rhs.shape() {
            return Err(ShapeError {
                op: "add",
                left: self.shape(),
                right: rhs.shape(),
            });
        }

        let result = match (self, rhs) {
            (Self::Zero { .. }, other) | (other, Self::Zero { .. }) => other.clone(),
            (Self::Diagonal(a), Self::Diagonal(b)) => Self::Diagonal(Diagonal(&a.0 + &b.0)),
            (Self::Dense(m), Self::Diagonal(d)) | (Self::Diagonal(d), Self::Dense(m)) => {
                let mut sum = m.clone();
                sum.diag_mut().zip_mut_with(&d.0, |x, &y| *x += y);
                Self::Dense(sum)
            }
            (Self::Dense(a), Self::Dense(b)) => Self::Dense(a + b),
        };
        Ok(result)
    }
}
