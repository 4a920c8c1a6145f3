use ndarray::Array2;

/// The spline degree used whenever there are enough control points.
///
/// Degree and boundary policy are fixed: callers choose how many control
/// points to give the optimizer, never the shape of the basis.
pub const DEGREE: usize = 3;

/// A clamped, uniform B-spline basis over the parameter interval [0, 1].
///
/// The first and last knots are repeated `degree + 1` times, so the curve
/// starts at the first control value, ends at the last one, and the basis
/// functions form a partition of unity everywhere on [0, 1].
#[derive(Debug, Clone)]
pub struct BSpline {
    degree: usize,
    n_poles: usize,
    knots: Vec<f64>,
}

impl BSpline {
    /// Creates the basis for `n_poles` control points.
    ///
    /// The degree is [`DEGREE`], lowered to `n_poles - 1` when there are too
    /// few points for a cubic; a single point gives a constant.
    pub fn new(n_poles: usize) -> Result<Self, SplineError> {
        if n_poles == 0 {
            return Err(SplineError::NoControlPoints);
        }
        let degree = DEGREE.min(n_poles - 1);

        let interior = n_poles - degree - 1;
        let mut knots = Vec::with_capacity(n_poles + degree + 1);
        knots.extend(std::iter::repeat_n(0.0, degree + 1));
        knots.extend((1..=interior).map(|i| i as f64 / (interior + 1) as f64));
        knots.extend(std::iter::repeat_n(1.0, degree + 1));

        Ok(Self {
            degree,
            n_poles,
            knots,
        })
    }

    /// The degree actually used
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// The number of control points
    pub fn n_poles(&self) -> usize {
        self.n_poles
    }

    /// The full knot vector
    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    // The knot span containing t, i.e. the index i with knots[i] <= t < knots[i+1],
    // closed on the right at the last span.
    fn find_span(&self, t: f64) -> usize {
        let p = self.degree;
        let n = self.n_poles - 1;
        if t >= self.knots[n + 1] {
            return n;
        }
        if t <= self.knots[p] {
            return p;
        }

        let (mut low, mut high) = (p, n + 1);
        let mut mid = (low + high) / 2;
        while t < self.knots[mid] || t >= self.knots[mid + 1] {
            if t < self.knots[mid] {
                high = mid;
            } else {
                low = mid;
            }
            mid = (low + high) / 2;
        }
        mid
    }

    /// Values of every basis function at `t`, clamped to [0, 1].
    ///
    /// Uses the triangular Cox-de Boor recursion: at most `degree + 1`
    /// functions are non-zero, the others are left at zero.
    pub fn basis_row(&self, t: f64) -> Vec<f64> {
        let t = t.clamp(0.0, 1.0);
        let p = self.degree;
        let span = self.find_span(t);

        let mut local = vec![0.0; p + 1];
        let mut left = vec![0.0; p + 1];
        let mut right = vec![0.0; p + 1];
        local[0] = 1.0;

        for j in 1..=p {
            left[j] = t - self.knots[span + 1 - j];
            right[j] = self.knots[span + j] - t;
            let mut saved = 0.0;
            for r in 0..j {
                // clamped knots keep this denominator strictly positive inside a span
                let temp = local[r] / (right[r + 1] + left[j - r]);
                local[r] = saved + right[r + 1] * temp;
                saved = left[j - r] * temp;
            }
            local[j] = saved;
        }

        let mut row = vec![0.0; self.n_poles];
        for (r, value) in local.into_iter().enumerate() {
            row[span - p + r] = value;
        }
        row
    }

    /// The spline value at `t` for the given control values.
    ///
    /// # Panics
    ///
    /// Panics if there is not exactly one value per control point.
    pub fn evaluate(&self, controls: &[f64], t: f64) -> f64 {
        assert_eq!(controls.len(), self.n_poles, "one value per control point");
        self.basis_row(t)
            .iter()
            .zip(controls)
            .map(|(b, c)| b * c)
            .sum()
    }

    /// The `ts.len() × n_poles` basis matrix sampled at `ts`
    pub fn basis_matrix(&self, ts: &[f64]) -> Array2<f64> {
        let mut matrix = Array2::zeros((ts.len(), self.n_poles));
        for (mut row, &t) in matrix.rows_mut().into_iter().zip(ts) {
            for (entry, value) in row.iter_mut().zip(self.basis_row(t)) {
                *entry = value;
            }
        }
        matrix
    }
}

/// Uniform parameter samples `k / (m - 1)` on [0, 1]; a single sample sits at 0.
pub fn sample_parameters(m: usize) -> Vec<f64> {
    match m {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..m).map(|k| k as f64 / (m - 1) as f64).collect(),
    }
}

/// The result of expanding control values into samples.
///
/// `values = basis · controls` holds exactly, up to floating-point rounding.
#[derive(Debug, Clone, PartialEq)]
pub struct SplineExpansion {
    /// The sampled values
    pub values: Vec<f64>,
    /// The `samples × controls` reconstruction matrix
    pub basis: Array2<f64>,
}

/// Expand `controls` into `samples` uniformly spaced values.
///
/// When there are as many controls as samples the expansion is the identity:
/// the values are returned untouched and the basis is the identity matrix.
pub fn expand(controls: &[f64], samples: usize) -> Result<SplineExpansion, SplineError> {
    if samples == 0 {
        return Err(SplineError::NoSamples);
    }
    if controls.is_empty() {
        return Err(SplineError::NoControlPoints);
    }

    if controls.len() == samples {
        return Ok(SplineExpansion {
            values: controls.to_vec(),
            basis: Array2::eye(samples),
        });
    }

    let spline = BSpline::new(controls.len())?;
    let basis = spline.basis_matrix(&sample_parameters(samples));
    let values = basis.dot(&ndarray::ArrayView1::from(controls)).to_vec();

    Ok(SplineExpansion { values, basis })
}

/// Errors from the spline expansion itself
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SplineError {
    /// No control values were given
    #[error("no control points")]
    NoControlPoints,
    /// Zero samples were requested
    #[error("no samples requested")]
    NoSamples,
}
