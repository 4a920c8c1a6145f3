use ets_core::models::Diagnostics;

/// A denominator after the epsilon floor has been applied.
///
/// The forward value and its derivative must go through the same floored
/// expression: when the floor is active the denominator is a constant, so its
/// derivative with respect to the raw value is zero.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Floored {
    /// The denominator to divide by
    pub value: f64,
    /// Whether the floor replaced the raw value
    pub floored: bool,
}

impl Floored {
    /// `d(value)/d(raw)`: 1 when the raw value was used, 0 when floored
    pub fn derivative(&self) -> f64 {
        if self.floored { 0.0 } else { 1.0 }
    }
}

/// Apply the epsilon floor to a denominator.
///
/// Values whose magnitude is below `floor` are replaced by `floor` and the
/// event is recorded in `diagnostics`; `location` is only built in that case.
pub fn floor_denominator(
    raw: f64,
    floor: f64,
    diagnostics: &mut Diagnostics,
    location: impl FnOnce() -> String,
) -> Floored {
    if raw.abs() < floor {
        diagnostics.record_degeneracy(location(), raw);
        Floored {
            value: floor,
            floored: true,
        }
    } else {
        Floored {
            value: raw,
            floored: false,
        }
    }
}

/// A smooth surrogate of `|x|`: `x · tanh(x / epsilon)`.
///
/// It is exactly zero at zero, differentiable everywhere (unlike `abs`, whose
/// gradient jumps at zero) and converges to `|x|` exponentially fast once
/// `|x|` exceeds a few `epsilon`.
pub fn smoothed_abs(x: f64, epsilon: f64) -> f64 {
    x * (x / epsilon).tanh()
}

/// The derivative of [`smoothed_abs`] with respect to `x`.
pub fn smoothed_abs_derivative(x: f64, epsilon: f64) -> f64 {
    let u = x / epsilon;
    let t = u.tanh();
    t + u * (1.0 - t * t)
}

/// The step indicator applied to mix weights: 0 for negligible weights, 1 otherwise.
pub fn step(weight: f64, threshold: f64) -> f64 {
    if weight > threshold { 1.0 } else { 0.0 }
}
