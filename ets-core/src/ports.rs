mod gradient;
mod sensitivity;

pub use gradient::GradientQuery;
pub use sensitivity::{LocalSensitivities, Partial};
