mod error;
pub use error::*;

mod numeric;
pub use numeric::*;
