pub mod check_catalog;
pub mod error;
pub mod experiments;
pub mod growth;
pub mod magic;
pub mod math;
pub mod position_index;
pub mod qrm;
pub mod sim;
pub mod stream;
pub mod surface_code;
pub mod surgery;
pub mod sweep;

pub use error::{CircuitError, Result};
