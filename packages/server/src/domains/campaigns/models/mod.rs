pub mod campaign;
pub mod lead;

pub use campaign::Campaign;
pub use lead::Lead;
