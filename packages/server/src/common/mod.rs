// Common types and utilities shared across the application

pub mod utils;
pub mod value;

pub use value::Value;
