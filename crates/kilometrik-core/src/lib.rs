pub mod calculator;
pub mod error;
pub mod rates;
pub mod service;
pub mod tracker;
pub mod types;

#[cfg(feature = "summary")]
pub mod summary;

pub use error::MileageError;
pub use types::*;

/// Standard result type for all mileage engine operations
pub type MileageResult<T> = Result<T, MileageError>;
