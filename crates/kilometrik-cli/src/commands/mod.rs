pub mod rates;
pub mod summary;
pub mod trip;
