pub mod file;
pub mod rates;
pub mod stdin;
