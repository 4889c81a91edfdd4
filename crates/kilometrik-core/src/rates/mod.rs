pub mod registry;
pub mod resolver;
pub mod table;

#[cfg(feature = "builtin_tables")]
pub mod builtin;

pub use registry::{RateTableRegistry, YearFallback};
pub use resolver::{resolve_band, resolve_segments};
pub use table::{Band, Formula, HorsepowerRange, RateTable, RateTableConfig, RateTableKey, Segment};
