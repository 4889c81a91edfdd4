pub mod cumulative;

pub use cumulative::{advance, effective_distance, replay, sort_chronologically, Advance, CumulativeState};
