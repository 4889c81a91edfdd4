pub mod bracket;

pub use bracket::{annual_allowance, round_money, split_amount, AffineConstantPolicy, BracketSplit, SegmentPortion};
