pub mod trip_amount;

pub use trip_amount::{
    compute_trip_amount, replay_trips, EngineOptions, PriorHistory, TripAmount, TripAmountInput,
    TripAmountService, YearReplay, YearReplayInput,
};
