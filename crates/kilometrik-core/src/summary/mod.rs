pub mod dashboard;

pub use dashboard::{
    summarize_trips, LastTrip, MonthTotals, PricedTrip, TripSummary, TripSummaryInput, VehicleTotals,
    WeekTotals, WEEKS_SHOWN,
};
