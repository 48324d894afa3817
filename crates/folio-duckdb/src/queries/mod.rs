pub mod aggregates;
pub mod breakdown;
pub mod counts;
