//! Small shared helpers

pub mod interval_counter;

pub use interval_counter::IntervalCounter;
