pub mod calendar;
pub mod clock;
pub mod repo;
