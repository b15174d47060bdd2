pub mod audit;
pub mod calendar;
pub mod costs;
pub mod model;
pub mod plans;
pub mod scheduling;
