//! Domain logic, ports and adapters for
//! the clinicdesk backend.

pub mod app;
pub mod domain;
pub mod infra;
pub mod ports;
