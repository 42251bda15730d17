//! Hourly home battery schedule optimizer.
//!
//! Aligns consumption, solar and price forecasts into an hourly horizon and
//! solves a linear program for the cheapest way to serve the load from grid,
//! solar and battery. Only the current hour of each plan is acted upon; the
//! plan is recomputed every hour.

pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod optimizer;
pub mod telemetry;

pub use error::{PlannerError, PlannerResult};
