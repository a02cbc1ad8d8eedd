pub mod calls;
pub mod config;
pub mod context;
pub mod math;
pub mod service;
pub mod telemetry;
