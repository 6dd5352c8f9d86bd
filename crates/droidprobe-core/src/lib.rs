pub mod batch;
pub mod config;
pub mod inspect;
pub mod limits;
pub mod report;
pub mod session;
pub mod telemetry;
