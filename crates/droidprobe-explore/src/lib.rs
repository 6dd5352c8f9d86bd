pub mod action;
pub mod clock;
pub mod engine;
pub mod policy;
pub mod trace;
