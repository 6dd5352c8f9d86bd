pub mod adb;
pub mod config;
pub mod device;
pub mod scripted;
