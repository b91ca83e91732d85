// Library exports for the server launcher

pub mod backup;
pub mod cli;
pub mod config;
pub mod error;
pub mod logs;
pub mod process;
