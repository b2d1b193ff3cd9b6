//! Report PDF render worker.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
