//! Application services layer.

pub mod document;
pub mod error;
pub mod events;
pub mod jobs;
pub mod render;
pub mod repos;
