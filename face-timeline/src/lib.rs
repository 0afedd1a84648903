//! face-timeline library crate.
//!
//! Background analysis for a video/person catalog: a worker-pool task
//! pipeline samples video frames, matches faces against known persons and
//! stores continuous appearance segments per person.

pub mod analysis;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod media;
pub mod notification;
pub mod pipeline;
pub mod recognition;

pub use error::{Error, Result};
