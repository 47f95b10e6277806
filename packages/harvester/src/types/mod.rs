//! Data types shared across the harvester.

pub mod config;
pub mod listing;
pub mod record;
pub mod section;
