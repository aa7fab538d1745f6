pub mod classifier;
pub mod cli;
pub mod config;
pub mod error;
pub mod policy;
pub mod registry;
pub mod report;
pub mod router;
pub mod templates;
pub mod ticket;
pub mod tracker;
