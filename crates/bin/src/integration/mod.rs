//! Glue between the command line and the library crates.
//!
//! Reference series come from CSV files, the SQLite cache or Yahoo Finance,
//! in that order of preference.

pub(crate) mod cache_manager;
pub(crate) mod reference_loader;
