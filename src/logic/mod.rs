//! Logic modules: turn configured groups and policies into install attempts.
//!
//! # Modules
//!
//! - `resolver`: per-package and per-group backend selection, fallback and classification
//! - `driver`: group-by-group run orchestration and interrupt handling

pub mod driver;
pub mod resolver;
