//! picam-detect library crate.
//!
//! Still capture through an ordered fallback chain of capture methods, and
//! object counting on the captured image with an external detector.

pub mod capture;
pub mod cli;
pub mod config;
pub mod detect;
pub mod devices;
pub mod permissions;
