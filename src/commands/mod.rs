//! CLI Command handlers
//!
//! Handlers that only report on the host live here; the build and plan
//! pipelines are in [`crate::build`].

pub mod doctor;
