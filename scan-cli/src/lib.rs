//! Ambient stack around the `clusters` engine: CSV ingest, RoI construction,
//! CLI parsing, and JSON reporting (SPEC_FULL §4.11–§4.15).

pub mod cli;
pub mod ingest;
pub mod json;
pub mod roi_source;
