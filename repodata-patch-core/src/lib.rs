#![doc = "repodata-patch-core: rule engine and pipeline for repodata patch instructions."]

//! This crate holds the patch rules, the pure engine that applies them to a
//! subdir's index, and the I/O contracts used to fetch indexes and persist the
//! resulting instructions. The CLI lives in the `repodata-patch` crate.
//!
//! # Usage
//! Build [`rules::RuleTables`], obtain a [`repodata::Repodata`] and call
//! [`patch::compute_instructions`]; or run the whole fetch/compute/store
//! pipeline with [`generate::generate`].

pub mod config;
pub mod contract;
pub mod error;
pub mod fetch;
pub mod generate;
pub mod patch;
pub mod repodata;
pub mod rules;
pub mod store;
pub mod subdir;
