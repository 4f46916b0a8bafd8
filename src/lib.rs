//! Assembly API Library
//!
//! This crate provides the build-order engine: BOM-driven quantity
//! accounting, stock allocation (manual and automatic), and the atomic
//! lifecycle transactions that cancel or complete a build against stock.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod migrator;
pub mod services;
