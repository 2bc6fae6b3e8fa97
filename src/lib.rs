//! # hlsc
//!
//! This crate plumbs together the HLS crates and provides a command-line
//! interface that schedules a three-address function, allocates functional
//! units for it and reports the resulting datapath and state machine.
//! Library users should depend on [`hls_ir`], [`hls_opt`] and [`hls_backend`]
//! directly.
pub mod cmdline;
pub mod driver;
