//! Composite price index engine library.
//!
//! Exposes every component module so integration tests and the binary
//! entry point can drive them directly.

pub mod config;
pub mod error;
pub mod exchange;
pub mod index;
pub mod lattice;
pub mod persistence;
pub mod roster;
pub mod session;
pub mod shm;
pub mod supervisor;
