// Lattice Daemon Library
// Exposes internal modules for integration tests and tooling

#[macro_use]
extern crate log;

pub mod config;
pub mod core;
pub mod logger;
pub mod node;
pub mod p2p;
