//! # interweave
//!
//! Fans shell command templates out across targets, ports and protocols, then runs the
//! resulting tasks under bounded concurrency while honoring block and blocker ordering.

pub use tokio_util::sync::CancellationToken;

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod system;
