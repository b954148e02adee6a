// src/core/mod.rs

pub mod address_resolver;
pub mod compiler;
pub mod completion;
pub mod config_loader;
pub mod interpolator;
pub mod parameters;
pub mod worker_pool;
