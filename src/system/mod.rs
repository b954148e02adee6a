//! # System Interaction Layer
//!
//! The boundary between the task engine and the operating system.
//!
//! - **`shell`**: resolves the shell every command line is handed to, once at startup.
//! - **`executor`**: spawns one command under that shell, bounded by a timeout and a
//!   cancellation token.

pub mod executor;
pub mod shell;
