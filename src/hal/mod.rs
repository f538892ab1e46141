//! Hardware Abstraction Layer implementations.
//!
//! This module contains concrete implementations of the traits
//! defined in [`crate::traits`].
//!
//! # Available Implementations
//!
//! - `mock`: Test doubles that record calls
//! - `sim`: Simulated wheels for running without a buggy

pub mod mock;
pub mod sim;

use std::thread::JoinHandle;

pub use mock::*;
pub use sim::{sim_wheel, SimMotor, SimPulseInput};

/// Join a worker thread, logging at `warn` if it panicked.
///
/// Returns true if the thread exited normally.
pub(crate) fn join_worker(worker: JoinHandle<()>) -> bool {
    let name = worker.thread().name().unwrap_or("unnamed").to_string();
    match worker.join() {
        Ok(()) => true,
        Err(_) => {
            tracing::warn!(thread = %name, "worker thread panicked");
            false
        }
    }
}
