//! Worker fleet: claims jobs from the repository, runs handlers, finalizes
//! outcomes, and recovers stuck leases.

pub mod handlers;
pub mod pool;
pub mod worker;

pub use pool::{PoolHandle, WorkerPool};
pub use worker::Worker;
