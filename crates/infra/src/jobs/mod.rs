//! Job repositories: the typed surface over the `jobs` table.
//!
//! ## Components
//!
//! - `JobRepository`: the operation contract (create, claim, finalize, reap)
//! - `PgJobRepository`: the durable Postgres implementation
//! - `InMemoryJobRepository`: a test double with the same claim semantics

mod in_memory;
mod postgres;
mod repository;

pub use in_memory::InMemoryJobRepository;
pub use postgres::PgJobRepository;
pub use repository::{JobRepository, RepoError};
