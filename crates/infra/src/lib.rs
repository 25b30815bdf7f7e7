//! Infrastructure layer: Postgres connection, migrations, repositories.

pub mod jobs;
pub mod postgres;

pub use jobs::{InMemoryJobRepository, JobRepository, PgJobRepository, RepoError};
pub use postgres::{connect, PgConfig, MIGRATOR};
