//! Routing tree: one file per area.

use axum::Router;

pub mod jobs;
pub mod system;

pub fn router() -> Router {
    Router::new().merge(jobs::router()).merge(system::router())
}
