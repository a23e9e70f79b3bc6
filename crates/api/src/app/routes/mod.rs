use axum::Router;

pub mod sales;
pub mod system;
pub mod vehicles;

/// Router for all resource endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/vehicles", vehicles::router())
        .nest("/sales", sales::router())
}
