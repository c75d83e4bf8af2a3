pub mod audit;
pub mod downloads;
pub mod exports;
pub mod handlers;
pub mod middleware;
pub mod routes;

pub use routes::create_router;
