pub mod audit;
pub mod dead_letters;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod pipeline;
pub mod routes;

pub use routes::create_router;
