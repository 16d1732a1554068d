pub mod bridge;
pub mod handlers;
pub mod resolver;
