pub mod deployment;
pub mod invoke;
pub mod serving_endpoint;
