pub mod configuration;
pub mod errors;
