pub mod models;
pub mod services;

// Re-export the engine surface for host crates
pub use models::*;
pub use services::*;
