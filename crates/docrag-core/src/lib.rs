pub mod chunker;
pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod source;
pub mod traits;
pub mod types;
