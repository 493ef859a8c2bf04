pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod export;
pub mod jobs;
pub mod masks;
pub mod models;
pub mod refine;
pub mod session;

pub use error::WorkflowError;
