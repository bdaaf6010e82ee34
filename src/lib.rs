pub mod commands;
pub mod config;
pub mod coordinator;
pub mod drag;
pub mod gateway;
pub mod graph;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod requirements;
pub mod store;

pub use pipeline::Pipeline;
