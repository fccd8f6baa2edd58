pub mod types;
pub mod config;
pub mod fetch;
pub mod data;
pub mod processing;
pub mod color;
pub mod projection;
pub mod render;
pub mod server;
pub mod pipeline;
