pub mod app;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod lines;
pub mod paths;
pub mod prompt;
pub mod relay;
pub mod request;
pub mod routes;
pub mod upstream;
