pub mod auth;
pub mod cli;
pub mod earth_engine;
pub mod http;
pub mod load_config;
pub mod storage;

pub use cli::{run, Cli, Commands};
