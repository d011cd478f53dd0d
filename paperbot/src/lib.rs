pub mod cli;
pub mod load_config;
pub mod publish;

pub use cli::{run, Cli};
