pub(crate) mod bootstrap;
mod error;
pub(crate) mod loader;
pub(crate) mod loop_runner;

pub(crate) use error::DemoError;
