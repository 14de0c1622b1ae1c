pub(crate) mod bootstrap;
mod gallery;
pub(crate) mod loop_runner;
