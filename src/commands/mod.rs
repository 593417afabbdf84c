//! Command handlers behind the `resget` binary.
//!
//! Each handler resolves its configuration, runs one use case and prints
//! the outcome. A handler returns an error when any requested name fails.

pub mod config;
mod find;
mod get;
mod install;
mod interrupt;
mod paths;
mod repo;
mod uninstall;

pub use config::Config;
pub use find::find;
pub use get::get;
pub use install::install;
pub use repo::{repo_list, repo_register, repo_set, repo_unregister};
pub use uninstall::uninstall;
