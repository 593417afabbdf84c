//! Application layer - use cases that coordinate the search, resolver and
//! the local package store.
//!
//! This layer sits between the CLI handlers and the domain modules.

mod install;
mod list;
mod uninstall;

pub use install::{InstallOptions, InstallReport, InstallRequest, InstallStatus, InstallUseCase};
pub use list::list_installed;
pub use uninstall::{UninstallOptions, UninstallOutcome, UninstallRequest, UninstallUseCase};
