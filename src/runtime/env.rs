//! Environment lookups used to pick install locations and credentials.

use std::env;
use std::path::PathBuf;

use super::RealRuntime;

impl RealRuntime {
    pub(crate) fn env_var_impl(&self, key: &str) -> Result<String, env::VarError> {
        env::var(key)
    }

    pub(crate) fn home_dir_impl(&self) -> Option<PathBuf> {
        dirs::home_dir()
    }

    pub(crate) fn config_dir_impl(&self) -> Option<PathBuf> {
        dirs::config_dir()
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn is_privileged_impl(&self) -> bool {
        #[cfg(unix)]
        return nix::unistd::geteuid().is_root();

        #[cfg(windows)]
        return is_elevated::is_elevated();
    }
}
