//! Everything resget asks of the host system.
//!
//! Install, uninstall and the repository store only touch the disk, the
//! environment and the terminal through [`Runtime`], so their tests run
//! against [`MockRuntime`] or a temporary directory.
//!
//! - `env`: credential variables, home/config directories, privilege
//! - `fs`: install root, staging area and manifest files
//! - `lock`: per-package advisory locks
//! - `user`: trust prompts

mod env;
mod fs;
mod lock;
mod user;

use anyhow::Result;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub use lock::FileLock;

#[cfg_attr(test, mockall::automock)]
pub trait Runtime: Send + Sync {
    /// Looks up a variable, e.g. the one named by a repository's credential.
    fn env_var(&self, key: &str) -> Result<String, std::env::VarError>;
    fn home_dir(&self) -> Option<PathBuf>;
    fn config_dir(&self) -> Option<PathBuf>;
    /// Root on Unix, elevated on Windows. Selects the system-wide install root.
    fn is_privileged(&self) -> bool;

    /// Replaces `path` as a whole; readers never see a partial manifest.
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn create_file(&self, path: &Path) -> Result<Box<dyn Write + Send>>;
    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>>;
    fn remove_file(&self, path: &Path) -> Result<()>;
    /// Unix mode bits from an archive entry. Ignored elsewhere.
    fn set_permissions(&self, path: &Path, mode: u32) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    /// Directory entries sorted by path.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    /// Moves a staged package into place.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;
    fn remove_dir(&self, path: &Path) -> Result<()>;
    fn remove_dir_all(&self, path: &Path) -> Result<()>;

    /// Blocks until no other process holds the lock file at `path`.
    fn lock_exclusive(&self, path: &Path) -> Result<FileLock>;

    /// Asks a yes/no question on the terminal. Anything but y/yes is no.
    fn confirm(&self, prompt: &str) -> Result<bool>;
}

/// [`Runtime`] backed by the real file system and terminal.
pub struct RealRuntime;

impl Runtime for RealRuntime {
    fn env_var(&self, key: &str) -> Result<String, std::env::VarError> {
        self.env_var_impl(key)
    }
    fn home_dir(&self) -> Option<PathBuf> {
        self.home_dir_impl()
    }
    fn config_dir(&self) -> Option<PathBuf> {
        self.config_dir_impl()
    }
    fn is_privileged(&self) -> bool {
        self.is_privileged_impl()
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.write_impl(path, contents)
    }
    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.read_to_string_impl(path)
    }
    fn create_file(&self, path: &Path) -> Result<Box<dyn Write + Send>> {
        self.create_file_impl(path)
    }
    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        self.open_impl(path)
    }
    fn remove_file(&self, path: &Path) -> Result<()> {
        self.remove_file_impl(path)
    }
    fn set_permissions(&self, path: &Path, mode: u32) -> Result<()> {
        self.set_permissions_impl(path, mode)
    }

    fn exists(&self, path: &Path) -> bool {
        self.exists_impl(path)
    }
    fn is_dir(&self, path: &Path) -> bool {
        self.is_dir_impl(path)
    }
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        self.read_dir_impl(path)
    }
    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.create_dir_all_impl(path)
    }
    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.rename_impl(from, to)
    }
    fn remove_dir(&self, path: &Path) -> Result<()> {
        self.remove_dir_impl(path)
    }
    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.remove_dir_all_impl(path)
    }

    fn lock_exclusive(&self, path: &Path) -> Result<FileLock> {
        self.lock_exclusive_impl(path)
    }

    fn confirm(&self, prompt: &str) -> Result<bool> {
        self.confirm_impl(prompt)
    }
}
