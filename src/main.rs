use anyhow::Result;
use clap::Parser;
use resget::application::{InstallOptions, UninstallOptions, UninstallRequest};
use resget::commands::{self, Config};
use resget::package::ResourceKind;
use resget::registry::{DEFAULT_PRIORITY, RepositoryDescriptor, RepositoryUpdate};
use resget::search::SearchRequest;
use std::path::PathBuf;

/// resget - resource manager for module and script repositories
///
/// Find resources across registered repositories, install them with their
/// dependencies, and remove them again.
///
/// Examples:
///   resget repo register gallery https://gallery.example/api --trusted
///   resget find 'Az.*' --kind module
///   resget install Pester --version '[5.0,6.0)'
#[derive(Parser, Debug)]
#[command(author, version = env!("RESGET_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Install root directory (overrides defaults; also via RESGET_ROOT)
    #[arg(
        long = "root",
        short = 'r',
        env = "RESGET_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub install_root: Option<PathBuf>,

    /// Repository store file (also via RESGET_REGISTRY)
    #[arg(long = "registry", env = "RESGET_REGISTRY", value_name = "PATH", global = true)]
    pub registry: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Search the registered repositories
    Find(FindArgs),

    /// List installed resources
    Get(GetArgs),

    /// Install resources and their dependencies
    Install(InstallArgs),

    /// Remove installed versions of a resource
    Uninstall(UninstallArgs),

    /// Manage registered repositories
    #[command(subcommand)]
    Repo(RepoCommands),
}

#[derive(clap::Args, Debug)]
pub struct FindArgs {
    /// Names or glob patterns (all resources when omitted)
    #[arg(value_name = "NAME")]
    pub names: Vec<String>,

    /// Exact version, `*`, or a range such as `[1.0,2.0)`
    #[arg(long)]
    pub version: Option<String>,

    /// module, script, command, dscresource or rolecapability
    #[arg(long = "kind", value_name = "KIND")]
    pub kinds: Vec<ResourceKind>,

    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,

    /// Include prerelease versions
    #[arg(long)]
    pub prerelease: bool,

    /// Also list the dependencies of every match
    #[arg(long)]
    pub include_dependencies: bool,

    /// Only search these repositories
    #[arg(long = "repository", value_name = "NAME")]
    pub repositories: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct GetArgs {
    #[arg(value_name = "NAME")]
    pub names: Vec<String>,

    #[arg(long)]
    pub version: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct InstallArgs {
    #[arg(value_name = "NAME", required = true)]
    pub names: Vec<String>,

    #[arg(long)]
    pub version: Option<String>,

    #[arg(long)]
    pub prerelease: bool,

    /// Install again even if the version is already present
    #[arg(long)]
    pub reinstall: bool,

    #[arg(long)]
    pub skip_dependencies: bool,

    /// Do not ask before installing from an untrusted repository
    #[arg(long)]
    pub trust_repository: bool,

    #[arg(long = "repository", value_name = "NAME")]
    pub repositories: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct UninstallArgs {
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Version or range to remove (the most recently installed when omitted)
    #[arg(long)]
    pub version: Option<String>,

    /// Only remove prerelease versions
    #[arg(long)]
    pub prerelease: bool,

    /// Remove even if other installed resources depend on it
    #[arg(long)]
    pub skip_dependency_check: bool,
}

#[derive(clap::Subcommand, Debug)]
enum RepoCommands {
    /// List repositories in priority order
    List,

    /// Register a repository (http(s) URL or local directory)
    Register {
        name: String,
        url: String,
        /// 0 (highest) to 50 (lowest)
        #[arg(long, default_value_t = DEFAULT_PRIORITY)]
        priority: u8,
        #[arg(long)]
        trusted: bool,
        /// Environment variable holding a bearer token
        #[arg(long, value_name = "VAR")]
        credential: Option<String>,
    },

    /// Change a registered repository
    Set {
        name: String,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        priority: Option<u8>,
        #[arg(long)]
        trusted: Option<bool>,
        #[arg(long, value_name = "VAR")]
        credential: Option<String>,
    },

    /// Remove a repository
    Unregister { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = Config::new(resget::runtime::RealRuntime, cli.install_root, cli.registry)?;

    match cli.command {
        Commands::Find(args) => {
            let request = SearchRequest {
                names: args.names,
                kinds: args.kinds,
                tags: args.tags,
                version: args.version,
                include_prerelease: args.prerelease,
                include_dependencies: args.include_dependencies,
            };
            commands::find(&config, request, &args.repositories).await?
        }
        Commands::Get(args) => commands::get(&config, &args.names, args.version.as_deref())?,
        Commands::Install(args) => {
            let options = InstallOptions {
                include_prerelease: args.prerelease,
                reinstall: args.reinstall,
                skip_dependencies: args.skip_dependencies,
                trust_repository: args.trust_repository,
                repositories: args.repositories,
            };
            commands::install(&config, &args.names, args.version, options).await?
        }
        Commands::Uninstall(args) => {
            let request = UninstallRequest {
                name: args.name,
                version: args.version,
                prerelease_only: args.prerelease,
            };
            let options = UninstallOptions {
                skip_dependency_check: args.skip_dependency_check,
            };
            commands::uninstall(&config, request, options)?
        }
        Commands::Repo(command) => match command {
            RepoCommands::List => commands::repo_list(&config)?,
            RepoCommands::Register {
                name,
                url,
                priority,
                trusted,
                credential,
            } => {
                let mut descriptor = RepositoryDescriptor::new(name, url)
                    .with_priority(priority)
                    .trusted(trusted);
                descriptor.credential = credential;
                commands::repo_register(&config, descriptor)?
            }
            RepoCommands::Set {
                name,
                url,
                priority,
                trusted,
                credential,
            } => {
                let update = RepositoryUpdate {
                    url,
                    priority,
                    trusted,
                    credential,
                };
                commands::repo_set(&config, &name, update)?
            }
            RepoCommands::Unregister { name } => commands::repo_unregister(&config, &name)?,
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_find_parsing() {
        let cli = Cli::try_parse_from([
            "resget", "find", "Az.*", "--kind", "module", "--tag", "Azure", "--prerelease",
        ])
        .unwrap();
        match cli.command {
            Commands::Find(args) => {
                assert_eq!(args.names, vec!["Az.*"]);
                assert_eq!(args.kinds, vec![ResourceKind::Module]);
                assert_eq!(args.tags, vec!["Azure"]);
                assert!(args.prerelease);
            }
            _ => panic!("Expected Find command"),
        }
    }

    #[test]
    fn test_cli_install_parsing() {
        let cli = Cli::try_parse_from([
            "resget",
            "install",
            "Pester",
            "PSReadLine",
            "--version",
            "[5.0,6.0)",
            "--trust-repository",
        ])
        .unwrap();
        match cli.command {
            Commands::Install(args) => {
                assert_eq!(args.names, vec!["Pester", "PSReadLine"]);
                assert_eq!(args.version.as_deref(), Some("[5.0,6.0)"));
                assert!(args.trust_repository);
                assert!(!args.reinstall);
            }
            _ => panic!("Expected Install command"),
        }
    }

    #[test]
    fn test_cli_install_requires_name() {
        assert!(Cli::try_parse_from(["resget", "install"]).is_err());
    }

    #[test]
    fn test_cli_global_root_parsing() {
        let cli = Cli::try_parse_from(["resget", "--root", "/tmp", "get", "-v"]).unwrap();
        assert_eq!(cli.install_root, Some(PathBuf::from("/tmp")));
        assert!(cli.verbose);
    }

    #[test]
    fn test_cli_repo_register_parsing() {
        let cli = Cli::try_parse_from([
            "resget",
            "repo",
            "register",
            "gallery",
            "https://gallery.test",
            "--priority",
            "10",
            "--trusted",
        ])
        .unwrap();
        match cli.command {
            Commands::Repo(RepoCommands::Register {
                name,
                url,
                priority,
                trusted,
                credential,
            }) => {
                assert_eq!(name, "gallery");
                assert_eq!(url, "https://gallery.test");
                assert_eq!(priority, 10);
                assert!(trusted);
                assert_eq!(credential, None);
            }
            _ => panic!("Expected repo register command"),
        }
    }

    #[test]
    fn test_cli_repo_set_parsing() {
        let cli =
            Cli::try_parse_from(["resget", "repo", "set", "gallery", "--trusted", "false"]).unwrap();
        match cli.command {
            Commands::Repo(RepoCommands::Set { name, trusted, .. }) => {
                assert_eq!(name, "gallery");
                assert_eq!(trusted, Some(false));
            }
            _ => panic!("Expected repo set command"),
        }
    }
}
