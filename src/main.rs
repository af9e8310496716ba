use anyhow::Result;
use clap::Parser;
use haxelib::{
    catalog::ENV_REMOTE,
    commands::{self, Config, Options},
    runtime::{AnswerRuntime, RealRuntime, Runtime},
    vcs::VcsKind,
};
use std::path::PathBuf;

/// haxelib - Haxe library manager
///
/// Install, activate and resolve Haxe libraries from the catalog, local
/// archives, or Git/Mercurial repositories.
///
/// The repository is the nearest `.haxelib` directory above the working
/// directory, else the global one (HAXELIB_PATH, or the path saved by `setup`).
///
/// Examples:
///   haxelib install format          # Install the latest release of format
///   haxelib git tink https://github.com/haxetink/tink_core.git
///   haxelib path format             # Print compiler arguments
#[derive(Parser, Debug)]
#[command(author, version = env!("HAXELIB_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Use the global repository even inside a local one
    #[arg(long, global = true)]
    global: bool,

    /// Answer yes to every question
    #[arg(long, short = 'y', global = true, conflicts_with = "never")]
    always: bool,

    /// Answer no to every question
    #[arg(long, global = true)]
    never: bool,

    /// Do not install dependencies
    #[arg(long = "skip-dependencies", global = true)]
    skip_dependencies: bool,

    /// Catalog server (defaults to https://lib.haxe.org)
    #[arg(long, env = ENV_REMOTE, value_name = "URL", global = true)]
    remote: Option<String>,

    /// Show debug output
    #[arg(long, global = true, conflicts_with = "quiet")]
    debug: bool,

    /// Only show errors
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Install a library from the catalog, or a local .zip archive
    Install(InstallArgs),

    /// Install a library from a Git repository
    Git(VcsArgs),

    /// Install a library from a Mercurial repository
    Hg(VcsArgs),

    /// Update one library, or all of them
    Update(UpdateArgs),

    /// Remove a library or one of its versions
    Remove(RemoveArgs),

    /// Set the current version of a library
    Set(SetArgs),

    /// Use a development directory for a library, or stop using it
    Dev(DevArgs),

    /// List installed libraries
    List(ListArgs),

    /// Print compiler arguments for libraries and their dependencies
    Path(LibrariesArgs),

    /// Print the root directory of libraries
    Libpath(LibrariesArgs),

    /// Create a local repository in the working directory
    Newrepo,

    /// Delete the local repository in the working directory
    Deleterepo,

    /// Set the global repository path
    Setup(SetupArgs),

    /// Print the repository path
    Config,

    /// Run a library's script
    Run(RunArgs),
}

#[derive(clap::Args, Debug)]
pub struct InstallArgs {
    /// Library name, or path to a .zip archive
    #[arg(value_name = "NAME|FILE")]
    pub name: String,

    /// Version to install (defaults to the latest release)
    pub version: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct VcsArgs {
    pub name: String,
    pub url: String,
    /// Branch, tag or path to check out
    pub branch: Option<String>,
    /// Subdirectory holding the library
    pub subdir: Option<String>,
    /// Revision to check out
    pub version: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct UpdateArgs {
    /// Library to update (all libraries when omitted)
    pub name: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct RemoveArgs {
    pub name: String,
    pub version: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct SetArgs {
    pub name: String,
    pub version: String,
}

#[derive(clap::Args, Debug)]
pub struct DevArgs {
    pub name: String,
    /// Development directory (clears it when omitted)
    pub path: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Only list libraries whose name contains this text
    pub filter: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct LibrariesArgs {
    /// Libraries as NAME or NAME:VERSION
    #[arg(required = true, value_name = "LIB[:VERSION]")]
    pub libraries: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct SetupArgs {
    pub path: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    #[arg(value_name = "LIB[:VERSION]")]
    pub library: String,

    /// Arguments passed to the script
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let runtime = RealRuntime;
    let code = if cli.always {
        dispatch(AnswerRuntime::new(runtime, true), cli).await?
    } else if cli.never {
        dispatch(AnswerRuntime::new(runtime, false), cli).await?
    } else {
        dispatch(runtime, cli).await?
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Run the selected command and return the process exit code.
async fn dispatch<R: Runtime>(runtime: R, cli: Cli) -> Result<i32> {
    let options = Options {
        global: cli.global,
        skip_dependencies: cli.skip_dependencies,
    };
    let config = Config::new(runtime, cli.remote, options)?;

    match cli.command {
        Commands::Install(args) => {
            commands::install(&config, &args.name, args.version.as_deref()).await?
        }
        Commands::Git(args) => install_vcs(&config, VcsKind::Git, args).await?,
        Commands::Hg(args) => install_vcs(&config, VcsKind::Mercurial, args).await?,
        Commands::Update(args) => commands::update(&config, args.name.as_deref()).await?,
        Commands::Remove(args) => {
            commands::remove(&config, &args.name, args.version.as_deref())?
        }
        Commands::Set(args) => commands::set(&config, &args.name, &args.version).await?,
        Commands::Dev(args) => commands::dev(&config, &args.name, args.path.as_deref())?,
        Commands::List(args) => commands::list(&config, args.filter.as_deref())?,
        Commands::Path(args) => commands::path(&config, &args.libraries)?,
        Commands::Libpath(args) => commands::libpath(&config, &args.libraries)?,
        Commands::Newrepo => commands::newrepo(&config)?,
        Commands::Deleterepo => commands::deleterepo(&config)?,
        Commands::Setup(args) => commands::setup(&config, args.path.as_deref())?,
        Commands::Config => commands::print_config(&config)?,
        Commands::Run(args) => {
            let (name, version) = match args.library.split_once(':') {
                Some((name, version)) => (name, Some(version)),
                None => (args.library.as_str(), None),
            };
            return commands::run(&config, name, version, &args.args);
        }
    }
    Ok(0)
}

async fn install_vcs<R: Runtime, C: haxelib::catalog::Catalog>(
    config: &Config<R, C>,
    kind: VcsKind,
    args: VcsArgs,
) -> Result<()> {
    commands::install_vcs(
        config,
        kind,
        &args.name,
        &args.url,
        args.branch.as_deref(),
        args.subdir.as_deref(),
        args.version.as_deref(),
    )
    .await
}
