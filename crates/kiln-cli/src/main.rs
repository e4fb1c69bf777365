mod commands;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_FAILURE, EXIT_NOT_FOUND, EXIT_REQUEST_ERROR};
use kiln_core::Composer;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "kiln",
    version,
    about = "Deterministic OS image manifest compiler"
)]
struct Cli {
    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Image selection and per-request inputs shared by the compile commands.
#[derive(Debug, Args)]
pub struct RequestArgs {
    /// Distribution name (e.g. rhel-87).
    distro: String,
    /// Architecture name (e.g. x86_64).
    arch: String,
    /// Image type name or alias (e.g. qcow2, rhel-edge-commit).
    image_type: String,
    /// Blueprint TOML file.
    #[arg(long)]
    blueprint: Option<PathBuf>,
    /// Image options JSON file (size, ostree).
    #[arg(long)]
    options: Option<PathBuf>,
    /// Repositories JSON file.
    #[arg(long)]
    repos: Option<PathBuf>,
    /// Seed for generated partition and filesystem UUIDs.
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List supported distributions.
    Distros,
    /// List architectures of a distribution.
    Arches {
        distro: String,
    },
    /// List image types of an architecture, with their aliases.
    ImageTypes {
        distro: String,
        arch: String,
    },
    /// Emit the depsolve job for a request.
    Packages {
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Compile a manifest from a depsolve result.
    Manifest {
        #[command(flatten)]
        request: RequestArgs,
        /// Depsolve result JSON file.
        #[arg(long)]
        depsolved: PathBuf,
        /// Write the build request JSON to this file.
        #[arg(long)]
        build_request: Option<PathBuf>,
    },
    /// Resolve, depsolve and compile a manifest in one step.
    Compose {
        #[command(flatten)]
        request: RequestArgs,
        /// Resolve packages with the deterministic in-process mock solver.
        #[arg(long, default_value_t = false)]
        mock_depsolve: bool,
        /// Write the build request JSON to this file.
        #[arg(long)]
        build_request: Option<PathBuf>,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("KILN_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let json_output = cli.json;
    let result = match cli.command {
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
        command => match Composer::with_default_catalog() {
            Ok(composer) => run_with_catalog(&composer, command, json_output),
            Err(e) => Err(format!("catalog error: {e}")),
        },
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with(commands::INVALID_REQUEST) {
                EXIT_REQUEST_ERROR
            } else if msg.starts_with(commands::NOT_FOUND) {
                EXIT_NOT_FOUND
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

fn run_with_catalog(composer: &Composer, command: Commands, json: bool) -> Result<u8, String> {
    match command {
        Commands::Distros => commands::list::distros(composer, json),
        Commands::Arches { distro } => commands::list::arches(composer, &distro, json),
        Commands::ImageTypes { distro, arch } => {
            commands::list::image_types(composer, &distro, &arch, json)
        }
        Commands::Packages { request } => commands::packages::run(composer, &request),
        Commands::Manifest {
            request,
            depsolved,
            build_request,
        } => commands::manifest::run(composer, &request, &depsolved, build_request.as_deref()),
        Commands::Compose {
            request,
            mock_depsolve,
            build_request,
        } => commands::compose::run(
            composer,
            &request,
            mock_depsolve,
            build_request.as_deref(),
            json,
        ),
        Commands::Completions { .. } | Commands::ManPages { .. } => {
            unreachable!("handled before the catalog is built")
        }
    }
}
