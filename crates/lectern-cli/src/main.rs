mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{Context, GlobalOpts, EXIT_FAILURE};
use lectern_core::install_signal_handler;
use lectern_profile::ServiceRole;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "lectern",
    version,
    about = "Install and maintain a Lectern e-book server with Docker or Podman"
)]
struct Cli {
    /// Deployment root (holds deploy/, .env, data/ and lectern.toml).
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Compose file to use instead of the platform default.
    #[arg(long, global = true)]
    profile: Option<PathBuf>,

    /// Answer every prompt with its default.
    #[arg(short, long, default_value_t = false, global = true)]
    yes: bool,

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
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the full installation workflow.
    Install,
    /// Install a TTS or OCR sidecar.
    Sidecar {
        /// Sidecar role: tts or ocr.
        role: ServiceRole,
        /// Model to download after start (indextts2, cosyvoice, multitts, paddleocr).
        #[arg(long)]
        model: Option<String>,
    },
    /// Save images to <root>/docker-images/lectern-<role>.tar.gz.
    Export {
        /// Roles to export (default: all).
        roles: Vec<ServiceRole>,
    },
    /// Load image archives (default: every archive in the export directory).
    Import { archives: Vec<PathBuf> },
    /// Remove images and the containers created from them.
    Delete {
        /// Roles to delete (default: frontend and backend).
        roles: Vec<ServiceRole>,
    },
    /// Run a provisioning step inside the backend container.
    Provision {
        #[arg(value_enum)]
        task: commands::provision::Task,
    },
    /// Show images, containers and URLs.
    Status,
    /// Run diagnostic checks on the host and deployment root.
    Doctor,
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
            tracing_subscriber::EnvFilter::try_from_env("LECTERN_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Some(Commands::Completions { shell }) => commands::docs::completions::<Cli>(*shell),
        Some(Commands::ManPages { dir }) => commands::docs::man_pages::<Cli>(dir),
        _ => run_with_context(&cli),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn run_with_context(cli: &Cli) -> Result<u8, String> {
    install_signal_handler();
    let ctx = Context::new(&GlobalOpts {
        root: cli.root.clone(),
        profile: cli.profile.clone(),
        yes: cli.yes,
        json: cli.json,
    })?;

    match &cli.command {
        None => commands::menu::run(&ctx),
        Some(Commands::Install) => commands::install::run(&ctx),
        Some(Commands::Sidecar { role, model }) => {
            commands::sidecar::run(&ctx, *role, model.as_deref())
        }
        Some(Commands::Export { roles }) => commands::export::run(&ctx, roles),
        Some(Commands::Import { archives }) => commands::import::run(&ctx, archives),
        Some(Commands::Delete { roles }) => commands::delete::run(&ctx, roles),
        Some(Commands::Provision { task }) => commands::provision::run(&ctx, *task),
        Some(Commands::Status) => commands::status::run(&ctx),
        Some(Commands::Doctor) => commands::doctor::run(&ctx),
        Some(Commands::Completions { .. } | Commands::ManPages { .. }) => {
            Err("documentation commands run without a deployment context".to_owned())
        }
    }
}
