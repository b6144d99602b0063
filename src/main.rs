//! turnstile CLI - gate engine for LLM coding agents.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use turnstile::cli;
use turnstile::config::{load_config, turnstile_home};
use turnstile::core::GateRegistry;
use turnstile::hooks::Host;
use turnstile::logging;

/// Version string: "0.1.0" for tagged builds, "0.1.0-dev (abc1234)" otherwise.
fn version() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("TURNSTILE_GIT_HASH");
    const IS_RELEASE: &str = env!("TURNSTILE_IS_RELEASE");

    static VERSION_STRING: std::sync::OnceLock<String> = std::sync::OnceLock::new();

    VERSION_STRING.get_or_init(|| {
        if IS_RELEASE == "true" {
            VERSION.to_string()
        } else {
            format!("{VERSION}-dev ({GIT_HASH})")
        }
    })
}

#[derive(Parser)]
#[command(name = "turnstile")]
#[command(author, version = version(), about = "Gate engine for LLM coding agents", long_about = None)]
struct Cli {
    /// Project root that scopes session state. Defaults to the host's
    /// project directory, then the current directory.
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// [Internal] Evaluate a hook payload (JSON stdin/stdout).
    Hook {
        /// Hook event (session-start, user-prompt-submit, pre-tool-use,
        /// post-tool-use, stop). Read from the payload when omitted.
        event: Option<String>,

        /// Host agent whose envelope format to emit.
        #[arg(long, value_enum, default_value = "claude")]
        host: Host,
    },

    /// [Agent] Block a session until compliance is restored.
    Block {
        /// Session ID.
        session_id: String,

        /// Why the session is blocked.
        reason: String,
    },

    /// [User] Clear a compliance block.
    Unblock {
        /// Session ID.
        session_id: String,
    },

    /// [User] List recent sessions.
    List {
        /// Maximum number of sessions to show. Defaults to 20.
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// [User] Show full session state for debugging.
    Debug {
        /// Session ID.
        session_id: String,
    },

    /// [User] Show trace events for a session.
    Trace {
        /// Session ID.
        session_id: String,

        /// Show verbose output with payloads.
        #[arg(short, long)]
        verbose: bool,
    },

    /// [User] Remove idle sessions.
    Clean {
        /// Idle duration (e.g., "7d", "30d", "24h"). Defaults to 7d.
        #[arg(long, default_value = "7d")]
        before: String,

        /// Remove all sessions, including blocked ones.
        #[arg(long)]
        all: bool,
    },

    /// [User] Validate and print the effective configuration.
    CheckConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _log_guard = logging::init(&turnstile_home());

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => return fail(&e),
    };
    let registry = match GateRegistry::new(&config) {
        Ok(registry) => registry,
        Err(e) => return fail(&e),
    };

    let project = cli.project.as_deref();
    let result = match cli.command {
        Commands::Hook { event, host } => {
            return match cli::hook::run(event.as_deref(), host, &config, &registry) {
                Ok(code) => ExitCode::from(code),
                Err(e) => fail(&e),
            };
        }
        Commands::Block { session_id, reason } => {
            cli::block::run_block(&config, project, &session_id, &reason)
        }
        Commands::Unblock { session_id } => cli::block::run_unblock(&config, project, &session_id),
        Commands::List { limit } => cli::list::run(&config, project, limit),
        Commands::Debug { session_id } => cli::debug::run(&config, project, &session_id),
        Commands::Trace {
            session_id,
            verbose,
        } => cli::trace::run(&config, project, &session_id, verbose),
        Commands::Clean { before, all } => cli::clean::run(&config, project, &before, all),
        Commands::CheckConfig => {
            cli::check_config::run(&config, &registry);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}

fn fail(e: &turnstile::Error) -> ExitCode {
    tracing::error!(error = %e, "command failed");
    eprintln!("turnstile: error: {e}");
    ExitCode::FAILURE
}
