//! Process entry point.
//!
//! # Responsibility
//! - Load configuration, start logging, open the database and run the
//!   bootstrap seeder before anything else touches storage.
//! - Offer a read-only `lists <principal>` probe for local sanity checks.
//!
//! # Invariants
//! - Any bootstrap failure ends the process with a non-zero exit code.

use clap::{Parser, Subcommand};
use log::error;
use std::path::PathBuf;
use std::process::ExitCode;
use todo_core::{
    init_logging, init_stderr_logging, load_config, open_db, run_bootstrap, AppConfig, ListsView,
    SqliteTodoRepository, TodoService,
};

#[derive(Parser, Debug)]
#[command(name = "todo", version, about = "Multi-user to-do manager")]
struct Cli {
    /// Configuration file.
    #[arg(long, env = "TODO_CONFIG", default_value = "todo.toml", value_name = "PATH")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Migrate the database and seed roles and the admin account (default).
    Bootstrap,
    /// Bootstrap, then print the lists owned by a principal.
    Lists {
        /// Principal id as issued by the identity store.
        principal: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("event=cli_exit module=cli status=error");
            eprintln!("todo: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let config = load_config(&cli.config).map_err(|err| err.to_string())?;
    start_logging(&config)?;

    let mut conn = open_db(&config.database_path).map_err(|err| err.to_string())?;
    let report = run_bootstrap(&mut conn, &config).map_err(|err| err.to_string())?;
    println!(
        "bootstrap ok: migrations_applied={} roles_created={} admin_created={} admin_skipped={}",
        report.migrations_applied,
        report.roles_created.len(),
        report.admin_created,
        report.admin_skipped
    );

    if let Some(Commands::Lists { principal }) = cli.command {
        let repo = SqliteTodoRepository::try_new(&conn).map_err(|err| err.to_string())?;
        let service = TodoService::new(repo);
        match service
            .lists_for_principal(Some(&principal))
            .map_err(|err| err.to_string())?
        {
            ListsView::Challenge => println!("no principal given"),
            ListsView::Lists(lists) => {
                for entry in lists {
                    let done = entry.items.iter().filter(|item| item.is_completed).count();
                    println!(
                        "{}\t{}\t{}/{} done",
                        entry.list.id,
                        entry.list.title,
                        done,
                        entry.items.len()
                    );
                }
            }
        }
    }

    Ok(())
}

fn start_logging(config: &AppConfig) -> Result<(), String> {
    match config.log_dir.as_deref() {
        Some(dir) => {
            let dir = dir
                .to_str()
                .ok_or_else(|| format!("log_dir is not valid UTF-8: {}", dir.display()))?;
            init_logging(&config.log_level, dir)
        }
        None => init_stderr_logging(&config.log_level),
    }
}
