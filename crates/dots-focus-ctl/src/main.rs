use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod rule_file;

#[derive(Parser)]
#[command(name = "dots-focus-ctl")]
#[command(about = "DOTS Focus Mode CLI control tool", long_about = None)]
struct Cli {
    #[arg(long, global = true, help = "Talk to a daemon on the system bus")]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Rule {
        #[command(subcommand)]
        action: RuleAction,
    },

    App {
        #[command(subcommand)]
        action: AppAction,
    },

    /// Submit a notification as if the package had posted it
    Notify {
        package_id: String,
        title: String,
        #[arg(default_value = "")]
        content: String,
    },

    /// List pending report alarms
    Scheduled,
}

#[derive(Subcommand)]
enum RuleAction {
    /// Validate a rule file without contacting the daemon
    Validate { file: PathBuf },
    /// Evaluate a rule file without contacting the daemon
    Check {
        file: PathBuf,
        #[arg(long, help = "RFC 3339 instant to evaluate at, defaults to now")]
        at: Option<String>,
    },
    Put { file: PathBuf },
    Delete { rule_id: String },
}

#[derive(Subcommand)]
enum AppAction {
    Manage { package_id: String, rule_id: String },
    Unmanage { package_id: String },
    Blocked { package_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let system = cli.system;

    match cli.command {
        Commands::Rule { action } => match action {
            RuleAction::Validate { file } => commands::rule::validate(&file)?,
            RuleAction::Check { file, at } => commands::rule::check(&file, at.as_deref())?,
            RuleAction::Put { file } => commands::rule::put(system, &file).await?,
            RuleAction::Delete { rule_id } => commands::rule::delete(system, &rule_id).await?,
        },
        Commands::App { action } => match action {
            AppAction::Manage { package_id, rule_id } => {
                commands::app::manage(system, &package_id, &rule_id).await?
            }
            AppAction::Unmanage { package_id } => {
                commands::app::unmanage(system, &package_id).await?
            }
            AppAction::Blocked { package_id } => commands::app::blocked(system, &package_id).await?,
        },
        Commands::Notify { package_id, title, content } => {
            commands::notify::submit(system, &package_id, &title, &content).await?
        }
        Commands::Scheduled => commands::scheduled::list(system).await?,
    }

    Ok(())
}
