use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};

mod app;
mod auth;
mod config;
mod display;
mod expense_cmd;
mod goal_cmd;
mod llm;
mod prompt;
mod report_cmd;
mod ruc_client;
mod setup;
mod squad_cmd;
mod state;
mod telemetry;

use app::App;
use expense_cmd::ExpenseCommand;
use goal_cmd::GoalCommand;
use report_cmd::BudgetCommand;
use squad_cmd::SquadCommand;

#[derive(Parser, Debug)]
#[command(
    name = "treevu",
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("TREEVU_BUILD_SHA"), ")"),
    about = "treevü: expense capture, rewards and savings goals"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// One-time interactive setup: name, income and budget under ~/.treevu
    Setup,

    /// Configuration file helpers
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Store AI credentials in ~/.treevu/auth.json
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },

    /// Capture and manage expenses
    Expense {
        #[command(subcommand)]
        command: ExpenseCommand,
    },

    /// Savings goals
    Goal {
        #[command(subcommand)]
        command: GoalCommand,
    },

    /// Monthly budget
    Budget {
        #[command(subcommand)]
        command: BudgetCommand,
    },

    /// Level, treevüs and financial wellness
    Stats,

    /// Estimated income-tax refund from deductible spending
    Tax {
        #[arg(long)]
        year: Option<i32>,
        /// Annual income in soles (default: [tax] annual_income)
        #[arg(long)]
        income: Option<f64>,
    },

    /// Mark a financial lesson as finished
    Learn { lesson: String },

    /// Restart from Semilla after reaching Bosque
    Prestige,

    /// Squads: kudos, shared pool and missions
    Squad {
        #[command(subcommand)]
        command: SquadCommand,
    },

    /// Show notifications (unread by default)
    Notifications {
        #[arg(long, default_value_t = false)]
        mark_read: bool,
        #[arg(long, default_value_t = false)]
        all: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write ~/.treevu/config.toml with defaults
    Init,
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    /// Paste an Anthropic token (sk-ant-...)
    PasteAnthropicToken,

    /// Paste an OpenAI API key (sk-...)
    PasteOpenaiApiKey,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Setup => setup::run_setup()?,

        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
        },

        Command::Auth { command } => match command {
            AuthCommand::PasteAnthropicToken => auth::anthropic_paste_token()?,
            AuthCommand::PasteOpenaiApiKey => auth::openai_paste_api_key()?,
        },

        command => {
            let mut app = App::open()?;
            let result = run_session_command(&mut app, command).await;
            app.finish().await;
            result?;
        }
    }

    Ok(())
}

async fn run_session_command(app: &mut App, command: Command) -> Result<()> {
    match command {
        Command::Expense { command } => expense_cmd::run(app, command).await,
        Command::Goal { command } => goal_cmd::run(app, command),
        Command::Budget { command } => report_cmd::budget(app, command),
        Command::Stats => report_cmd::stats(app),
        Command::Tax { year, income } => report_cmd::tax(app, year, income),
        Command::Learn { lesson } => {
            match app.session.complete_lesson(&lesson, Utc::now())? {
                Some(points) => println!("Lección completada: +{points} treevüs"),
                None => println!("Ya completaste esta lección."),
            }
            Ok(())
        }
        Command::Prestige => {
            let n = app.session.prestige(Utc::now())?;
            println!("¡Prestigio {n}! Vuelves a Semilla con tus treevüs intactos.");
            Ok(())
        }
        Command::Squad { command } => squad_cmd::run(app, command),
        Command::Notifications { mark_read, all } => report_cmd::notifications(app, mark_read, all),
        Command::Setup | Command::Config { .. } | Command::Auth { .. } => Ok(()),
    }
}
