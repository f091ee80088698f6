use anyhow::Result;
use chrono::Utc;
use clap::Subcommand;
use treevu_core::{Goal, GoalStatus};

use crate::app::App;
use crate::display::soles;

#[derive(Subcommand, Debug)]
pub enum GoalCommand {
    /// Create a savings goal
    Add {
        name: String,
        #[arg(long)]
        target: f64,
        #[arg(long, default_value = "🎯")]
        icon: String,
    },

    /// Show goals and their progress
    List {
        /// Include completed and abandoned goals
        #[arg(long, default_value_t = false)]
        all: bool,
    },

    /// Put money into a goal
    Contribute { id: String, amount: f64 },

    /// Stop working on a goal
    Abandon { id: String },
}

fn status_label(status: GoalStatus) -> &'static str {
    match status {
        GoalStatus::Active => "activa",
        GoalStatus::Completed => "completada",
        GoalStatus::Abandoned => "abandonada",
    }
}

fn goal_line(g: &Goal) -> String {
    format!(
        "{} {:<20} {} / {} ({:.0}%)  {}  [{}]",
        g.icon,
        g.name,
        soles(g.current_amount),
        soles(g.target_amount),
        g.progress() * 100.0,
        status_label(g.status),
        g.id
    )
}

pub fn run(app: &mut App, cmd: GoalCommand) -> Result<()> {
    let now = Utc::now();
    match cmd {
        GoalCommand::Add { name, target, icon } => {
            let g = app.session.add_goal(&name, target, &icon, now)?;
            println!("Created {}", goal_line(&g));
        }
        GoalCommand::List { all } => {
            let goals: Vec<&Goal> = app.session.goals().iter().filter(|g| all || g.is_active()).collect();
            if goals.is_empty() {
                println!("No goals. Try: treevu goal add \"Laptop\" --target 2500");
            }
            for g in goals {
                println!("{}", goal_line(g));
            }
        }
        GoalCommand::Contribute { id, amount } => {
            let c = app.session.contribute_to_goal(&id, amount, now)?;
            let g = app.session.goal(&id)?;
            println!("Added {} to {}", soles(c.applied), g.name);
            if c.completed_now {
                println!("¡Meta completada! {}", goal_line(g));
            } else {
                println!("Faltan {}", soles(g.remaining()));
            }
        }
        GoalCommand::Abandon { id } => {
            app.session.abandon_goal(&id, now)?;
            println!("Abandoned {id}");
        }
    }
    Ok(())
}
