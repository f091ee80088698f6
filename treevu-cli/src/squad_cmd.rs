use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Subcommand, ValueEnum};
use treevu_core::{MissionMetric, Tribe};

use crate::app::App;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MetricArg {
    FormalExpenses,
    KudosSent,
    LessonsCompleted,
}

impl From<MetricArg> for MissionMetric {
    fn from(m: MetricArg) -> Self {
        match m {
            MetricArg::FormalExpenses => MissionMetric::FormalExpenses,
            MetricArg::KudosSent => MissionMetric::KudosSent,
            MetricArg::LessonsCompleted => MissionMetric::LessonsCompleted,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum SquadCommand {
    /// Start a squad with you plus other members
    Create {
        name: String,
        /// Member as user_id:Name (repeatable)
        #[arg(long = "member", value_parser = parse_member)]
        members: Vec<(String, String)>,
    },

    /// Squads you belong to
    List,

    /// Cheer a squad member (+5 treevüs for you)
    Kudos {
        squad: String,
        to: String,
        #[arg(long, default_value = "¡Bien hecho!")]
        message: String,
    },

    /// Move treevüs into the squad pool
    Contribute { squad: String, amount: u64 },

    /// Add a shared mission
    Mission {
        squad: String,
        title: String,
        #[arg(long, value_enum)]
        metric: MetricArg,
        #[arg(long)]
        target: u32,
    },

    /// Members, pool and mission progress
    Progress { squad: String },
}

fn parse_member(s: &str) -> Result<(String, String), String> {
    let (id, name) = s.split_once(':').ok_or_else(|| format!("expected user_id:Name, got '{s}'"))?;
    let (id, name) = (id.trim(), name.trim());
    if id.is_empty() || name.is_empty() {
        return Err(format!("expected user_id:Name, got '{s}'"));
    }
    Ok((id.to_string(), name.to_string()))
}

fn metric_label(m: MissionMetric) -> &'static str {
    match m {
        MissionMetric::FormalExpenses => "gastos formales",
        MissionMetric::KudosSent => "kudos enviados",
        MissionMetric::LessonsCompleted => "lecciones",
    }
}

fn print_progress(t: &Tribe) {
    println!("# {} [{}]", t.name, t.id);
    println!("Pozo: {} treevüs", t.pool);
    println!("\nMiembros:");
    for m in &t.members {
        println!("  {:<20} {:>6} treevüs  {} kudos", m.name, m.balance, m.kudos_received);
    }
    if !t.missions.is_empty() {
        println!("\nMisiones:");
        for m in &t.missions {
            let mark = if m.completed { "✓" } else { " " };
            println!(
                "  [{mark}] {:<28} {}/{} {}",
                m.title,
                m.progress,
                m.target,
                metric_label(m.metric)
            );
        }
    }
}

pub fn run(app: &mut App, cmd: SquadCommand) -> Result<()> {
    let now = Utc::now();
    match cmd {
        SquadCommand::Create { name, members } => {
            let t = app.session.create_tribe(&name, &members, now)?;
            println!("Created squad {} ({}) with {} members", t.name, t.id, t.members.len());
        }
        SquadCommand::List => {
            if app.session.tribes().is_empty() {
                println!("No squads. Try: treevu squad create \"Los Ahorradores\" --member luis:Luis");
            }
            for t in app.session.tribes() {
                println!("{:<24} {:<28} {} members, pool {}", t.id, t.name, t.members.len(), t.pool);
            }
        }
        SquadCommand::Kudos { squad, to, message } => {
            let balance = app.session.send_kudos(&squad, &to, &message, now)?;
            println!("Kudos sent to {to}. Balance: {balance} treevüs");
        }
        SquadCommand::Contribute { squad, amount } => {
            let balance = app.session.contribute_to_pool(&squad, amount, now)?;
            let pool = app.session.tribe(&squad)?.pool;
            println!("Contributed {amount}. Balance: {balance} treevüs, pool: {pool}");
        }
        SquadCommand::Mission {
            squad,
            title,
            metric,
            target,
        } => {
            let m = app
                .session
                .add_mission(&squad, &title, metric.into(), target, now)
                .with_context(|| format!("add mission to {squad}"))?;
            println!("Mission {} added: {} ({} {})", m.id, m.title, m.target, metric_label(m.metric));
        }
        SquadCommand::Progress { squad } => print_progress(app.session.tribe(&squad)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_arg() {
        assert_eq!(parse_member("luis:Luis Rojas"), Ok(("luis".to_string(), "Luis Rojas".to_string())));
        assert!(parse_member("luis").is_err());
        assert!(parse_member(":Luis").is_err());
    }
}
