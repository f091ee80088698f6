//! Read-mostly views: budget, dashboard stats, tax estimate and notifications.

use anyhow::{Result, bail};
use chrono::{Datelike, Utc};
use clap::Subcommand;
use treevu_core::levels::threshold;
use treevu_core::metrics::spend_by_category;
use treevu_core::time::{lima_today, same_month};
use treevu_core::{BudgetStatus, Trend};

use crate::app::App;
use crate::display::{notification_line, soles};

#[derive(Subcommand, Debug)]
pub enum BudgetCommand {
    /// Set the monthly spending limit
    Set { amount: f64 },
    /// Spending against the limit this month
    Show,
}

fn status_label(status: BudgetStatus) -> &'static str {
    match status {
        BudgetStatus::Unset => "sin presupuesto",
        BudgetStatus::OnTrack => "en curso",
        BudgetStatus::NearLimit => "cerca del límite",
        BudgetStatus::Exceeded => "excedido",
    }
}

pub fn budget(app: &mut App, cmd: BudgetCommand) -> Result<()> {
    match cmd {
        BudgetCommand::Set { amount } => {
            let b = app.session.set_budget(amount)?;
            println!(
                "Monthly budget set to {} (alert at {:.0}%)",
                soles(b.monthly_limit),
                b.alert_threshold * 100.0
            );
        }
        BudgetCommand::Show => {
            let now = Utc::now();
            let b = app.session.budget();
            if !b.is_set() {
                println!("No budget yet. Try: treevu budget set 1500");
                return Ok(());
            }
            let today = lima_today();
            let spent = b.spent_in_month(app.session.expenses(), today);
            println!("Presupuesto {}: {}", today.format("%Y-%m"), soles(b.monthly_limit));
            println!("Gastado:     {}", soles(spent));
            println!("Disponible:  {}", soles(b.remaining(app.session.expenses(), today)));
            println!("Estado:      {}", status_label(app.session.budget_status(now)));
        }
    }
    Ok(())
}

pub fn stats(app: &App) -> Result<()> {
    let now = Utc::now();
    let m = app.session.metrics(now);
    let p = app.session.progress();

    println!("# {} · {}", app.session.display_name(), p.level.name());
    println!("Treevüs:          {}", p.balance);
    println!("Racha:            {} días", p.streak.count);
    if p.prestige > 0 {
        println!("Prestigio:        {}", p.prestige);
    }
    match p.to_next_level() {
        Some((next, missing_expenses, missing_formality)) => println!(
            "Siguiente nivel:  {} (faltan {} gastos, {:.0} pts de formalidad)",
            next.name(),
            missing_expenses,
            missing_formality
        ),
        None => println!("Nivel máximo alcanzado; prueba: treevu prestige"),
    }
    println!("Beneficios:       {}", threshold(p.level).benefits.join(", "));

    println!("\n## Finanzas");
    println!("Gastos:           {}", m.expense_count);
    println!("Total gastado:    {}", soles(m.total_spent));
    println!("IGV pagado:       {}", soles(m.total_igv));
    println!("Ahorro perdido:   {}", soles(m.total_lost_savings));
    println!("Formalidad:       {:.1}%", m.formality_index);
    println!(
        "Bienestar:        {:.1} (formalidad {:.1}, balance {:.1}, desarrollo {:.1})",
        m.wellness.score, m.wellness.formality, m.wellness.balance, m.wellness.development
    );
    let trend = match m.trend {
        Trend::Improving => "mejorando",
        Trend::Stable => "estable",
        Trend::Declining => "bajando",
    };
    println!("Tendencia:        {trend}");

    let today = lima_today();
    let this_month: Vec<_> = app
        .session
        .expenses()
        .iter()
        .filter(|e| same_month(e.date, today))
        .cloned()
        .collect();
    if !this_month.is_empty() {
        println!("\n## Este mes por categoría");
        for (cat, total) in spend_by_category(&this_month) {
            println!("  {:<16} {:>12}", cat.label(), soles(total));
        }
    }
    Ok(())
}

pub fn tax(app: &App, year: Option<i32>, income: Option<f64>) -> Result<()> {
    let year = year.unwrap_or_else(|| lima_today().year());
    let Some(income) = income.or(app.config.tax.annual_income) else {
        bail!("annual income unknown; pass --income or set [tax] annual_income in config.toml");
    };
    let table = app.config.tax.table();
    let est = app.session.tax_estimate(year, income, &table);

    println!("Estimado de devolución {year}");
    println!("Gasto deducible:   {}", soles(est.deductible_spend));
    println!("Deducción (3%):    {}", soles(est.deductible));
    println!("Ingreso anual:     {}", soles(income));
    println!("Tasa marginal:     {:.0}%", est.marginal_rate * 100.0);
    println!("Devolución aprox.: {}", soles(est.estimated_refund));
    Ok(())
}

pub fn notifications(app: &mut App, mark_read: bool, all: bool) -> Result<()> {
    let inbox = app.session.notifications();
    let shown: Vec<String> = if all {
        inbox.all().iter().rev().map(notification_line).collect()
    } else {
        let mut unread: Vec<_> = inbox.unread().collect();
        unread.reverse();
        unread.into_iter().map(notification_line).collect()
    };
    if shown.is_empty() {
        println!("Nothing new.");
    }
    for line in shown {
        println!("{line}");
    }
    if mark_read {
        let n = app.session.mark_notifications_read()?;
        println!("Marked {n} as read.");
    }
    Ok(())
}
