use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Subcommand, ValueEnum};
use std::path::PathBuf;
use treevu_core::time::{lima_date, same_month};
use treevu_core::wizard::DivertDraft;
use treevu_core::{
    Category, EntryPath, ExpenseDraft, ReceiptType, ScanMode, WizardError, WizardEvent, WizardState, suggest_category,
};
use treevu_ledger::{CaptureFlow, ReceiptAnalyzer, export_to_path};
use treevu_scan::ImagePayload;

use crate::app::{App, Session};
use crate::display::{
    expense_row, notification_line, print_check, print_draft, print_groups, print_items, print_offer, print_reward,
    soles,
};
use crate::prompt::{confirm, prompt, prompt_default};
use crate::ruc_client::RucClient;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    /// Check the receipt first, then read it
    Verify,
    /// Read merchant, date and total
    Receipt,
    /// Read the itemised product list
    Products,
}

impl From<ModeArg> for ScanMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Verify => ScanMode::Verify,
            ModeArg::Receipt => ScanMode::Receipt,
            ModeArg::Products => ScanMode::Products,
        }
    }
}

pub fn parse_category(s: &str) -> Result<Category, String> {
    Category::parse(s).ok_or_else(|| {
        let known: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
        format!("unknown category '{s}' (one of: {})", known.join(", "))
    })
}

pub fn parse_receipt(s: &str) -> Result<ReceiptType, String> {
    ReceiptType::parse(s).ok_or_else(|| {
        let known: Vec<&str> = ReceiptType::ALL.iter().map(|r| r.as_str()).collect();
        format!("unknown receipt type '{s}' (one of: {})", known.join(", "))
    })
}

#[derive(Subcommand, Debug)]
pub enum ExpenseCommand {
    /// Record an expense by hand
    Add {
        #[arg(long)]
        merchant: Option<String>,
        #[arg(long)]
        total: f64,
        /// YYYY-MM-DD (default: today in Lima)
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, value_parser = parse_category)]
        category: Option<Category>,
        #[arg(long = "receipt", value_parser = parse_receipt, default_value = "boleta")]
        receipt_type: ReceiptType,
        /// 11-digit RUC; looked up when a registry endpoint is configured
        #[arg(long)]
        ruc: Option<String>,
        /// Paid on behalf of the employer (checked against the corporate policy)
        #[arg(long, default_value_t = false)]
        corporate: bool,
    },

    /// Scan a receipt image with the AI collaborator
    Scan {
        image: PathBuf,
        #[arg(long, value_enum, default_value = "receipt")]
        mode: ModeArg,
        /// Accept suggestions without asking
        #[arg(long, default_value_t = false)]
        yes: bool,
        /// Ask for a split by category when reading products
        #[arg(long, default_value_t = false)]
        split: bool,
    },

    /// Record a purchase you skipped, optionally funding a goal
    Divert {
        description: String,
        amount: f64,
        #[arg(long)]
        goal: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// List expenses, newest first
    List {
        /// YYYY-MM
        #[arg(long)]
        month: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Change fields of a saved expense
    Edit {
        id: String,
        #[arg(long)]
        merchant: Option<String>,
        #[arg(long)]
        total: Option<f64>,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, value_parser = parse_category)]
        category: Option<Category>,
        #[arg(long = "receipt", value_parser = parse_receipt)]
        receipt_type: Option<ReceiptType>,
        #[arg(long)]
        ruc: Option<String>,
        /// Override the formality derived from the receipt type
        #[arg(long)]
        formal: Option<bool>,
    },

    /// Delete a saved expense
    Delete { id: String },

    /// Write every expense to a CSV file
    Export {
        #[arg(long, default_value = "treevu-expenses.csv")]
        out: PathBuf,
    },
}

pub async fn run(app: &mut App, cmd: ExpenseCommand) -> Result<()> {
    match cmd {
        ExpenseCommand::Add {
            merchant,
            total,
            date,
            category,
            receipt_type,
            ruc,
            corporate,
        } => {
            let now = Utc::now();
            let merchant = merchant.unwrap_or_default();
            let mut draft = ExpenseDraft::new(merchant.clone(), total, date.unwrap_or_else(|| lima_date(now)))
                .with_receipt(receipt_type)
                .with_category(category.or_else(|| suggest_category(&merchant)).unwrap_or(Category::Other));
            if let Some(ruc) = ruc {
                draft = draft.with_ruc(ruc);
            }
            if corporate {
                draft = draft.corporate();
            }
            add(app, draft, now).await
        }
        ExpenseCommand::Scan { image, mode, yes, split } => scan(app, image, mode.into(), yes, split).await,
        ExpenseCommand::Divert {
            description,
            amount,
            goal,
            date,
        } => divert(app, description, amount, goal, date).await,
        ExpenseCommand::List { month, limit } => list(&app.session, month, limit),
        ExpenseCommand::Edit {
            id,
            merchant,
            total,
            date,
            category,
            receipt_type,
            ruc,
            formal,
        } => {
            let current = app
                .session
                .expense(&id)
                .with_context(|| format!("no expense with id {id}"))?;
            let mut draft = current.to_draft();
            if let Some(m) = merchant {
                draft.merchant_name = m;
            }
            if let Some(t) = total {
                draft.total = t;
            }
            if let Some(d) = date {
                draft.date = d;
            }
            if let Some(c) = category {
                draft.category = c;
            }
            if let Some(r) = receipt_type {
                draft.receipt_type = r;
            }
            if let Some(r) = ruc {
                draft.ruc = Some(r).filter(|s| !s.trim().is_empty());
            }
            if formal.is_some() {
                draft.is_formal = formal;
            }
            let e = app.session.edit_expense(&id, draft, Utc::now())?;
            println!("Updated {}", expense_row(e));
            Ok(())
        }
        ExpenseCommand::Delete { id } => {
            let removed = app.session.delete_expense(&id, Utc::now())?;
            println!("Deleted {} ({})", removed.id, soles(removed.total));
            Ok(())
        }
        ExpenseCommand::Export { out } => {
            let n = export_to_path(app.session.expenses(), &out)?;
            println!("Exported {n} expenses to {}", out.display());
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct DriveOpts {
    /// Non-interactive: accept suggestions, fail instead of asking
    yes: bool,
    split: bool,
    lookup_ruc: bool,
}

async fn add(app: &mut App, draft: ExpenseDraft, now: DateTime<Utc>) -> Result<()> {
    let analyzer = app.analyzer()?;
    let registry = app.registry()?;
    let opts = DriveOpts {
        yes: true,
        split: false,
        lookup_ruc: registry.is_configured(),
    };
    let mut flow = CaptureFlow::new(&analyzer, &registry, lima_date(now));
    flow.apply(WizardEvent::Start(EntryPath::Manual))?;
    flow.apply(WizardEvent::EditDraft(draft))?;
    drive(&mut flow, &mut app.session, opts, now).await
}

async fn scan(app: &mut App, image: PathBuf, mode: ScanMode, yes: bool, split: bool) -> Result<()> {
    let bytes = std::fs::read(&image).with_context(|| format!("read {}", image.display()))?;
    let now = Utc::now();
    let analyzer = app.analyzer()?;
    let registry = app.registry()?;
    let opts = DriveOpts {
        yes,
        split,
        lookup_ruc: registry.is_configured(),
    };

    println!("Analizando {}…", image.display());
    let mut flow = CaptureFlow::new(&analyzer, &registry, lima_date(now));
    flow.upload(mode, ImagePayload::from_bytes(&bytes)).await?;
    drive(&mut flow, &mut app.session, opts, now).await
}

async fn divert(
    app: &mut App,
    description: String,
    amount: f64,
    goal: Option<String>,
    date: Option<NaiveDate>,
) -> Result<()> {
    let now = Utc::now();
    let analyzer = app.analyzer()?;
    let registry = app.registry()?;
    let mut flow = CaptureFlow::new(&analyzer, &registry, lima_date(now));

    let mut draft = DivertDraft::new(date.unwrap_or_else(|| lima_date(now)));
    draft.description = description;
    draft.amount = amount;
    draft.goal_id = goal;

    flow.apply(WizardEvent::Start(EntryPath::Divert))?;
    flow.apply(WizardEvent::EditDivert(draft))?;
    flow.apply(WizardEvent::Submit)?;
    let opts = DriveOpts {
        yes: true,
        split: false,
        lookup_ruc: false,
    };
    drive(&mut flow, &mut app.session, opts, now).await
}

/// Walk the wizard to a closed state, asking the user where a step needs input.
async fn drive<A: ReceiptAnalyzer>(
    flow: &mut CaptureFlow<'_, A, RucClient>,
    session: &mut Session,
    opts: DriveOpts,
    started: DateTime<Utc>,
) -> Result<()> {
    let mut split_tried = false;
    let mut ruc_checked: Option<String> = None;

    loop {
        match flow.state().clone() {
            WizardState::VerificationResult { check } => {
                print_check(&check);
                flow.proceed().await?;
            }
            WizardState::QuickConfirm { draft, confidence } => {
                println!("Leímos tu comprobante (confianza {:.0}%):", confidence * 100.0);
                print_draft(&draft);
                if opts.yes || confirm("¿Guardar este gasto?", true)? {
                    flow.apply(WizardEvent::Submit)?;
                } else {
                    flow.apply(WizardEvent::EditFull)?;
                }
            }
            WizardState::ManualEntry { draft } | WizardState::Review { draft } => {
                let draft = if opts.yes { draft } else { edit_draft(&draft)? };
                flow.apply(WizardEvent::EditDraft(draft.clone()))?;

                if opts.lookup_ruc && draft.ruc.is_some() && ruc_checked != draft.ruc {
                    ruc_checked = draft.ruc.clone();
                    if let Err(e) = flow.resolve_ruc().await {
                        if opts.yes {
                            return Err(e);
                        }
                        println!("{e}");
                        continue;
                    }
                    // A failed lookup moved the wizard to the error step
                    if !matches!(flow.state(), WizardState::ManualEntry { .. } | WizardState::Review { .. }) {
                        continue;
                    }
                }
                submit(flow, opts)?;
            }
            WizardState::ReviewProducts { base, items } => {
                println!("Productos detectados en {}:", display_merchant(&base));
                print_items(&items);
                if opts.split && !split_tried {
                    split_tried = true;
                    flow.request_split().await?;
                    continue;
                }
                if !opts.yes && base.merchant_name.trim().is_empty() {
                    let mut base = base.clone();
                    base.merchant_name = prompt("Comercio")?;
                    flow.apply(WizardEvent::EditDraft(base))?;
                }
                submit(flow, opts)?;
            }
            WizardState::SuggestSplit { groups, .. } => {
                println!("Sugerencia: dividir en {} gastos", groups.len());
                print_groups(&groups);
                if opts.yes || confirm("¿Aceptar la división?", true)? {
                    flow.apply(WizardEvent::AcceptSplit)?;
                } else {
                    flow.apply(WizardEvent::RejectSplit)?;
                }
            }
            WizardState::Saving { .. } => {
                flow.commit(session, Utc::now())?;
            }
            WizardState::SaveSuccess { saved_ids, reward, .. } => {
                println!("¡Guardado! ({})", saved_ids.join(", "));
                if reward.total() > 0 {
                    print_reward(&reward);
                }
                for n in session.notifications().unread().filter(|n| n.created_at >= started) {
                    println!("{}", notification_line(n));
                }
                flow.proceed().await?;
            }
            WizardState::SavingOpportunity { offer } => {
                print_offer(&offer);
                if !opts.yes && confirm("¿Apartar ahora?", false)? {
                    let goal_id = pick_goal(session, &offer.goal_ids)?;
                    let c = session.contribute_to_goal(&goal_id, offer.suggested_amount, Utc::now())?;
                    println!("Apartaste {}.", soles(c.applied));
                }
                flow.proceed().await?;
            }
            WizardState::Error { message, return_to } => {
                let can_retry = !matches!(*return_to, WizardState::Capture | WizardState::Initializing);
                if can_retry && !opts.yes {
                    println!("{message}");
                    if confirm("¿Volver al formulario e intentarlo de nuevo?", true)? {
                        ruc_checked = None;
                        flow.apply(WizardEvent::Dismiss)?;
                        continue;
                    }
                }
                flow.apply(WizardEvent::Close)?;
                bail!("{message}");
            }
            WizardState::Closed => return Ok(()),
            other => bail!("unexpected capture step: {}", other.name()),
        }
    }
}

/// Submit the current form. Interactive runs stay on the step after a validation error.
fn submit<A: ReceiptAnalyzer>(flow: &mut CaptureFlow<'_, A, RucClient>, opts: DriveOpts) -> Result<()> {
    match flow.apply(WizardEvent::Submit) {
        Ok(_) => Ok(()),
        Err(WizardError::Validation(e)) if !opts.yes => {
            println!("{e}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn display_merchant(d: &ExpenseDraft) -> &str {
    if d.merchant_name.trim().is_empty() { "(sin comercio)" } else { d.merchant_name.trim() }
}

fn edit_draft(draft: &ExpenseDraft) -> Result<ExpenseDraft> {
    println!("Revisa los datos (Enter para mantener):");
    let mut d = draft.clone();

    d.merchant_name = prompt_default("Comercio", d.merchant_name.trim())?;
    loop {
        let current = if d.total > 0.0 { format!("{:.2}", d.total) } else { String::new() };
        match prompt_default("Total (S/)", &current)?.replace(',', ".").parse::<f64>() {
            Ok(t) => {
                d.total = t;
                break;
            }
            Err(_) => println!("Ingresa un monto, por ejemplo 24.90"),
        }
    }
    loop {
        let answer = prompt_default("Fecha (AAAA-MM-DD)", &d.date.to_string())?;
        match answer.parse::<NaiveDate>() {
            Ok(date) => {
                d.date = date;
                break;
            }
            Err(_) => println!("Fecha inválida"),
        }
    }
    loop {
        match parse_category(&prompt_default("Categoría", d.category.as_str())?) {
            Ok(c) => {
                d.category = c;
                break;
            }
            Err(e) => println!("{e}"),
        }
    }
    loop {
        match parse_receipt(&prompt_default("Comprobante", d.receipt_type.as_str())?) {
            Ok(r) => {
                if r != d.receipt_type {
                    d.is_formal = None;
                }
                d.receipt_type = r;
                break;
            }
            Err(e) => println!("{e}"),
        }
    }
    let ruc = prompt_default("RUC (opcional)", d.ruc.as_deref().unwrap_or(""))?;
    d.ruc = Some(ruc).filter(|s| !s.trim().is_empty());
    Ok(d)
}

fn pick_goal(session: &Session, goal_ids: &[String]) -> Result<String> {
    if let [only] = goal_ids {
        return Ok(only.clone());
    }
    for (i, id) in goal_ids.iter().enumerate() {
        let name = session.goal(id).map(|g| g.name.clone()).unwrap_or_default();
        println!("  {}. {name} ({id})", i + 1);
    }
    loop {
        let answer = prompt("Meta")?;
        match answer.parse::<usize>() {
            Ok(n) if (1..=goal_ids.len()).contains(&n) => return Ok(goal_ids[n - 1].clone()),
            _ => println!("Elige un número de la lista"),
        }
    }
}

fn parse_month(month: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d")
        .with_context(|| format!("invalid month '{month}' (expected YYYY-MM)"))
}

fn list(session: &Session, month: Option<String>, limit: usize) -> Result<()> {
    let month = month.as_deref().map(parse_month).transpose()?;
    let mut rows: Vec<_> = session
        .expenses()
        .iter()
        .filter(|e| month.is_none_or(|m| same_month(e.date, m)))
        .collect();
    rows.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));

    if rows.is_empty() {
        println!("No expenses yet. Try: treevu expense add --merchant Tottus --total 25");
        return Ok(());
    }
    let total: f64 = rows.iter().map(|e| e.total).sum();
    for e in rows.iter().take(limit) {
        println!("{}", expense_row(e));
    }
    println!("\n{} expenses, {}", rows.len(), soles(total));
    Ok(())
}
