//! Derived financial metrics.
//!
//! Everything here is a full scan of the expense list; nothing is cached or
//! updated incrementally.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::expense::{round2, Category, Expense};

pub const WEIGHT_FORMALITY: f64 = 0.5;
pub const WEIGHT_BALANCE: f64 = 0.3;
pub const WEIGHT_DEVELOPMENT: f64 = 0.2;
/// Share of total spending on self-development that earns a full sub-score
pub const DEVELOPMENT_TARGET_SHARE: f64 = 0.10;
/// Dead zone around zero for trend classification, in index points
pub const TREND_DEAD_ZONE: f64 = 2.0;
pub const TREND_WINDOW_DAYS: i64 = 30;

pub fn total_spent(expenses: &[Expense]) -> f64 {
    expenses.iter().map(|e| e.total).sum()
}

pub fn total_lost_savings(expenses: &[Expense]) -> f64 {
    round2(expenses.iter().map(|e| e.lost_savings).sum())
}

pub fn total_igv(expenses: &[Expense]) -> f64 {
    round2(expenses.iter().map(|e| e.igv).sum())
}

/// Amount-weighted share of formal spending, 0 - 100.
pub fn formality_index(expenses: &[Expense]) -> f64 {
    let total = total_spent(expenses);
    if total <= 0.0 {
        return 0.0;
    }
    let formal: f64 = expenses.iter().filter(|e| e.is_formal).map(|e| e.total).sum();
    (formal / total * 100.0).clamp(0.0, 100.0)
}

pub fn spend_by_category(expenses: &[Expense]) -> BTreeMap<Category, f64> {
    let mut out = BTreeMap::new();
    for e in expenses {
        *out.entry(e.category).or_insert(0.0) += e.total;
    }
    out
}

/// Sub-scores and composite of the financial wellness index
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WellnessBreakdown {
    /// 0 - 1
    pub formality: f64,
    /// essential / leisure, capped at 1
    pub balance: f64,
    /// education share against target, capped at 1
    pub development: f64,
    /// 0 - 100
    pub score: f64,
}

pub fn wellness(expenses: &[Expense]) -> WellnessBreakdown {
    let total = total_spent(expenses);
    let formality = formality_index(expenses) / 100.0;

    let essential: f64 = expenses.iter().filter(|e| e.category.is_essential()).map(|e| e.total).sum();
    let leisure: f64 = expenses.iter().filter(|e| e.category.is_discretionary()).map(|e| e.total).sum();
    let balance = if leisure <= 0.0 { 1.0 } else { (essential / leisure).min(1.0) };

    let development = if total <= 0.0 {
        0.0
    } else {
        let education: f64 = expenses
            .iter()
            .filter(|e| e.category.is_self_development())
            .map(|e| e.total)
            .sum();
        (education / (total * DEVELOPMENT_TARGET_SHARE)).min(1.0)
    };

    let score = 100.0
        * (WEIGHT_FORMALITY * formality + WEIGHT_BALANCE * balance + WEIGHT_DEVELOPMENT * development);

    WellnessBreakdown { formality, balance, development, score }
}

pub fn wellness_index(expenses: &[Expense]) -> f64 {
    wellness(expenses).score
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

/// Compare the trailing 30 days (ending `today`) with the 30 days before.
pub fn trend(expenses: &[Expense], today: NaiveDate) -> Trend {
    let window = Duration::days(TREND_WINDOW_DAYS);
    let recent_start = today - window + Duration::days(1);
    let prior_start = recent_start - window;

    let recent: Vec<Expense> = expenses
        .iter()
        .filter(|e| e.date >= recent_start && e.date <= today)
        .cloned()
        .collect();
    let prior: Vec<Expense> = expenses
        .iter()
        .filter(|e| e.date >= prior_start && e.date < recent_start)
        .cloned()
        .collect();

    let delta = wellness_index(&recent) - wellness_index(&prior);
    if delta > TREND_DEAD_ZONE {
        Trend::Improving
    } else if delta < -TREND_DEAD_ZONE {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

/// Snapshot shown on the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub expense_count: usize,
    pub total_spent: f64,
    pub total_lost_savings: f64,
    pub total_igv: f64,
    pub formality_index: f64,
    pub wellness: WellnessBreakdown,
    pub trend: Trend,
}

pub fn snapshot(expenses: &[Expense], today: NaiveDate) -> MetricsSnapshot {
    MetricsSnapshot {
        expense_count: expenses.len(),
        total_spent: round2(total_spent(expenses)),
        total_lost_savings: total_lost_savings(expenses),
        total_igv: total_igv(expenses),
        formality_index: formality_index(expenses),
        wellness: wellness(expenses),
        trend: trend(expenses, today),
    }
}
