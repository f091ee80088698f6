//! Monthly budget and the alerts it raises

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_positive, Result};
use crate::expense::{round2, Expense};
use crate::time::same_month;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Budget {
    pub monthly_limit: f64,
    /// Fraction of the limit that triggers a warning
    pub alert_threshold: f64,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            monthly_limit: 0.0,
            alert_threshold: 0.8,
        }
    }
}

/// Ordered from calm to alarming
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    /// No limit configured
    Unset,
    OnTrack,
    NearLimit,
    Exceeded,
}

impl Budget {
    pub fn new(monthly_limit: f64) -> Result<Self> {
        ensure_positive("monthly_limit", monthly_limit)?;
        Ok(Self {
            monthly_limit,
            ..Default::default()
        })
    }

    pub fn is_set(&self) -> bool {
        self.monthly_limit > 0.0
    }

    /// Spending in the month containing `today`.
    pub fn spent_in_month(&self, expenses: &[Expense], today: NaiveDate) -> f64 {
        round2(
            expenses
                .iter()
                .filter(|e| same_month(e.date, today))
                .map(|e| e.total)
                .sum(),
        )
    }

    pub fn status_for(&self, spent: f64) -> BudgetStatus {
        if !self.is_set() {
            BudgetStatus::Unset
        } else if spent > self.monthly_limit {
            BudgetStatus::Exceeded
        } else if spent >= self.monthly_limit * self.alert_threshold {
            BudgetStatus::NearLimit
        } else {
            BudgetStatus::OnTrack
        }
    }

    pub fn status(&self, expenses: &[Expense], today: NaiveDate) -> BudgetStatus {
        self.status_for(self.spent_in_month(expenses, today))
    }

    pub fn remaining(&self, expenses: &[Expense], today: NaiveDate) -> f64 {
        round2(self.monthly_limit - self.spent_in_month(expenses, today))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expense::ExpenseDraft;

    fn exp(total: f64, date: NaiveDate) -> Expense {
        Expense::from_draft("e", ExpenseDraft::new("M", total, date)).unwrap()
    }

    #[test]
    fn test_budget_status_transitions() {
        let b = Budget::new(1000.0).unwrap();
        assert_eq!(b.status_for(100.0), BudgetStatus::OnTrack);
        assert_eq!(b.status_for(800.0), BudgetStatus::NearLimit);
        assert_eq!(b.status_for(1000.0), BudgetStatus::NearLimit);
        assert_eq!(b.status_for(1000.01), BudgetStatus::Exceeded);
        assert_eq!(Budget::default().status_for(5.0), BudgetStatus::Unset);
    }

    #[test]
    fn test_only_current_month_counts() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
        let feb = NaiveDate::from_ymd_opt(2026, 2, 28).unwrap();
        let list = vec![exp(300.0, today), exp(900.0, feb)];
        let b = Budget::new(500.0).unwrap();
        assert_eq!(b.spent_in_month(&list, today), 300.0);
        assert_eq!(b.remaining(&list, today), 200.0);
        assert_eq!(b.status(&list, today), BudgetStatus::OnTrack);
    }
}
