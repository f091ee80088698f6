//! Corporate expense policy.
//!
//! Violations are warnings: they annotate an expense but never block saving it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::expense::{Category, Expense};
use crate::time::is_weekend;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum PolicyViolation {
    /// Single expense above the category's cap
    CategoryCap { category: Category, cap: f64, total: f64 },
    /// Category may not be expensed on Saturday/Sunday
    WeekendRestriction { category: Category },
    /// Category is never reimbursed
    NonReimbursable { category: Category },
}

impl PolicyViolation {
    /// Spanish warning shown in the banner
    pub fn message(&self) -> String {
        match self {
            PolicyViolation::CategoryCap { category, cap, total } => format!(
                "{}: S/ {:.2} supera el tope de S/ {:.2}",
                category.label(),
                total,
                cap
            ),
            PolicyViolation::WeekendRestriction { category } => {
                format!("{}: no se permite en fin de semana", category.label())
            }
            PolicyViolation::NonReimbursable { category } => {
                format!("{}: categoría no reembolsable", category.label())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorporatePolicy {
    pub category_caps: BTreeMap<Category, f64>,
    pub weekend_restricted: BTreeSet<Category>,
    pub non_reimbursable: BTreeSet<Category>,
}

impl Default for CorporatePolicy {
    fn default() -> Self {
        Self {
            category_caps: BTreeMap::from([
                (Category::Restaurants, 150.0),
                (Category::Transport, 100.0),
                (Category::Shopping, 300.0),
            ]),
            weekend_restricted: BTreeSet::from([Category::Restaurants, Category::Entertainment]),
            non_reimbursable: BTreeSet::from([Category::Entertainment, Category::Housing]),
        }
    }
}

impl CorporatePolicy {
    /// Evaluate every rule; personal expenses never violate anything.
    pub fn evaluate(&self, expense: &Expense) -> Vec<PolicyViolation> {
        if !expense.is_corporate {
            return vec![];
        }

        let mut out = Vec::new();
        let category = expense.category;

        if let Some(&cap) = self.category_caps.get(&category) {
            if expense.total > cap {
                out.push(PolicyViolation::CategoryCap { category, cap, total: expense.total });
            }
        }
        if self.weekend_restricted.contains(&category) && is_weekend(expense.date) {
            out.push(PolicyViolation::WeekendRestriction { category });
        }
        if self.non_reimbursable.contains(&category) {
            out.push(PolicyViolation::NonReimbursable { category });
        }
        out
    }

    /// Refresh the derived annotation in place.
    pub fn annotate(&self, expense: &mut Expense) {
        expense.policy_violations = self.evaluate(expense);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expense::ExpenseDraft;
    use chrono::NaiveDate;

    fn expense(category: Category, total: f64, date: NaiveDate, corporate: bool) -> Expense {
        let mut draft = ExpenseDraft::new("Merchant", total, date).with_category(category);
        draft.is_corporate = corporate;
        Expense::from_draft("e", draft).unwrap()
    }

    #[test]
    fn test_personal_expense_never_violates() {
        let sat = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        let e = expense(Category::Entertainment, 999.0, sat, false);
        assert!(CorporatePolicy::default().evaluate(&e).is_empty());
    }

    #[test]
    fn test_weekend_dinner_over_cap() {
        let sat = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        let e = expense(Category::Restaurants, 180.0, sat, true);
        let v = CorporatePolicy::default().evaluate(&e);
        assert_eq!(v.len(), 2);
        assert!(matches!(v[0], PolicyViolation::CategoryCap { cap, .. } if cap == 150.0));
        assert_eq!(v[1], PolicyViolation::WeekendRestriction { category: Category::Restaurants });
    }

    #[test]
    fn test_non_reimbursable() {
        let mon = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        let mut e = expense(Category::Housing, 10.0, mon, true);
        CorporatePolicy::default().annotate(&mut e);
        assert_eq!(e.policy_violations, vec![PolicyViolation::NonReimbursable { category: Category::Housing }]);
        assert!(e.policy_violations[0].message().contains("no reembolsable"));
    }
}
