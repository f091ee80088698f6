//! Tax estimation against the Peruvian income-tax brackets.
//!
//! Deductible spending earns back 3% of its total; the refund estimate applies
//! the user's marginal rate to that deductible base.

use serde::{Deserialize, Serialize};

use crate::expense::{round2, Category, Expense, ReceiptType};

pub const DEDUCTION_RATE: f64 = 0.03;
/// UIT (tax unit) in soles
pub const DEFAULT_UIT: f64 = 4_950.0;
/// Exempt allowance in UITs
pub const EXEMPT_UITS: f64 = 7.0;

/// One bracket: taxable base up to `up_to_uit` UITs is taxed at `rate`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bracket {
    /// `None` for the open-ended top bracket
    pub up_to_uit: Option<f64>,
    pub rate: f64,
}

pub const PERU_BRACKETS: [Bracket; 5] = [
    Bracket { up_to_uit: Some(5.0), rate: 0.08 },
    Bracket { up_to_uit: Some(20.0), rate: 0.14 },
    Bracket { up_to_uit: Some(35.0), rate: 0.17 },
    Bracket { up_to_uit: Some(45.0), rate: 0.20 },
    Bracket { up_to_uit: None, rate: 0.30 },
];

/// Whether an expense qualifies for the 3% deduction.
///
/// Services only qualify when billed with a professional-fee receipt.
pub fn is_deductible(expense: &Expense) -> bool {
    if !expense.is_formal {
        return false;
    }
    match expense.category {
        Category::Restaurants | Category::Housing | Category::Health => true,
        Category::Services => expense.receipt_type == ReceiptType::ReciboHonorarios,
        _ => false,
    }
}

pub fn deductible_amount(expense: &Expense) -> f64 {
    if is_deductible(expense) {
        expense.total * DEDUCTION_RATE
    } else {
        0.0
    }
}

pub fn deductible_total(expenses: &[Expense]) -> f64 {
    round2(expenses.iter().map(deductible_amount).sum())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxTable {
    pub uit: f64,
    pub exempt_uits: f64,
    pub brackets: Vec<Bracket>,
}

impl Default for TaxTable {
    fn default() -> Self {
        Self::with_uit(DEFAULT_UIT)
    }
}

impl TaxTable {
    pub fn with_uit(uit: f64) -> Self {
        Self {
            uit,
            exempt_uits: EXEMPT_UITS,
            brackets: PERU_BRACKETS.to_vec(),
        }
    }

    /// Annual income minus the exempt allowance, never negative.
    pub fn taxable_base(&self, annual_income: f64) -> f64 {
        (annual_income - self.exempt_uits * self.uit).max(0.0)
    }

    /// Marginal rate for an annual income; 0 when nothing is taxable.
    pub fn marginal_rate(&self, annual_income: f64) -> f64 {
        let base = self.taxable_base(annual_income);
        if base <= 0.0 {
            return 0.0;
        }
        let base_uit = base / self.uit;
        self.brackets
            .iter()
            .find(|b| b.up_to_uit.is_none_or(|limit| base_uit <= limit))
            .map(|b| b.rate)
            .unwrap_or(0.0)
    }

    pub fn estimated_refund(&self, deductible: f64, annual_income: f64) -> f64 {
        round2(deductible * self.marginal_rate(annual_income))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxEstimate {
    pub deductible_spend: f64,
    pub deductible: f64,
    pub marginal_rate: f64,
    pub estimated_refund: f64,
}

/// Full estimate for a year's expenses.
pub fn estimate(expenses: &[Expense], annual_income: f64, table: &TaxTable) -> TaxEstimate {
    let deductible_spend = round2(
        expenses
            .iter()
            .filter(|e| is_deductible(e))
            .map(|e| e.total)
            .sum(),
    );
    let deductible = deductible_total(expenses);
    TaxEstimate {
        deductible_spend,
        deductible,
        marginal_rate: table.marginal_rate(annual_income),
        estimated_refund: table.estimated_refund(deductible, annual_income),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expense::ExpenseDraft;
    use chrono::NaiveDate;

    fn exp(total: f64, category: Category, receipt: ReceiptType) -> Expense {
        let day = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let draft = ExpenseDraft::new("M", total, day)
            .with_category(category)
            .with_receipt(receipt);
        Expense::from_draft("e", draft).unwrap()
    }

    #[test]
    fn test_deductible_whitelist() {
        assert!(is_deductible(&exp(10.0, Category::Restaurants, ReceiptType::Boleta)));
        assert!(!is_deductible(&exp(10.0, Category::Restaurants, ReceiptType::Ticket)));
        assert!(!is_deductible(&exp(10.0, Category::Food, ReceiptType::Factura)));
        assert!(is_deductible(&exp(10.0, Category::Services, ReceiptType::ReciboHonorarios)));
        assert!(!is_deductible(&exp(10.0, Category::Services, ReceiptType::Factura)));
    }

    #[test]
    fn test_refund_scenario() {
        let list = vec![exp(1000.0, Category::Restaurants, ReceiptType::Boleta)];
        let table = TaxTable::default();
        let est = estimate(&list, 60_000.0, &table);
        assert_eq!(est.deductible_spend, 1000.0);
        assert_eq!(est.deductible, 30.0);
        assert_eq!(est.marginal_rate, 0.14);
        assert_eq!(est.estimated_refund, 4.2);
    }

    #[test]
    fn test_marginal_rates() {
        let t = TaxTable::default();
        assert_eq!(t.marginal_rate(20_000.0), 0.0);
        // 7 UIT + 1 UIT
        assert_eq!(t.marginal_rate(8.0 * 4_950.0), 0.08);
        assert_eq!(t.marginal_rate(7.0 * 4_950.0 + 30.0 * 4_950.0), 0.17);
        assert_eq!(t.marginal_rate(1_000_000.0), 0.30);
    }
}
