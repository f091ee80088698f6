//! Expense records: the unit every other module aggregates over

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_non_negative, Result, TreevuError};
use crate::policy::PolicyViolation;

/// IGV (general sales tax) rate in Peru.
pub const IGV_RATE: f64 = 0.18;

/// Round to two decimals (céntimos).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Spending categories
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    #[serde(rename = "food")]
    Food,
    #[serde(rename = "restaurants")]
    Restaurants,
    #[serde(rename = "transport")]
    Transport,
    #[serde(rename = "health")]
    Health,
    #[serde(rename = "education")]
    Education,
    #[serde(rename = "entertainment")]
    Entertainment,
    #[serde(rename = "services")]
    Services,
    #[serde(rename = "housing")]
    Housing,
    #[serde(rename = "shopping")]
    Shopping,
    #[serde(rename = "other")]
    Other,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Food,
        Category::Restaurants,
        Category::Transport,
        Category::Health,
        Category::Education,
        Category::Entertainment,
        Category::Services,
        Category::Housing,
        Category::Shopping,
        Category::Other,
    ];

    /// Needs rather than wants; feeds the wellness balance ratio.
    pub fn is_essential(&self) -> bool {
        matches!(
            self,
            Category::Food | Category::Transport | Category::Health | Category::Housing | Category::Services
        )
    }

    /// Spending that can be skipped; triggers the saving-opportunity prompt.
    pub fn is_discretionary(&self) -> bool {
        matches!(
            self,
            Category::Restaurants | Category::Entertainment | Category::Shopping
        )
    }

    pub fn is_self_development(&self) -> bool {
        matches!(self, Category::Education)
    }

    /// Storage key, same as the serde name
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Food => "food",
            Category::Restaurants => "restaurants",
            Category::Transport => "transport",
            Category::Health => "health",
            Category::Education => "education",
            Category::Entertainment => "entertainment",
            Category::Services => "services",
            Category::Housing => "housing",
            Category::Shopping => "shopping",
            Category::Other => "other",
        }
    }

    /// Spanish display label
    pub fn label(&self) -> &'static str {
        match self {
            Category::Food => "Alimentación",
            Category::Restaurants => "Restaurantes",
            Category::Transport => "Transporte",
            Category::Health => "Salud",
            Category::Education => "Educación",
            Category::Entertainment => "Entretenimiento",
            Category::Services => "Servicios",
            Category::Housing => "Vivienda",
            Category::Shopping => "Compras",
            Category::Other => "Otros",
        }
    }

    /// Parse either the serde key or the Spanish label, case-insensitive.
    pub fn parse(s: &str) -> Option<Category> {
        let needle = s.trim().to_lowercase();
        Category::ALL.into_iter().find(|c| {
            c.as_str() == needle || c.label().to_lowercase() == needle
        })
    }
}

/// Kind of proof-of-purchase issued by the merchant
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ReceiptType {
    #[serde(rename = "factura")]
    Factura,
    #[serde(rename = "boleta")]
    Boleta,
    /// Professional-fee receipt (4th category income)
    #[serde(rename = "recibo_honorarios")]
    ReciboHonorarios,
    #[serde(rename = "ticket")]
    Ticket,
    #[serde(rename = "sin_comprobante")]
    NoReceipt,
}

impl ReceiptType {
    /// Whether this receipt type counts as formal unless stated otherwise.
    pub fn is_formal_by_default(&self) -> bool {
        !matches!(self, ReceiptType::Ticket | ReceiptType::NoReceipt)
    }

    pub const ALL: [ReceiptType; 5] = [
        ReceiptType::Factura,
        ReceiptType::Boleta,
        ReceiptType::ReciboHonorarios,
        ReceiptType::Ticket,
        ReceiptType::NoReceipt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptType::Factura => "factura",
            ReceiptType::Boleta => "boleta",
            ReceiptType::ReciboHonorarios => "recibo_honorarios",
            ReceiptType::Ticket => "ticket",
            ReceiptType::NoReceipt => "sin_comprobante",
        }
    }

    pub fn parse(s: &str) -> Option<ReceiptType> {
        match s.trim().to_lowercase().as_str() {
            "factura" => Some(ReceiptType::Factura),
            "boleta" => Some(ReceiptType::Boleta),
            "recibo_honorarios" | "recibo" | "rh" => Some(ReceiptType::ReciboHonorarios),
            "ticket" => Some(ReceiptType::Ticket),
            "sin_comprobante" | "none" | "informal" => Some(ReceiptType::NoReceipt),
            _ => None,
        }
    }
}

/// A purchased item kept when the expense came from a product list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    pub name: String,
    pub amount: f64,
    pub category: Category,
}

/// A user expense.
///
/// `lost_savings` and `igv` are derived from `total` and `is_formal` at construction
/// and on every edit; nothing else writes them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Expense {
    pub id: String,
    pub merchant_name: String,
    pub ruc: Option<String>,
    pub date: NaiveDate,
    pub total: f64,
    pub category: Category,
    pub receipt_type: ReceiptType,
    pub is_formal: bool,
    pub lost_savings: f64,
    pub igv: f64,
    #[serde(default)]
    pub is_corporate: bool,
    #[serde(default)]
    pub products: Vec<LineItem>,
    /// Derived on load/save, never persisted
    #[serde(skip)]
    pub policy_violations: Vec<PolicyViolation>,
}

/// Everything a caller provides to create an expense; the derived fields are computed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpenseDraft {
    pub merchant_name: String,
    pub ruc: Option<String>,
    pub date: NaiveDate,
    pub total: f64,
    pub category: Category,
    pub receipt_type: ReceiptType,
    /// Explicit formality; falls back to the receipt type's default
    pub is_formal: Option<bool>,
    pub is_corporate: bool,
    pub products: Vec<LineItem>,
}

impl ExpenseDraft {
    pub fn new(merchant_name: impl Into<String>, total: f64, date: NaiveDate) -> Self {
        Self {
            merchant_name: merchant_name.into(),
            ruc: None,
            date,
            total,
            category: Category::Other,
            receipt_type: ReceiptType::Boleta,
            is_formal: None,
            is_corporate: false,
            products: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn with_receipt(mut self, receipt_type: ReceiptType) -> Self {
        self.receipt_type = receipt_type;
        self
    }

    pub fn with_ruc(mut self, ruc: impl Into<String>) -> Self {
        self.ruc = Some(ruc.into());
        self
    }

    pub fn with_formal(mut self, is_formal: bool) -> Self {
        self.is_formal = Some(is_formal);
        self
    }

    pub fn corporate(mut self) -> Self {
        self.is_corporate = true;
        self
    }

    pub fn resolved_formal(&self) -> bool {
        self.is_formal
            .unwrap_or_else(|| self.receipt_type.is_formal_by_default())
    }

    /// Form-level validation; blocks submission.
    pub fn validate(&self) -> Result<()> {
        if self.merchant_name.trim().is_empty() {
            return Err(TreevuError::MissingField("merchant_name"));
        }
        ensure_non_negative("total", self.total)?;
        for item in &self.products {
            ensure_non_negative("product amount", item.amount)?;
        }
        Ok(())
    }
}

/// Lost savings: the IGV the user could have recovered with a formal receipt.
pub fn lost_savings_for(total: f64, is_formal: bool) -> f64 {
    if is_formal { 0.0 } else { round2(total * IGV_RATE) }
}

/// IGV embedded in a formal total.
pub fn igv_for(total: f64, is_formal: bool) -> f64 {
    if is_formal {
        round2(total - total / (1.0 + IGV_RATE))
    } else {
        0.0
    }
}

impl Expense {
    /// Build an expense from a validated draft.
    pub fn from_draft(id: impl Into<String>, draft: ExpenseDraft) -> Result<Self> {
        draft.validate()?;
        let is_formal = draft.resolved_formal();
        Ok(Self {
            id: id.into(),
            merchant_name: draft.merchant_name.trim().to_string(),
            ruc: draft.ruc,
            date: draft.date,
            total: draft.total,
            category: draft.category,
            receipt_type: draft.receipt_type,
            is_formal,
            lost_savings: lost_savings_for(draft.total, is_formal),
            igv: igv_for(draft.total, is_formal),
            is_corporate: draft.is_corporate,
            products: draft.products,
            policy_violations: Vec::new(),
        })
    }

    /// Manual edit: replaces the user-editable fields and recomputes the derived ones.
    pub fn apply_edit(&mut self, draft: ExpenseDraft) -> Result<()> {
        let edited = Expense::from_draft(self.id.clone(), draft)?;
        *self = edited;
        Ok(())
    }

    /// Recompute derived fields; used after loading persisted data.
    pub fn normalize(&mut self) {
        self.lost_savings = lost_savings_for(self.total, self.is_formal);
        self.igv = igv_for(self.total, self.is_formal);
    }

    pub fn to_draft(&self) -> ExpenseDraft {
        ExpenseDraft {
            merchant_name: self.merchant_name.clone(),
            ruc: self.ruc.clone(),
            date: self.date,
            total: self.total,
            category: self.category,
            receipt_type: self.receipt_type,
            is_formal: Some(self.is_formal),
            is_corporate: self.is_corporate,
            products: self.products.clone(),
        }
    }
}

/// Money saved by skipping a purchase
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DivertedExpense {
    pub id: String,
    pub description: String,
    pub amount: f64,
    pub date: NaiveDate,
    pub goal_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    #[test]
    fn test_formal_expense_derivations() {
        let draft = ExpenseDraft::new("Tambo", 100.0, day())
            .with_receipt(ReceiptType::Factura)
            .with_category(Category::Food);
        let e = Expense::from_draft("exp-1", draft).unwrap();
        assert!(e.is_formal);
        assert_eq!(e.lost_savings, 0.0);
        assert_eq!(e.igv, 15.25);
    }

    #[test]
    fn test_informal_expense_loses_igv() {
        let draft = ExpenseDraft::new("Mercado", 57.35, day()).with_receipt(ReceiptType::NoReceipt);
        let e = Expense::from_draft("exp-2", draft).unwrap();
        assert!(!e.is_formal);
        assert_eq!(e.lost_savings, round2(57.35 * 0.18));
        assert_eq!(e.igv, 0.0);
    }

    #[test]
    fn test_explicit_formality_overrides_receipt_default() {
        let draft = ExpenseDraft::new("Bodega", 20.0, day())
            .with_receipt(ReceiptType::Ticket)
            .with_formal(true);
        let e = Expense::from_draft("exp-3", draft).unwrap();
        assert!(e.is_formal);
        assert_eq!(e.lost_savings, 0.0);
    }

    #[test]
    fn test_validation_rejects_bad_drafts() {
        assert_eq!(
            Expense::from_draft("x", ExpenseDraft::new("  ", 10.0, day())),
            Err(TreevuError::MissingField("merchant_name"))
        );
        assert!(Expense::from_draft("x", ExpenseDraft::new("A", -1.0, day())).is_err());
    }

    #[test]
    fn test_edit_recomputes_derived_fields() {
        let mut e = Expense::from_draft(
            "exp-4",
            ExpenseDraft::new("Cine", 40.0, day()).with_receipt(ReceiptType::Boleta),
        )
        .unwrap();
        let mut draft = e.to_draft();
        draft.is_formal = Some(false);
        e.apply_edit(draft).unwrap();
        assert_eq!(e.id, "exp-4");
        assert_eq!(e.lost_savings, 7.2);
        assert_eq!(e.igv, 0.0);
    }

    #[test]
    fn test_category_parse() {
        assert_eq!(Category::parse("Salud"), Some(Category::Health));
        assert_eq!(Category::parse("restaurants"), Some(Category::Restaurants));
        assert_eq!(Category::parse("nope"), None);
        assert!(Category::Restaurants.is_discretionary());
        assert!(Category::Housing.is_essential());
    }

    #[test]
    fn test_policy_violations_not_serialized() {
        let e = Expense::from_draft("exp-5", ExpenseDraft::new("A", 1.0, day())).unwrap();
        let json = serde_json::to_string(&e).unwrap();
        assert!(!json.contains("policy_violations"));
        let back: Expense = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
