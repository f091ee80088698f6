//! Wire shapes returned by the collaborators and their conversion into core types.
//!
//! Replies are model-generated, so every field is optional and numbers may
//! arrive as strings ("S/ 84.50"). Conversion is lossy on purpose: anything
//! unreadable becomes `None` and the wizard falls back to the review form.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use treevu_core::expense::round2;
use treevu_core::{
    suggest_category, Category, LineItem, ReceiptCheck, ReceiptType, ScannedProducts, ScannedReceipt, SplitGroup,
};

use crate::ruc::validate_ruc;

/// Amount as a number or as text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawAmount {
    Number(f64),
    Text(String),
}

impl RawAmount {
    pub fn value(&self) -> Option<f64> {
        let v = match self {
            RawAmount::Number(n) => *n,
            RawAmount::Text(s) => parse_amount(s)?,
        };
        (v.is_finite() && v >= 0.0).then_some(v)
    }
}

/// "S/ 1,234.50" -> 1234.5
pub fn parse_amount(s: &str) -> Option<f64> {
    let cleaned: String = s
        .trim()
        .trim_start_matches("S/.")
        .trim_start_matches("S/")
        .trim_start_matches("PEN")
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned.parse().ok()
}

/// Dates come back as ISO or as the local dd/mm/yyyy.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%d/%m/%Y"))
        .or_else(|_| NaiveDate::parse_from_str(s, "%d-%m-%Y"))
        .ok()
}

fn parse_category(s: Option<&str>) -> Option<Category> {
    s.and_then(Category::parse)
}

fn parse_receipt(s: Option<&str>) -> Option<ReceiptType> {
    s.and_then(ReceiptType::parse)
}

/// Keep only RUCs that pass local validation.
fn clean_ruc(s: Option<&str>) -> Option<String> {
    s.and_then(|r| validate_ruc(r).ok()).map(|r| r.to_string())
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVerification {
    #[serde(alias = "isValid", alias = "valid")]
    pub usable: Option<bool>,
    pub receipt_type: Option<String>,
    pub ruc: Option<String>,
    #[serde(default)]
    pub issues: Vec<String>,
}

impl RawVerification {
    pub fn into_check(self) -> ReceiptCheck {
        ReceiptCheck {
            usable: self.usable.unwrap_or(false),
            receipt_type: parse_receipt(self.receipt_type.as_deref()),
            ruc: clean_ruc(self.ruc.as_deref()),
            issues: self.issues,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReceipt {
    #[serde(alias = "razonSocial", alias = "merchant")]
    pub merchant_name: Option<String>,
    pub ruc: Option<String>,
    #[serde(alias = "fecha")]
    pub date: Option<String>,
    #[serde(alias = "montoTotal", alias = "amount")]
    pub total: Option<RawAmount>,
    #[serde(alias = "categoria")]
    pub category: Option<String>,
    #[serde(alias = "tipoComprobante")]
    pub receipt_type: Option<String>,
    pub confidence: Option<f64>,
}

impl RawReceipt {
    pub fn into_scanned(self) -> ScannedReceipt {
        let merchant_name = non_empty(self.merchant_name);
        let category = parse_category(self.category.as_deref())
            .or_else(|| merchant_name.as_deref().and_then(suggest_category));
        ScannedReceipt {
            ruc: clean_ruc(self.ruc.as_deref()),
            date: self.date.as_deref().and_then(parse_date),
            total: self.total.as_ref().and_then(RawAmount::value).map(round2),
            category,
            receipt_type: parse_receipt(self.receipt_type.as_deref()),
            confidence: self.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
            merchant_name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProduct {
    #[serde(alias = "descripcion", alias = "description")]
    pub name: Option<String>,
    #[serde(alias = "price", alias = "total", alias = "precio")]
    pub amount: Option<RawAmount>,
    #[serde(alias = "cantidad")]
    pub quantity: Option<f64>,
    #[serde(alias = "categoria")]
    pub category: Option<String>,
}

impl RawProduct {
    /// A usable line item, or `None` if the name or amount is unreadable.
    pub fn into_item(self) -> Option<LineItem> {
        let name = non_empty(self.name)?;
        let unit = self.amount.as_ref().and_then(RawAmount::value)?;
        let qty = self.quantity.filter(|q| q.is_finite() && *q > 0.0).unwrap_or(1.0);
        Some(LineItem {
            category: parse_category(self.category.as_deref()).unwrap_or(Category::Other),
            amount: round2(unit * qty),
            name,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProducts {
    #[serde(alias = "razonSocial", alias = "merchant")]
    pub merchant_name: Option<String>,
    pub ruc: Option<String>,
    #[serde(alias = "fecha")]
    pub date: Option<String>,
    #[serde(alias = "tipoComprobante")]
    pub receipt_type: Option<String>,
    #[serde(default, alias = "items", alias = "productos")]
    pub products: Vec<RawProduct>,
}

impl RawProducts {
    pub fn into_scanned(self) -> ScannedProducts {
        ScannedProducts {
            merchant_name: non_empty(self.merchant_name),
            ruc: clean_ruc(self.ruc.as_deref()),
            date: self.date.as_deref().and_then(parse_date),
            receipt_type: parse_receipt(self.receipt_type.as_deref()),
            items: self.products.into_iter().filter_map(RawProduct::into_item).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSplitGroup {
    #[serde(alias = "categoria")]
    pub category: Option<String>,
    #[serde(default, alias = "products", alias = "productos")]
    pub items: Vec<RawProduct>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSplit {
    #[serde(default, alias = "grupos")]
    pub groups: Vec<RawSplitGroup>,
}

impl RawSplit {
    /// Groups with a known category and at least one readable item.
    pub fn into_groups(self) -> Vec<SplitGroup> {
        self.groups
            .into_iter()
            .filter_map(|g| {
                let category = parse_category(g.category.as_deref())?;
                let items: Vec<LineItem> = g
                    .items
                    .into_iter()
                    .filter_map(RawProduct::into_item)
                    .map(|mut i| {
                        i.category = category;
                        i
                    })
                    .collect();
                (!items.is_empty()).then_some(SplitGroup { category, items })
            })
            .collect()
    }
}

/// Tax-id lookup reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RucLookupResponse {
    pub is_valid: bool,
    #[serde(alias = "razonSocial", alias = "name")]
    pub registered_name: Option<String>,
}

impl RucLookupResponse {
    /// Registered name plus a category suggestion derived from it.
    pub fn autofill(&self) -> Option<(String, Option<Category>)> {
        if !self.is_valid {
            return None;
        }
        let name = self.registered_name.as_deref()?.trim();
        if name.is_empty() {
            return None;
        }
        Some((name.to_string(), suggest_category(name)))
    }
}
