//! CSV export of the expense list.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use treevu_core::Expense;

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    id: &'a str,
    date: String,
    merchant: &'a str,
    ruc: &'a str,
    category: &'a str,
    receipt_type: &'a str,
    total: f64,
    is_formal: bool,
    igv: f64,
    lost_savings: f64,
    corporate: bool,
    policy_warnings: String,
}

impl<'a> From<&'a Expense> for ExportRow<'a> {
    fn from(e: &'a Expense) -> Self {
        let warnings: Vec<String> = e.policy_violations.iter().map(|v| v.message()).collect();
        Self {
            id: &e.id,
            date: e.date.format("%Y-%m-%d").to_string(),
            merchant: &e.merchant_name,
            ruc: e.ruc.as_deref().unwrap_or(""),
            category: e.category.as_str(),
            receipt_type: e.receipt_type.as_str(),
            total: e.total,
            is_formal: e.is_formal,
            igv: e.igv,
            lost_savings: e.lost_savings,
            corporate: e.is_corporate,
            policy_warnings: warnings.join("; "),
        }
    }
}

/// Write expenses as CSV with a header row, oldest first. Returns the row count.
pub fn write_csv<W: Write>(expenses: &[Expense], out: W) -> Result<usize> {
    let mut sorted: Vec<&Expense> = expenses.iter().collect();
    sorted.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));

    let mut wtr = csv::Writer::from_writer(out);
    for e in &sorted {
        wtr.serialize(ExportRow::from(*e)).context("write CSV row")?;
    }
    wtr.flush().context("flush CSV")?;
    Ok(sorted.len())
}

pub fn export_to_path(expenses: &[Expense], path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let f = std::fs::File::create(path).with_context(|| format!("create {}", path.display()))?;
    write_csv(expenses, f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use treevu_core::{Category, CorporatePolicy, ExpenseDraft, ReceiptType};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn test_csv_rows_sorted_with_header() {
        let late = Expense::from_draft(
            "b",
            ExpenseDraft::new("Tottus", 100.0, day(5))
                .with_category(Category::Food)
                .with_receipt(ReceiptType::Factura)
                .with_ruc("20508565934"),
        )
        .unwrap();
        let early = Expense::from_draft("a", ExpenseDraft::new("Bodega", 10.0, day(2)).with_receipt(ReceiptType::Ticket))
            .unwrap();

        let mut buf = Vec::new();
        let n = write_csv(&[late, early], &mut buf).unwrap();
        assert_eq!(n, 2);
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "id,date,merchant,ruc,category,receipt_type,total,is_formal,igv,lost_savings,corporate,policy_warnings"
        );
        assert!(lines[1].starts_with("a,2026-03-02,Bodega,,other,ticket,10.0,false,0.0,1.8,false,"));
        assert!(lines[2].starts_with("b,2026-03-05,Tottus,20508565934,food,factura,100.0,true,15.25,0.0"));
    }

    #[test]
    fn test_policy_warnings_exported() {
        let mut e = Expense::from_draft(
            "c",
            ExpenseDraft::new("Cineplanet", 50.0, day(4)).with_category(Category::Entertainment).corporate(),
        )
        .unwrap();
        CorporatePolicy::default().annotate(&mut e);
        let mut buf = Vec::new();
        write_csv(&[e], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.lines().nth(1).is_some_and(|l| !l.ends_with(",")));
    }
}
