//! Terminal rendering of domain values.

use treevu_core::wizard::{ReceiptCheck, SavingOffer, SplitGroup};
use treevu_core::{Expense, ExpenseDraft, LineItem, Notification, RewardBreakdown};

pub fn soles(amount: f64) -> String {
    format!("S/ {:.2}", amount)
}

pub fn print_draft(d: &ExpenseDraft) {
    let merchant = if d.merchant_name.trim().is_empty() { "(sin comercio)" } else { d.merchant_name.trim() };
    println!("  Comercio:    {merchant}");
    if let Some(ruc) = &d.ruc {
        println!("  RUC:         {ruc}");
    }
    println!("  Fecha:       {}", d.date);
    println!("  Total:       {}", soles(d.total));
    println!("  Categoría:   {}", d.category.label());
    println!("  Comprobante: {}", d.receipt_type.as_str());
    if d.is_corporate {
        println!("  Corporativo: sí");
    }
}

pub fn print_check(check: &ReceiptCheck) {
    if check.usable {
        println!("Comprobante legible.");
    } else {
        println!("El comprobante no es válido para deducción.");
    }
    if let Some(rt) = check.receipt_type {
        println!("  Tipo: {}", rt.as_str());
    }
    for issue in &check.issues {
        println!("  - {issue}");
    }
}

pub fn print_items(items: &[LineItem]) {
    for item in items {
        println!("  - {:<28} {:>12}  {}", item.name, soles(item.amount), item.category.label());
    }
}

pub fn print_groups(groups: &[SplitGroup]) {
    for g in groups {
        println!("  {} ({})", g.category.label(), soles(g.total()));
        for item in &g.items {
            println!("    - {} {}", item.name, soles(item.amount));
        }
    }
}

pub fn print_reward(reward: &RewardBreakdown) {
    println!("+{} treevüs", reward.total());
    for (label, points) in reward.lines() {
        println!("  {label}: +{points}");
    }
}

pub fn print_offer(offer: &SavingOffer) {
    println!(
        "¿Apartas {} para tu meta? (gasto {})",
        soles(offer.suggested_amount),
        offer.expense_id
    );
}

pub fn expense_row(e: &Expense) -> String {
    let flag = if e.is_formal { "formal" } else { "informal" };
    format!(
        "{:<22} {}  {:<24} {:>12}  {:<16} {}",
        e.id,
        e.date,
        e.merchant_name,
        soles(e.total),
        e.category.label(),
        flag
    )
}

pub fn notification_line(n: &Notification) -> String {
    let mark = if n.read { " " } else { "•" };
    format!("{mark} {}  {}", n.created_at.format("%Y-%m-%d %H:%M"), n.message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soles_format() {
        assert_eq!(soles(4.2), "S/ 4.20");
        assert_eq!(soles(1000.0), "S/ 1000.00");
    }
}
