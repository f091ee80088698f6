use chrono::NaiveDate;
use rand::SeedableRng;
use rand::rngs::StdRng;
use treevu_core::{
    expense_reward, metrics, Category, Expense, ExpenseDraft, Level, ReceiptType, UserProgress,
};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
}

/// First-ever formal expense of S/ 100: base + first bonus, optional harvest, no streak bonus.
#[test]
fn test_first_formal_expense_scenario() {
    for seed in 0..50u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut progress = UserProgress::default();

        let draft = ExpenseDraft::new("Wong", 100.0, day(1))
            .with_category(Category::Food)
            .with_receipt(ReceiptType::Factura);
        let e = Expense::from_draft("exp-1", draft).unwrap();
        assert!(e.is_formal);
        assert_eq!(e.lost_savings, 0.0);
        assert_eq!(e.igv, 15.25);

        let r = expense_reward(e.is_formal, progress.expense_count == 0, e.date, &mut progress.streak, &mut rng);
        assert!((8..=12).contains(&r.base));
        assert_eq!(r.first_expense_bonus, 75);
        assert_eq!(r.streak_bonus, 0);
        assert!(r.harvest_bonus == 0 || (50..=100).contains(&r.harvest_bonus));
        assert_eq!(r.total(), r.base + 75 + r.harvest_bonus);
        assert_eq!(progress.streak.count, 1);
    }
}

/// A week of daily formal expenses caps the streak bonus at 10.
#[test]
fn test_daily_streak_caps() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut progress = UserProgress::default();
    let mut bonuses = Vec::new();
    for d in 1..=8 {
        let r = expense_reward(true, d == 1, day(d), &mut progress.streak, &mut rng);
        bonuses.push(r.streak_bonus);
    }
    assert_eq!(bonuses, vec![0, 2, 4, 6, 8, 10, 10, 10]);
}

/// Lost savings and formality index hold their invariants over a mixed list.
#[test]
fn test_invariants_over_mixed_list() {
    let receipts = [ReceiptType::Factura, ReceiptType::Boleta, ReceiptType::Factura, ReceiptType::Ticket];
    let list: Vec<Expense> = (0..40)
        .map(|i| {
            let draft = ExpenseDraft::new("M", 3.7 * i as f64, day(1 + (i % 28) as u32))
                .with_receipt(receipts[i % receipts.len()]);
            Expense::from_draft(format!("e{i}"), draft).unwrap()
        })
        .collect();

    for e in &list {
        if e.is_formal {
            assert_eq!(e.lost_savings, 0.0);
        } else {
            assert_eq!(e.lost_savings, ((e.total * 0.18) * 100.0).round() / 100.0);
        }
    }
    let fi = metrics::formality_index(&list);
    assert!((0.0..=100.0).contains(&fi));

    let mut progress = UserProgress {
        expense_count: list.len() as u32,
        formality_index: fi,
        ..Default::default()
    };
    progress.evaluate_level();
    assert_eq!(progress.level, Level::Sapling);
}
