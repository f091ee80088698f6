//! Level/progress table.
//!
//! Five ordered tiers. A tier is reached when both its expense count and its
//! formality index thresholds are met. Levels only move up; `prestige` is the
//! single way back down.

use chrono::NaiveDate;
use std::collections::BTreeSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    #[serde(rename = "semilla")]
    Seed = 1,
    #[serde(rename = "brote")]
    Sprout = 2,
    #[serde(rename = "arbusto")]
    Sapling = 3,
    #[serde(rename = "arbol")]
    Tree = 4,
    #[serde(rename = "bosque")]
    Forest = 5,
}

impl Level {
    pub fn number(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            Level::Seed => "Semilla",
            Level::Sprout => "Brote",
            Level::Sapling => "Arbusto",
            Level::Tree => "Árbol",
            Level::Forest => "Bosque",
        }
    }

    pub fn next(&self) -> Option<Level> {
        match self {
            Level::Seed => Some(Level::Sprout),
            Level::Sprout => Some(Level::Sapling),
            Level::Sapling => Some(Level::Tree),
            Level::Tree => Some(Level::Forest),
            Level::Forest => None,
        }
    }
}

/// One row of the static threshold table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelThreshold {
    pub level: Level,
    pub min_expenses: u32,
    /// Minimum formality index, 0 - 100
    pub min_formality: f64,
    pub benefits: &'static [&'static str],
}

pub const LEVEL_TABLE: [LevelThreshold; 5] = [
    LevelThreshold {
        level: Level::Seed,
        min_expenses: 0,
        min_formality: 0.0,
        benefits: &["Registro de gastos", "Metas de ahorro"],
    },
    LevelThreshold {
        level: Level::Sprout,
        min_expenses: 5,
        min_formality: 30.0,
        benefits: &["Escaneo de boletas con IA", "Lecciones financieras"],
    },
    LevelThreshold {
        level: Level::Sapling,
        min_expenses: 20,
        min_formality: 50.0,
        benefits: &["Estimado de devolución de impuestos", "Unirse a un Squad"],
    },
    LevelThreshold {
        level: Level::Tree,
        min_expenses: 50,
        min_formality: 70.0,
        benefits: &["Misiones de Squad", "Descuentos con comercios aliados"],
    },
    LevelThreshold {
        level: Level::Forest,
        min_expenses: 100,
        min_formality: 85.0,
        benefits: &["Prestigio", "Insignia Bosque", "Cashback preferente"],
    },
];

pub fn threshold(level: Level) -> &'static LevelThreshold {
    &LEVEL_TABLE[level.number() as usize - 1]
}

/// Highest tier whose thresholds are met.
pub fn level_for(expense_count: u32, formality_index: f64) -> Level {
    LEVEL_TABLE
        .iter()
        .rev()
        .find(|t| expense_count >= t.min_expenses && formality_index >= t.min_formality)
        .map(|t| t.level)
        .unwrap_or(Level::Seed)
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Streak {
    pub count: u32,
    pub last_date: Option<NaiveDate>,
}

/// Per-user progress record (persisted as the `user` slice)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProgress {
    pub level: Level,
    pub expense_count: u32,
    pub formal_expense_count: u32,
    /// Amount-weighted formality, 0 - 100
    pub formality_index: f64,
    /// Treevü balance
    pub balance: u64,
    pub streak: Streak,
    pub lessons_completed: u32,
    /// Ids of finished lessons; each pays out once
    #[serde(default)]
    pub completed_lessons: BTreeSet<String>,
    #[serde(default)]
    pub prestige: u32,
}

impl Default for UserProgress {
    fn default() -> Self {
        Self {
            level: Level::Seed,
            expense_count: 0,
            formal_expense_count: 0,
            formality_index: 0.0,
            balance: 0,
            streak: Streak::default(),
            lessons_completed: 0,
            completed_lessons: BTreeSet::new(),
            prestige: 0,
        }
    }
}

impl UserProgress {
    /// Re-evaluate the level against the table; returns the new level when it went up.
    pub fn evaluate_level(&mut self) -> Option<Level> {
        let candidate = level_for(self.expense_count, self.formality_index);
        if candidate > self.level {
            self.level = candidate;
            Some(candidate)
        } else {
            None
        }
    }

    /// Record a finished lesson; false if it was already done.
    pub fn complete_lesson(&mut self, lesson_id: &str) -> bool {
        if !self.completed_lessons.insert(lesson_id.to_string()) {
            return false;
        }
        self.lessons_completed += 1;
        true
    }

    pub fn can_prestige(&self) -> bool {
        self.level.next().is_none()
    }

    /// Explicit reset to the first tier; balance and history are kept.
    pub fn prestige(&mut self) {
        self.level = Level::Seed;
        self.expense_count = 0;
        self.formal_expense_count = 0;
        self.prestige += 1;
    }

    pub fn credit(&mut self, points: u32) {
        self.balance += u64::from(points);
    }

    /// What the next tier still needs: (missing expenses, missing formality points).
    pub fn to_next_level(&self) -> Option<(Level, u32, f64)> {
        let next = self.level.next()?;
        let t = threshold(next);
        Some((
            next,
            t.min_expenses.saturating_sub(self.expense_count),
            (t.min_formality - self.formality_index).max(0.0),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_thresholds() {
        assert_eq!(level_for(0, 0.0), Level::Seed);
        assert_eq!(level_for(5, 30.0), Level::Sprout);
        // Count alone is not enough
        assert_eq!(level_for(100, 40.0), Level::Sprout);
        assert_eq!(level_for(100, 90.0), Level::Forest);
    }

    #[test]
    fn test_level_is_monotonic() {
        let mut p = UserProgress {
            expense_count: 20,
            formality_index: 60.0,
            ..Default::default()
        };
        assert_eq!(p.evaluate_level(), Some(Level::Sapling));
        // Formality dropping does not demote
        p.formality_index = 10.0;
        assert_eq!(p.evaluate_level(), None);
        assert_eq!(p.level, Level::Sapling);
    }

    #[test]
    fn test_prestige_resets_level_only() {
        let mut p = UserProgress {
            level: Level::Forest,
            expense_count: 120,
            balance: 900,
            ..Default::default()
        };
        p.prestige();
        assert_eq!(p.level, Level::Seed);
        assert_eq!(p.balance, 900);
        assert_eq!(p.prestige, 1);
    }

    #[test]
    fn test_lessons_pay_once() {
        let mut p = UserProgress::default();
        assert!(p.complete_lesson("igv-101"));
        assert!(!p.complete_lesson("igv-101"));
        assert!(p.complete_lesson("boleta-vs-factura"));
        assert_eq!(p.lessons_completed, 2);
        assert!(!p.can_prestige());
    }

    #[test]
    fn test_to_next_level() {
        let p = UserProgress { expense_count: 3, formality_index: 10.0, ..Default::default() };
        let (next, exp, form) = p.to_next_level().unwrap();
        assert_eq!(next, Level::Sprout);
        assert_eq!(exp, 2);
        assert_eq!(form, 20.0);
        let top = UserProgress { level: Level::Forest, ..Default::default() };
        assert!(top.to_next_level().is_none());
    }
}
