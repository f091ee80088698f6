//! Reward rules: how many treevüs an action earns.
//!
//! All randomness goes through [`Dice`] so callers pick the source. Production
//! code passes a `rand` RNG; tests pass scripted dice.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::levels::Streak;
use crate::time::is_day_before;

pub const FORMAL_RANGE: (u32, u32) = (8, 12);
pub const INFORMAL_POINTS: u32 = 1;
pub const LESSON_POINTS: u32 = 20;
pub const LEVEL_UP_POINTS: u32 = 100;
pub const FIRST_EXPENSE_BONUS: u32 = 75;
pub const HARVEST_CHANCE: f64 = 0.15;
pub const HARVEST_RANGE: (u32, u32) = (50, 100);
pub const STREAK_CAP: u32 = 10;

/// Source of random rolls
pub trait Dice {
    /// Uniform integer in `[lo, hi]`, both inclusive.
    fn roll(&mut self, lo: u32, hi: u32) -> u32;
    /// True with probability `p`.
    fn chance(&mut self, p: f64) -> bool;
}

impl<R: rand::Rng> Dice for R {
    fn roll(&mut self, lo: u32, hi: u32) -> u32 {
        self.gen_range(lo..=hi)
    }

    fn chance(&mut self, p: f64) -> bool {
        self.gen_bool(p.clamp(0.0, 1.0))
    }
}

/// Something the user did that may earn points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardAction {
    FormalExpense,
    InformalExpense,
    LessonCompleted,
    LevelUp,
}

/// Base points for an action.
pub fn reward(action: RewardAction, dice: &mut impl Dice) -> u32 {
    match action {
        RewardAction::FormalExpense => dice.roll(FORMAL_RANGE.0, FORMAL_RANGE.1),
        RewardAction::InformalExpense => INFORMAL_POINTS,
        RewardAction::LessonCompleted => LESSON_POINTS,
        RewardAction::LevelUp => LEVEL_UP_POINTS,
    }
}

/// Bonus for a streak of `count` consecutive days.
pub fn streak_bonus(count: u32) -> u32 {
    if count < 2 {
        return 0;
    }
    ((count - 1) * 2).min(STREAK_CAP)
}

/// Advance the formal-expense streak for an expense on `day`.
///
/// Yesterday extends the streak, the same day leaves it alone, anything else restarts it.
pub fn advance_streak(streak: &mut Streak, day: NaiveDate) {
    match streak.last_date {
        Some(last) if last == day => {}
        Some(last) if is_day_before(last, day) => streak.count += 1,
        Some(last) if last > day => {}
        _ => streak.count = 1,
    }
    if streak.last_date.is_none_or(|last| day > last) {
        streak.last_date = Some(day);
    }
}

/// 15% chance of an extra [50, 100].
pub fn surprise_harvest(dice: &mut impl Dice) -> Option<u32> {
    if dice.chance(HARVEST_CHANCE) {
        Some(dice.roll(HARVEST_RANGE.0, HARVEST_RANGE.1))
    } else {
        None
    }
}

/// Itemized points earned by one action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub base: u32,
    pub first_expense_bonus: u32,
    pub streak_bonus: u32,
    pub harvest_bonus: u32,
    pub level_up_bonus: u32,
}

impl std::ops::AddAssign for RewardBreakdown {
    fn add_assign(&mut self, other: Self) {
        self.base += other.base;
        self.first_expense_bonus += other.first_expense_bonus;
        self.streak_bonus += other.streak_bonus;
        self.harvest_bonus += other.harvest_bonus;
        self.level_up_bonus += other.level_up_bonus;
    }
}

impl RewardBreakdown {
    pub fn total(&self) -> u32 {
        self.base + self.first_expense_bonus + self.streak_bonus + self.harvest_bonus + self.level_up_bonus
    }

    pub fn lines(&self) -> Vec<(&'static str, u32)> {
        [
            ("base", self.base),
            ("primer gasto", self.first_expense_bonus),
            ("racha", self.streak_bonus),
            ("cosecha sorpresa", self.harvest_bonus),
            ("subida de nivel", self.level_up_bonus),
        ]
        .into_iter()
        .filter(|(_, v)| *v > 0)
        .collect()
    }
}

/// Points for saving one expense, streak updated in place.
///
/// `is_first` is true when the user had no expenses before this one. The
/// level-up bonus is not included; the caller adds it after re-evaluating the level.
pub fn expense_reward(
    is_formal: bool,
    is_first: bool,
    day: NaiveDate,
    streak: &mut Streak,
    dice: &mut impl Dice,
) -> RewardBreakdown {
    let mut out = RewardBreakdown::default();

    if is_formal {
        out.base = reward(RewardAction::FormalExpense, dice);
        advance_streak(streak, day);
        out.streak_bonus = streak_bonus(streak.count);
        out.harvest_bonus = surprise_harvest(dice).unwrap_or(0);
    } else {
        out.base = reward(RewardAction::InformalExpense, dice);
    }

    if is_first {
        out.first_expense_bonus = FIRST_EXPENSE_BONUS;
    }
    out
}
