//! Savings goals

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ensure_positive, Result, TreevuError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum GoalStatus {
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "abandoned")]
    Abandoned,
}

/// A savings goal funded by contributions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Goal {
    pub id: String,
    pub name: String,
    pub target_amount: f64,
    /// Never exceeds `target_amount`
    pub current_amount: f64,
    pub icon: String,
    pub created_at: DateTime<Utc>,
    pub status: GoalStatus,
}

/// Outcome of a single contribution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contribution {
    /// Amount actually applied after clamping
    pub applied: f64,
    pub completed_now: bool,
}

impl Goal {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        target_amount: f64,
        icon: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TreevuError::MissingField("name"));
        }
        ensure_positive("target_amount", target_amount)?;
        Ok(Self {
            id: id.into(),
            name,
            target_amount,
            current_amount: 0.0,
            icon: icon.into(),
            created_at,
            status: GoalStatus::Active,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == GoalStatus::Active
    }

    /// Add money to the goal, clamping at the target.
    pub fn contribute(&mut self, amount: f64) -> Result<Contribution> {
        ensure_positive("amount", amount)?;
        if !self.is_active() {
            return Err(TreevuError::GoalNotActive(self.id.clone()));
        }

        let before = self.current_amount;
        self.current_amount = (self.current_amount + amount).min(self.target_amount);
        let completed_now = self.current_amount >= self.target_amount;
        if completed_now {
            self.status = GoalStatus::Completed;
        }

        Ok(Contribution {
            applied: self.current_amount - before,
            completed_now,
        })
    }

    pub fn abandon(&mut self) -> Result<()> {
        if !self.is_active() {
            return Err(TreevuError::GoalNotActive(self.id.clone()));
        }
        self.status = GoalStatus::Abandoned;
        Ok(())
    }

    /// Progress in 0.0 - 1.0
    pub fn progress(&self) -> f64 {
        (self.current_amount / self.target_amount).clamp(0.0, 1.0)
    }

    pub fn remaining(&self) -> f64 {
        (self.target_amount - self.current_amount).max(0.0)
    }
}
