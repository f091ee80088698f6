//! Squad (team) state: members, kudos, the shared treevü pool and missions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TreevuError};

/// Points a sender earns for each kudo given to a teammate
pub const KUDOS_SENDER_POINTS: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Member {
    pub user_id: String,
    pub name: String,
    pub balance: u64,
    #[serde(default)]
    pub kudos_received: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Kudo {
    pub from: String,
    pub to: String,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}

/// Metric a mission counts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MissionMetric {
    FormalExpenses,
    KudosSent,
    LessonsCompleted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mission {
    pub id: String,
    pub title: String,
    pub metric: MissionMetric,
    pub target: u32,
    pub progress: u32,
    pub completed: bool,
}

impl Mission {
    pub fn new(id: impl Into<String>, title: impl Into<String>, metric: MissionMetric, target: u32) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            metric,
            target: target.max(1),
            progress: 0,
            completed: false,
        }
    }

    /// Count `by` towards the mission; returns true if this completed it.
    pub fn record(&mut self, by: u32) -> bool {
        if self.completed {
            return false;
        }
        self.progress = (self.progress + by).min(self.target);
        self.completed = self.progress >= self.target;
        self.completed
    }
}

/// A small team of users
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tribe {
    pub id: String,
    pub name: String,
    pub members: Vec<Member>,
    /// Treevüs contributed to the team pool
    pub pool: u64,
    pub kudos: Vec<Kudo>,
    pub missions: Vec<Mission>,
}

impl Tribe {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            members: Vec::new(),
            pool: 0,
            kudos: Vec::new(),
            missions: Vec::new(),
        }
    }

    pub fn add_member(&mut self, user_id: impl Into<String>, name: impl Into<String>, balance: u64) {
        let user_id = user_id.into();
        if self.member(&user_id).is_some() {
            return;
        }
        self.members.push(Member {
            user_id,
            name: name.into(),
            balance,
            kudos_received: 0,
        });
    }

    pub fn member(&self, user_id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    fn member_mut(&mut self, user_id: &str) -> Result<&mut Member> {
        let tribe = self.id.clone();
        self.members
            .iter_mut()
            .find(|m| m.user_id == user_id)
            .ok_or_else(|| TreevuError::NotAMember { member: user_id.to_string(), tribe })
    }

    /// Send a kudo. Free for the sender, who earns +5; returns the sender's new balance.
    pub fn send_kudos(&mut self, from: &str, to: &str, message: impl Into<String>, now: DateTime<Utc>) -> Result<u64> {
        if from == to {
            return Err(TreevuError::SelfKudos);
        }
        self.member_mut(to)?;
        self.member_mut(from)?;

        self.member_mut(to)?.kudos_received += 1;
        let sender = self.member_mut(from)?;
        sender.balance += u64::from(KUDOS_SENDER_POINTS);
        let balance = sender.balance;

        self.kudos.push(Kudo {
            from: from.to_string(),
            to: to.to_string(),
            message: message.into(),
            sent_at: now,
        });
        self.record_metric(MissionMetric::KudosSent, 1);
        Ok(balance)
    }

    /// Move treevüs from a member into the pool, 1:1.
    pub fn contribute(&mut self, from: &str, amount: u64) -> Result<u64> {
        if amount == 0 {
            return Err(TreevuError::InvalidAmount { field: "amount", value: 0.0 });
        }
        let sender = self.member_mut(from)?;
        if sender.balance < amount {
            return Err(TreevuError::InsufficientBalance {
                available: sender.balance,
                requested: amount,
            });
        }
        sender.balance -= amount;
        let balance = sender.balance;
        self.pool += amount;
        Ok(balance)
    }

    /// Keep a member's mirrored balance in sync with their own progress record.
    pub fn sync_balance(&mut self, user_id: &str, balance: u64) {
        if let Ok(m) = self.member_mut(user_id) {
            m.balance = balance;
        }
    }

    pub fn add_mission(&mut self, mission: Mission) {
        self.missions.push(mission);
    }

    /// Advance every open mission tracking `metric`; returns ids completed by this call.
    pub fn record_metric(&mut self, metric: MissionMetric, by: u32) -> Vec<String> {
        self.missions
            .iter_mut()
            .filter(|m| m.metric == metric)
            .filter_map(|m| m.record(by).then(|| m.id.clone()))
            .collect()
    }
}
