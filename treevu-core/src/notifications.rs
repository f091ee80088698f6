//! In-app notifications (persisted as the `notifications` slice)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    LevelUp,
    SurpriseHarvest,
    BudgetAlert,
    GoalCompleted,
    PolicyWarning,
    MissionCompleted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

/// Newest-last notification list with a fixed cap
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Inbox {
    items: Vec<Notification>,
}

impl Inbox {
    pub const MAX_ITEMS: usize = 50;

    pub fn push(&mut self, kind: NotificationKind, message: impl Into<String>, now: DateTime<Utc>) {
        let id = format!("ntf-{}-{}", now.timestamp_millis(), self.items.len());
        self.items.push(Notification {
            id,
            kind,
            message: message.into(),
            created_at: now,
            read: false,
        });
        if self.items.len() > Self::MAX_ITEMS {
            let overflow = self.items.len() - Self::MAX_ITEMS;
            self.items.drain(..overflow);
        }
    }

    pub fn unread(&self) -> impl Iterator<Item = &Notification> {
        self.items.iter().filter(|n| !n.read)
    }

    pub fn all(&self) -> &[Notification] {
        &self.items
    }

    pub fn mark_all_read(&mut self) -> usize {
        let mut n = 0;
        for item in self.items.iter_mut().filter(|i| !i.read) {
            item.read = true;
            n += 1;
        }
        n
    }
}
