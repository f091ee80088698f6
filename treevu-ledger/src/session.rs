//! Per-user session: the in-memory slices plus the store they are written to.
//!
//! Every committed mutation validates first, then updates memory, then writes
//! the touched slices. Validation failures leave both memory and the store
//! untouched.

use anyhow::Result;
use chrono::{DateTime, Datelike, Utc};
use tracing::{debug, info};
use treevu_core::expense::round2;
use treevu_core::metrics::{self, MetricsSnapshot};
use treevu_core::rewards::{expense_reward, reward, RewardAction, RewardBreakdown};
use treevu_core::tax::{self, TaxEstimate, TaxTable};
use treevu_core::time::lima_date;
use treevu_core::wizard::{DivertDraft, SavingOffer};
use treevu_core::{
    Budget, BudgetStatus, Contribution, CorporatePolicy, Dice, DivertedExpense, Expense, ExpenseDraft, Goal, Inbox,
    Level, Mission, MissionMetric, NotificationKind, PolicyViolation, Tribe, TreevuError, UserProgress,
};

use crate::analytics::{emit, AnalyticsEvent, AnalyticsSink, NoopSink};
use crate::store::{KeyValueStore, Slice, SliceStore};

/// Share of a discretionary expense suggested for a savings goal
pub const SAVING_SUGGESTION_SHARE: f64 = 0.10;

/// Result of saving one or more expenses
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    pub saved_ids: Vec<String>,
    /// Summed over every saved expense
    pub reward: RewardBreakdown,
    pub level_up: Option<Level>,
    pub offer: Option<SavingOffer>,
    pub warnings: Vec<PolicyViolation>,
    pub budget_status: BudgetStatus,
    pub completed_missions: Vec<String>,
}

fn fresh_id(prefix: &str, now: DateTime<Utc>, taken: impl Fn(&str) -> bool) -> String {
    let base = format!("{prefix}-{}", now.timestamp_millis());
    if !taken(&base) {
        return base;
    }
    (2u32..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or(base)
}

fn not_found(kind: &'static str, id: &str) -> TreevuError {
    TreevuError::NotFound { kind, id: id.to_string() }
}

pub struct UserSession<S, D> {
    store: SliceStore<S>,
    display_name: String,
    dice: D,
    policy: CorporatePolicy,
    analytics: Box<dyn AnalyticsSink>,

    expenses: Vec<Expense>,
    diverted: Vec<DivertedExpense>,
    goals: Vec<Goal>,
    budget: Budget,
    user: UserProgress,
    tribes: Vec<Tribe>,
    notifications: Inbox,
}

impl<S: KeyValueStore, D: Dice> UserSession<S, D> {
    /// Load every slice for `user_id`; missing slices start empty.
    pub fn open(user_id: impl Into<String>, display_name: impl Into<String>, store: S, dice: D) -> Result<Self> {
        let store = SliceStore::new(user_id, store);
        let policy = CorporatePolicy::default();

        let mut expenses: Vec<Expense> = store.load(Slice::Expenses)?;
        for e in &mut expenses {
            e.normalize();
            policy.annotate(e);
        }

        let session = Self {
            display_name: display_name.into(),
            dice,
            policy,
            analytics: Box::new(NoopSink),
            expenses,
            diverted: store.load(Slice::Diverted)?,
            goals: store.load(Slice::Goals)?,
            budget: store.load(Slice::Budget)?,
            user: store.load(Slice::User)?,
            tribes: store.load(Slice::Tribes)?,
            notifications: store.load(Slice::Notifications)?,
            store,
        };
        info!(
            user = %session.user_id(),
            expenses = session.expenses.len(),
            goals = session.goals.len(),
            "session opened"
        );
        Ok(session)
    }

    pub fn with_policy(mut self, policy: CorporatePolicy) -> Self {
        for e in &mut self.expenses {
            policy.annotate(e);
        }
        self.policy = policy;
        self
    }

    pub fn with_analytics(mut self, sink: Box<dyn AnalyticsSink>) -> Self {
        self.analytics = sink;
        self
    }

    pub fn user_id(&self) -> &str {
        self.store.user_id()
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn store(&self) -> &S {
        self.store.inner()
    }

    pub fn expenses(&self) -> &[Expense] {
        &self.expenses
    }

    pub fn expense(&self, id: &str) -> Option<&Expense> {
        self.expenses.iter().find(|e| e.id == id)
    }

    pub fn diverted(&self) -> &[DivertedExpense] {
        &self.diverted
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    pub fn active_goals(&self) -> impl Iterator<Item = &Goal> {
        self.goals.iter().filter(|g| g.is_active())
    }

    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    pub fn progress(&self) -> &UserProgress {
        &self.user
    }

    pub fn tribes(&self) -> &[Tribe] {
        &self.tribes
    }

    pub fn notifications(&self) -> &Inbox {
        &self.notifications
    }

    pub fn policy(&self) -> &CorporatePolicy {
        &self.policy
    }

    // ---- derived ----

    pub fn metrics(&self, now: DateTime<Utc>) -> MetricsSnapshot {
        metrics::snapshot(&self.expenses, lima_date(now))
    }

    pub fn budget_status(&self, now: DateTime<Utc>) -> BudgetStatus {
        self.budget.status(&self.expenses, lima_date(now))
    }

    /// Tax estimate over the expenses dated in `year`.
    pub fn tax_estimate(&self, year: i32, annual_income: f64, table: &TaxTable) -> TaxEstimate {
        let in_year: Vec<Expense> = self.expenses.iter().filter(|e| e.date.year() == year).cloned().collect();
        tax::estimate(&in_year, annual_income, table)
    }

    // ---- expenses ----

    /// Save drafts produced by the capture wizard and apply the reward rules.
    ///
    /// All drafts are validated before anything is written.
    pub fn save_expenses(&mut self, drafts: Vec<ExpenseDraft>, now: DateTime<Utc>) -> Result<SaveOutcome> {
        if drafts.is_empty() {
            return Err(TreevuError::MissingField("expenses").into());
        }
        for d in &drafts {
            d.validate()?;
        }

        let today = lima_date(now);
        let budget_before = self.budget.status(&self.expenses, today);
        let mut outcome = SaveOutcome {
            saved_ids: Vec::new(),
            reward: RewardBreakdown::default(),
            level_up: None,
            offer: None,
            warnings: Vec::new(),
            budget_status: budget_before,
            completed_missions: Vec::new(),
        };

        for draft in drafts {
            let is_first = self.expenses.is_empty() && self.user.expense_count == 0 && self.user.prestige == 0;
            let id = fresh_id("exp", now, |c| self.expenses.iter().any(|e| e.id == c));
            let mut expense = Expense::from_draft(id.clone(), draft)?;
            self.policy.annotate(&mut expense);

            let mut points = expense_reward(expense.is_formal, is_first, today, &mut self.user.streak, &mut self.dice);
            self.user.expense_count += 1;
            if expense.is_formal {
                self.user.formal_expense_count += 1;
            }
            if points.harvest_bonus > 0 {
                self.notifications.push(
                    NotificationKind::SurpriseHarvest,
                    format!("¡Cosecha sorpresa! Ganaste {} treevüs extra.", points.harvest_bonus),
                    now,
                );
            }
            if !expense.policy_violations.is_empty() {
                let text: Vec<String> = expense.policy_violations.iter().map(|v| v.message()).collect();
                self.notifications.push(NotificationKind::PolicyWarning, text.join(" · "), now);
                outcome.warnings.extend(expense.policy_violations.iter().cloned());
            }

            let event = self
                .event("expense_added", now)
                .with("expense_id", id.as_str())
                .with("total", expense.total)
                .with("category", expense.category.as_str())
                .with("is_formal", expense.is_formal);
            let formal = expense.is_formal;
            self.expenses.push(expense);
            self.user.formality_index = metrics::formality_index(&self.expenses);

            if let Some(level) = self.user.evaluate_level() {
                points.level_up_bonus = reward(RewardAction::LevelUp, &mut self.dice);
                outcome.level_up = Some(level);
                self.notifications.push(
                    NotificationKind::LevelUp,
                    format!("¡Subiste a {}! +{} treevüs.", level.name(), points.level_up_bonus),
                    now,
                );
                self.track(self.event("level_up", now).with("level", level.name()));
            }

            self.user.credit(points.total());
            outcome.reward += points;
            if formal {
                outcome.completed_missions.extend(self.record_mission(MissionMetric::FormalExpenses, now));
            }
            self.track(event.with("points", points.total()));
            debug!(%id, points = points.total(), "expense saved");
            outcome.saved_ids.push(id);
        }

        self.sync_tribe_balances();

        let status = self.budget.status(&self.expenses, today);
        if status > budget_before && status >= BudgetStatus::NearLimit {
            let message = match status {
                BudgetStatus::Exceeded => format!(
                    "Superaste tu presupuesto mensual de S/ {:.2}.",
                    self.budget.monthly_limit
                ),
                _ => format!(
                    "Llevas el {:.0}% de tu presupuesto mensual.",
                    self.budget.alert_threshold * 100.0
                ),
            };
            self.notifications.push(NotificationKind::BudgetAlert, message, now);
        }
        outcome.budget_status = status;
        outcome.offer = self.saving_offer(&outcome.saved_ids);

        self.persist(&[Slice::Expenses, Slice::User, Slice::Tribes, Slice::Notifications])?;
        info!(saved = outcome.saved_ids.len(), points = outcome.reward.total(), "expenses committed");
        Ok(outcome)
    }

    /// Offer to divert part of a discretionary expense into an active goal.
    fn saving_offer(&self, saved_ids: &[String]) -> Option<SavingOffer> {
        let goal_ids: Vec<String> = self.active_goals().map(|g| g.id.clone()).collect();
        if goal_ids.is_empty() {
            return None;
        }
        let expense = saved_ids
            .iter()
            .filter_map(|id| self.expense(id))
            .find(|e| e.category.is_discretionary() && e.total > 0.0)?;
        Some(SavingOffer {
            expense_id: expense.id.clone(),
            suggested_amount: round2(expense.total * SAVING_SUGGESTION_SHARE).max(0.01),
            goal_ids,
        })
    }

    /// Manual edit; derived fields and the formality index are recomputed. No points are awarded.
    pub fn edit_expense(&mut self, id: &str, draft: ExpenseDraft, now: DateTime<Utc>) -> Result<&Expense> {
        draft.validate()?;
        let idx = self
            .expenses
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| not_found("expense", id))?;

        self.expenses[idx].apply_edit(draft)?;
        self.policy.annotate(&mut self.expenses[idx]);
        self.user.formality_index = metrics::formality_index(&self.expenses);
        self.track(self.event("expense_edited", now).with("expense_id", id));
        self.persist(&[Slice::Expenses, Slice::User])?;
        Ok(&self.expenses[idx])
    }

    /// Delete by id. Progress counters and the level are kept.
    pub fn delete_expense(&mut self, id: &str, now: DateTime<Utc>) -> Result<Expense> {
        let idx = self
            .expenses
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| not_found("expense", id))?;
        let removed = self.expenses.remove(idx);
        self.user.formality_index = metrics::formality_index(&self.expenses);
        self.track(self.event("expense_deleted", now).with("expense_id", id));
        self.persist(&[Slice::Expenses, Slice::User])?;
        Ok(removed)
    }

    /// Record a skipped purchase, contributing it to the named goal if any.
    pub fn divert(&mut self, draft: DivertDraft, now: DateTime<Utc>) -> Result<DivertedExpense> {
        draft.validate()?;
        if let Some(gid) = &draft.goal_id {
            let goal = self.goal(gid)?;
            if !goal.is_active() {
                return Err(TreevuError::GoalNotActive(gid.clone()).into());
            }
        }

        if let Some(gid) = &draft.goal_id {
            self.apply_contribution(gid, draft.amount, now)?;
        }

        let id = fresh_id("div", now, |c| self.diverted.iter().any(|d| d.id == c));
        let record = DivertedExpense {
            id,
            description: draft.description.trim().to_string(),
            amount: draft.amount,
            date: draft.date,
            goal_id: draft.goal_id,
        };
        self.diverted.push(record.clone());
        self.track(
            self.event("expense_diverted", now)
                .with("amount", record.amount)
                .with("has_goal", record.goal_id.is_some()),
        );
        self.persist(&[Slice::Diverted, Slice::Goals, Slice::Notifications])?;
        Ok(record)
    }

    // ---- goals ----

    pub fn goal(&self, id: &str) -> Result<&Goal> {
        Ok(self.goals.iter().find(|g| g.id == id).ok_or_else(|| not_found("goal", id))?)
    }

    fn goal_mut(&mut self, id: &str) -> Result<&mut Goal> {
        Ok(self.goals.iter_mut().find(|g| g.id == id).ok_or_else(|| not_found("goal", id))?)
    }

    pub fn add_goal(&mut self, name: &str, target_amount: f64, icon: &str, now: DateTime<Utc>) -> Result<Goal> {
        let id = fresh_id("goal", now, |c| self.goals.iter().any(|g| g.id == c));
        let goal = Goal::new(id, name.trim(), target_amount, icon, now)?;
        self.goals.push(goal.clone());
        self.track(self.event("goal_created", now).with("target", target_amount));
        self.persist(&[Slice::Goals])?;
        Ok(goal)
    }

    fn apply_contribution(&mut self, id: &str, amount: f64, now: DateTime<Utc>) -> Result<Contribution> {
        let goal = self.goal_mut(id)?;
        let c = goal.contribute(amount)?;
        if c.completed_now {
            let message = format!("¡Completaste tu meta \"{}\"!", goal.name);
            self.notifications.push(NotificationKind::GoalCompleted, message, now);
        }
        self.track(
            self.event("goal_contribution", now)
                .with("goal_id", id)
                .with("applied", c.applied)
                .with("completed", c.completed_now),
        );
        Ok(c)
    }

    pub fn contribute_to_goal(&mut self, id: &str, amount: f64, now: DateTime<Utc>) -> Result<Contribution> {
        let c = self.apply_contribution(id, amount, now)?;
        self.persist(&[Slice::Goals, Slice::Notifications])?;
        Ok(c)
    }

    pub fn abandon_goal(&mut self, id: &str, now: DateTime<Utc>) -> Result<()> {
        self.goal_mut(id)?.abandon()?;
        self.track(self.event("goal_abandoned", now).with("goal_id", id));
        self.persist(&[Slice::Goals])
    }

    // ---- budget ----

    pub fn set_budget(&mut self, monthly_limit: f64) -> Result<Budget> {
        self.budget = Budget::new(monthly_limit)?;
        self.persist(&[Slice::Budget])?;
        Ok(self.budget)
    }

    // ---- progress ----

    /// Credit a finished lesson once. `None` if it was already completed.
    pub fn complete_lesson(&mut self, lesson_id: &str, now: DateTime<Utc>) -> Result<Option<u32>> {
        let lesson_id = lesson_id.trim();
        if lesson_id.is_empty() {
            return Err(TreevuError::MissingField("lesson").into());
        }
        if !self.user.complete_lesson(lesson_id) {
            return Ok(None);
        }
        let points = reward(RewardAction::LessonCompleted, &mut self.dice);
        self.user.credit(points);
        self.record_mission(MissionMetric::LessonsCompleted, now);
        self.sync_tribe_balances();
        self.track(self.event("lesson_completed", now).with("lesson_id", lesson_id));
        self.persist(&[Slice::User, Slice::Tribes, Slice::Notifications])?;
        Ok(Some(points))
    }

    /// Reset to the first tier after reaching the top one. Returns the new prestige count.
    pub fn prestige(&mut self, now: DateTime<Utc>) -> Result<u32> {
        if !self.user.can_prestige() {
            return Err(TreevuError::PrestigeLocked(Level::Forest.name()).into());
        }
        self.user.prestige();
        self.track(self.event("prestige", now).with("prestige", self.user.prestige));
        self.persist(&[Slice::User])?;
        Ok(self.user.prestige)
    }

    // ---- squad ----

    pub fn tribe(&self, id: &str) -> Result<&Tribe> {
        Ok(self.tribes.iter().find(|t| t.id == id).ok_or_else(|| not_found("tribe", id))?)
    }

    fn tribe_mut(&mut self, id: &str) -> Result<&mut Tribe> {
        Ok(self.tribes.iter_mut().find(|t| t.id == id).ok_or_else(|| not_found("tribe", id))?)
    }

    /// Create a squad with this user plus `others` as `(user_id, name)` pairs.
    pub fn create_tribe(&mut self, name: &str, others: &[(String, String)], now: DateTime<Utc>) -> Result<Tribe> {
        if name.trim().is_empty() {
            return Err(TreevuError::MissingField("name").into());
        }
        let id = fresh_id("tribe", now, |c| self.tribes.iter().any(|t| t.id == c));
        let mut tribe = Tribe::new(id, name.trim());
        tribe.add_member(self.user_id(), self.display_name.clone(), self.user.balance);
        for (uid, member_name) in others {
            tribe.add_member(uid.clone(), member_name.clone(), 0);
        }
        self.tribes.push(tribe.clone());
        self.persist(&[Slice::Tribes])?;
        Ok(tribe)
    }

    /// Send kudos; the sender earns the bonus. Returns the new balance.
    pub fn send_kudos(&mut self, tribe_id: &str, to: &str, message: &str, now: DateTime<Utc>) -> Result<u64> {
        let user_id = self.user_id().to_string();
        let balance = self.user.balance;

        let tribe = self.tribe_mut(tribe_id)?;
        tribe.sync_balance(&user_id, balance);
        let done_before = completed_missions(tribe);
        let new_balance = tribe.send_kudos(&user_id, to, message, now)?;
        let finished = newly_completed(tribe, &done_before);

        self.user.balance = new_balance;
        for (id, title) in finished {
            self.notify_mission(&id, &title, now);
        }
        self.sync_tribe_balances();
        self.track(self.event("kudos_sent", now).with("tribe_id", tribe_id).with("to", to));
        self.persist(&[Slice::User, Slice::Tribes, Slice::Notifications])?;
        Ok(new_balance)
    }

    /// Move treevüs from this user's balance into the squad pool. Returns the new balance.
    pub fn contribute_to_pool(&mut self, tribe_id: &str, amount: u64, now: DateTime<Utc>) -> Result<u64> {
        let user_id = self.user_id().to_string();
        let balance = self.user.balance;

        let tribe = self.tribe_mut(tribe_id)?;
        tribe.sync_balance(&user_id, balance);
        let new_balance = tribe.contribute(&user_id, amount)?;

        self.user.balance = new_balance;
        self.sync_tribe_balances();
        self.track(self.event("pool_contribution", now).with("tribe_id", tribe_id).with("amount", amount));
        self.persist(&[Slice::User, Slice::Tribes])?;
        Ok(new_balance)
    }

    pub fn add_mission(
        &mut self,
        tribe_id: &str,
        title: &str,
        metric: MissionMetric,
        target: u32,
        now: DateTime<Utc>,
    ) -> Result<Mission> {
        if title.trim().is_empty() {
            return Err(TreevuError::MissingField("title").into());
        }
        let tribe = self.tribe_mut(tribe_id)?;
        let taken: Vec<String> = tribe.missions.iter().map(|m| m.id.clone()).collect();
        let id = fresh_id("mission", now, |c| taken.iter().any(|t| t == c));
        let mission = Mission::new(id, title.trim(), metric, target);
        tribe.add_mission(mission.clone());
        self.persist(&[Slice::Tribes])?;
        Ok(mission)
    }

    /// Count one unit of `metric` in every squad this user belongs to.
    fn record_mission(&mut self, metric: MissionMetric, now: DateTime<Utc>) -> Vec<String> {
        let user_id = self.user_id().to_string();
        let mut finished = Vec::new();
        for tribe in self.tribes.iter_mut().filter(|t| t.member(&user_id).is_some()) {
            for id in tribe.record_metric(metric, 1) {
                let title = tribe
                    .missions
                    .iter()
                    .find(|m| m.id == id)
                    .map(|m| m.title.clone())
                    .unwrap_or_default();
                finished.push((id, title));
            }
        }
        for (id, title) in &finished {
            self.notify_mission(id, title, now);
        }
        finished.into_iter().map(|(id, _)| id).collect()
    }

    fn notify_mission(&mut self, id: &str, title: &str, now: DateTime<Utc>) {
        debug!(mission = %id, "mission completed");
        self.notifications
            .push(NotificationKind::MissionCompleted, format!("Misión cumplida: {title}"), now);
    }

    fn sync_tribe_balances(&mut self) {
        let user_id = self.user_id().to_string();
        let balance = self.user.balance;
        for tribe in &mut self.tribes {
            tribe.sync_balance(&user_id, balance);
        }
    }

    // ---- notifications ----

    pub fn mark_notifications_read(&mut self) -> Result<usize> {
        let n = self.notifications.mark_all_read();
        if n > 0 {
            self.persist(&[Slice::Notifications])?;
        }
        Ok(n)
    }

    // ---- plumbing ----

    fn event(&self, name: &str, now: DateTime<Utc>) -> AnalyticsEvent {
        AnalyticsEvent::new(name, now, self.user_id(), self.user.level)
    }

    fn track(&self, event: AnalyticsEvent) {
        emit(self.analytics.as_ref(), event);
    }

    fn persist(&mut self, slices: &[Slice]) -> Result<()> {
        for slice in slices {
            match slice {
                Slice::Expenses => self.store.save(*slice, &self.expenses)?,
                Slice::Diverted => self.store.save(*slice, &self.diverted)?,
                Slice::Goals => self.store.save(*slice, &self.goals)?,
                Slice::Budget => self.store.save(*slice, &self.budget)?,
                Slice::User => self.store.save(*slice, &self.user)?,
                Slice::Tribes => self.store.save(*slice, &self.tribes)?,
                Slice::Notifications => self.store.save(*slice, &self.notifications)?,
            }
        }
        Ok(())
    }
}

fn completed_missions(tribe: &Tribe) -> Vec<String> {
    tribe.missions.iter().filter(|m| m.completed).map(|m| m.id.clone()).collect()
}

fn newly_completed(tribe: &Tribe, before: &[String]) -> Vec<(String, String)> {
    tribe
        .missions
        .iter()
        .filter(|m| m.completed && !before.contains(&m.id))
        .map(|m| (m.id.clone(), m.title.clone()))
        .collect()
}
