//! Add-expense wizard as an explicit state machine.
//!
//! `transition` is pure: it maps a state and an event to the next state and
//! performs no I/O. The capture driver in `treevu-ledger` watches
//! [`WizardState::awaiting`] to know which collaborator call to make and feeds
//! the result back in as an event.
//!
//! ```text
//! capture -> initializing | manual_entry | divert_expense | analyzing
//! initializing -> analyzing
//! analyzing -> verification_result | quick_confirm | review | review_products | suggest_split
//! form steps -> saving -> save_success -> saving_opportunity? -> closed
//! any -> error -> (dismiss) step that raised it
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::error::{ensure_positive, TreevuError};
use crate::expense::{round2, Category, ExpenseDraft, LineItem, ReceiptType};
use crate::rewards::RewardBreakdown;

/// Extraction confidence at or above which the lightweight confirmation is shown
pub const QUICK_CONFIRM_CONFIDENCE: f64 = 0.85;

/// What the collaborator is asked to do with an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Check that the receipt is usable for tax deduction
    Verify,
    /// Extract structured receipt fields
    Receipt,
    /// Extract a product list
    Products,
    /// Group products into category-tagged sub-expenses
    Split,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPath {
    Camera,
    /// The image is already in hand, so analysis starts right away
    Upload(ScanMode),
    Manual,
    Divert,
}

/// Collaborator verdict on a receipt image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptCheck {
    pub usable: bool,
    pub receipt_type: Option<ReceiptType>,
    pub ruc: Option<String>,
    pub issues: Vec<String>,
}

/// Structured fields extracted from a receipt; anything may be missing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScannedReceipt {
    pub merchant_name: Option<String>,
    pub ruc: Option<String>,
    pub date: Option<NaiveDate>,
    pub total: Option<f64>,
    pub category: Option<Category>,
    pub receipt_type: Option<ReceiptType>,
    /// 0.0 - 1.0
    pub confidence: f64,
}

impl ScannedReceipt {
    /// Every field the quick confirmation needs is present.
    pub fn is_complete(&self) -> bool {
        self.merchant_name.as_deref().is_some_and(|m| !m.trim().is_empty())
            && self.total.is_some_and(|t| t.is_finite() && t >= 0.0)
            && self.date.is_some()
    }

    pub fn is_high_confidence(&self) -> bool {
        self.confidence >= QUICK_CONFIRM_CONFIDENCE && self.is_complete()
    }

    /// Seed a draft, falling back to `today` and neutral defaults.
    pub fn to_draft(&self, today: NaiveDate) -> ExpenseDraft {
        let mut draft = ExpenseDraft::new(
            self.merchant_name.clone().unwrap_or_default(),
            self.total.unwrap_or(0.0),
            self.date.unwrap_or(today),
        );
        draft.ruc = self.ruc.clone();
        if let Some(c) = self.category {
            draft.category = c;
        }
        if let Some(r) = self.receipt_type {
            draft.receipt_type = r;
        }
        draft
    }
}

/// A product list extracted from a receipt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScannedProducts {
    pub merchant_name: Option<String>,
    pub ruc: Option<String>,
    pub date: Option<NaiveDate>,
    pub receipt_type: Option<ReceiptType>,
    pub items: Vec<LineItem>,
}

/// One suggested sub-expense
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitGroup {
    pub category: Category,
    pub items: Vec<LineItem>,
}

impl SplitGroup {
    pub fn total(&self) -> f64 {
        round2(self.items.iter().map(|i| i.amount).sum())
    }
}

/// Fields of a diverted (skipped) purchase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivertDraft {
    pub description: String,
    pub amount: f64,
    pub date: NaiveDate,
    pub goal_id: Option<String>,
}

impl DivertDraft {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            description: String::new(),
            amount: 0.0,
            date,
            goal_id: None,
        }
    }

    pub fn validate(&self) -> Result<(), TreevuError> {
        if self.description.trim().is_empty() {
            return Err(TreevuError::MissingField("description"));
        }
        ensure_positive("amount", self.amount)?;
        Ok(())
    }
}

/// What the driver must persist when the wizard reaches `Saving`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SaveRequest {
    Expenses(Vec<ExpenseDraft>),
    Diverted(DivertDraft),
}

/// Prompt offered after saving a discretionary expense
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingOffer {
    pub expense_id: String,
    pub suggested_amount: f64,
    pub goal_ids: Vec<String>,
}

/// Which collaborator or step failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Camera,
    Verification,
    Extraction,
    Products,
    Split,
    RucLookup,
    Save,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaboratorFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl CollaboratorFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into() }
    }

    /// User-facing message (es-PE). Retrying is always a manual action.
    pub fn message(&self) -> String {
        let head = match self.kind {
            FailureKind::Camera => "No pudimos acceder a la cámara.",
            FailureKind::Verification => "No pudimos verificar tu comprobante.",
            FailureKind::Extraction => "No pudimos leer los datos del comprobante.",
            FailureKind::Products => "No pudimos leer la lista de productos.",
            FailureKind::Split => "No pudimos sugerir una división del gasto.",
            FailureKind::RucLookup => "No pudimos validar el RUC.",
            FailureKind::Save => "No pudimos guardar tu gasto.",
        };
        format!("{head} Inténtalo de nuevo.")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WizardState {
    Capture,
    /// Camera starting up
    Initializing,
    ManualEntry { draft: ExpenseDraft },
    DivertExpense { draft: DivertDraft },
    Analyzing { mode: ScanMode, back: Box<WizardState> },
    VerificationResult { check: ReceiptCheck },
    QuickConfirm { draft: ExpenseDraft, confidence: f64 },
    Review { draft: ExpenseDraft },
    ReviewProducts { base: ExpenseDraft, items: Vec<LineItem> },
    SuggestSplit { base: ExpenseDraft, items: Vec<LineItem>, groups: Vec<SplitGroup> },
    /// `back` is the form step the request was submitted from
    Saving { request: SaveRequest, back: Box<WizardState> },
    SaveSuccess {
        saved_ids: Vec<String>,
        reward: RewardBreakdown,
        offer: Option<SavingOffer>,
    },
    SavingOpportunity { offer: SavingOffer },
    Error { message: String, return_to: Box<WizardState> },
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WizardEvent {
    Start(EntryPath),
    ImageCaptured(ScanMode),
    Verified(Option<ReceiptCheck>),
    Extracted(Option<ScannedReceipt>),
    ProductsExtracted(Option<ScannedProducts>),
    SplitSuggested(Option<Vec<SplitGroup>>),
    /// Replace the draft of the current form step
    EditDraft(ExpenseDraft),
    EditDivert(DivertDraft),
    RucResolved { name: String, category: Option<Category> },
    /// Leave the quick confirmation for the full form
    EditFull,
    RequestSplit,
    AcceptSplit,
    RejectSplit,
    Submit,
    Saved {
        saved_ids: Vec<String>,
        reward: RewardBreakdown,
        offer: Option<SavingOffer>,
    },
    Continue,
    Failed(CollaboratorFailure),
    Dismiss,
    Close,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WizardError {
    #[error("event {event} is not valid in step {state}")]
    InvalidEvent { state: &'static str, event: &'static str },

    #[error(transparent)]
    Validation(#[from] TreevuError),
}

impl WizardState {
    /// Stable step name, matching the product's step ids
    pub fn name(&self) -> &'static str {
        match self {
            WizardState::Capture => "capture",
            WizardState::Initializing => "initializing",
            WizardState::ManualEntry { .. } => "manual_entry",
            WizardState::DivertExpense { .. } => "divert_expense",
            WizardState::Analyzing { .. } => "analyzing",
            WizardState::VerificationResult { .. } => "verification_result",
            WizardState::QuickConfirm { .. } => "quick_confirm",
            WizardState::Review { .. } => "review",
            WizardState::ReviewProducts { .. } => "review_products",
            WizardState::SuggestSplit { .. } => "suggest_split",
            WizardState::Saving { .. } => "saving",
            WizardState::SaveSuccess { .. } => "save_success",
            WizardState::SavingOpportunity { .. } => "saving_opportunity",
            WizardState::Error { .. } => "error",
            WizardState::Closed => "closed",
        }
    }

    /// Collaborator call the driver must make before anything else can happen.
    pub fn awaiting(&self) -> Option<ScanMode> {
        match self {
            WizardState::Analyzing { mode, .. } => Some(*mode),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, WizardState::Closed)
    }

    /// Draft of the current expense form step, if any.
    pub fn draft(&self) -> Option<&ExpenseDraft> {
        match self {
            WizardState::ManualEntry { draft }
            | WizardState::QuickConfirm { draft, .. }
            | WizardState::Review { draft } => Some(draft),
            _ => None,
        }
    }
}

impl WizardEvent {
    pub fn name(&self) -> &'static str {
        match self {
            WizardEvent::Start(_) => "start",
            WizardEvent::ImageCaptured(_) => "image_captured",
            WizardEvent::Verified(_) => "verified",
            WizardEvent::Extracted(_) => "extracted",
            WizardEvent::ProductsExtracted(_) => "products_extracted",
            WizardEvent::SplitSuggested(_) => "split_suggested",
            WizardEvent::EditDraft(_) => "edit_draft",
            WizardEvent::EditDivert(_) => "edit_divert",
            WizardEvent::RucResolved { .. } => "ruc_resolved",
            WizardEvent::EditFull => "edit_full",
            WizardEvent::RequestSplit => "request_split",
            WizardEvent::AcceptSplit => "accept_split",
            WizardEvent::RejectSplit => "reject_split",
            WizardEvent::Submit => "submit",
            WizardEvent::Saved { .. } => "saved",
            WizardEvent::Continue => "continue",
            WizardEvent::Failed(_) => "failed",
            WizardEvent::Dismiss => "dismiss",
            WizardEvent::Close => "close",
        }
    }

    /// Results of asynchronous calls; stale ones are dropped instead of rejected.
    fn is_async_result(&self) -> bool {
        matches!(
            self,
            WizardEvent::Verified(_)
                | WizardEvent::Extracted(_)
                | WizardEvent::ProductsExtracted(_)
                | WizardEvent::SplitSuggested(_)
                | WizardEvent::RucResolved { .. }
                | WizardEvent::Saved { .. }
        )
    }
}

fn analyzing(mode: ScanMode, back: WizardState) -> WizardState {
    WizardState::Analyzing { mode, back: Box::new(back) }
}

/// One draft for the whole product list; the category is the one with the largest spend.
pub fn merge_products(base: &ExpenseDraft, items: &[LineItem]) -> ExpenseDraft {
    let mut by_category: BTreeMap<Category, f64> = BTreeMap::new();
    for item in items {
        *by_category.entry(item.category).or_insert(0.0) += item.amount;
    }
    let mut draft = base.clone();
    draft.total = round2(items.iter().map(|i| i.amount).sum());
    draft.products = items.to_vec();
    if let Some((category, _)) = by_category
        .into_iter()
        .max_by(|a, b| a.1.total_cmp(&b.1))
    {
        draft.category = category;
    }
    draft
}

/// One draft per suggested group.
pub fn split_drafts(base: &ExpenseDraft, groups: &[SplitGroup]) -> Vec<ExpenseDraft> {
    groups
        .iter()
        .filter(|g| !g.items.is_empty())
        .map(|g| {
            let mut draft = base.clone();
            draft.category = g.category;
            draft.total = g.total();
            draft.products = g.items.clone();
            draft
        })
        .collect()
}

fn base_from_products(p: &ScannedProducts, today: NaiveDate) -> ExpenseDraft {
    let mut base = ExpenseDraft::new(p.merchant_name.clone().unwrap_or_default(), 0.0, p.date.unwrap_or(today));
    base.ruc = p.ruc.clone();
    if let Some(r) = p.receipt_type {
        base.receipt_type = r;
    }
    base
}

fn saving(request: SaveRequest, back: &WizardState) -> WizardState {
    WizardState::Saving { request, back: Box::new(back.clone()) }
}

fn submit_expense(draft: &ExpenseDraft, back: &WizardState) -> Result<WizardState, WizardError> {
    draft.validate()?;
    Ok(saving(SaveRequest::Expenses(vec![draft.clone()]), back))
}

fn with_ruc(draft: &ExpenseDraft, name: &str, category: Option<Category>) -> ExpenseDraft {
    let mut d = draft.clone();
    if !name.trim().is_empty() {
        d.merchant_name = name.trim().to_string();
    }
    if let Some(c) = category {
        if d.category == Category::Other {
            d.category = c;
        }
    }
    d
}

/// Pure transition function.
///
/// `today` seeds dates when the collaborator did not return one.
pub fn transition(state: &WizardState, event: WizardEvent, today: NaiveDate) -> Result<WizardState, WizardError> {
    use WizardEvent as E;
    use WizardState as S;

    // Global edges first.
    match (&event, state) {
        (E::Close, _) => return Ok(S::Closed),
        (E::Failed(failure), S::Analyzing { back, .. }) => {
            return Ok(S::Error { message: failure.message(), return_to: back.clone() });
        }
        (E::Failed(failure), S::Saving { back, .. }) => {
            return Ok(S::Error { message: failure.message(), return_to: back.clone() });
        }
        (E::Failed(failure), S::Error { return_to, .. }) => {
            return Ok(S::Error { message: failure.message(), return_to: return_to.clone() });
        }
        (E::Failed(_), S::Closed) => return Ok(S::Closed),
        (E::Failed(failure), S::Initializing) => {
            return Ok(S::Error { message: failure.message(), return_to: Box::new(S::Capture) });
        }
        (E::Failed(failure), other) => {
            return Ok(S::Error { message: failure.message(), return_to: Box::new(other.clone()) });
        }
        _ => {}
    }

    let next = match (state, event) {
        (S::Capture, E::Start(EntryPath::Camera)) => S::Initializing,
        (S::Capture, E::Start(EntryPath::Upload(mode))) => analyzing(mode, S::Capture),
        (S::Capture, E::Start(EntryPath::Manual)) => S::ManualEntry {
            draft: ExpenseDraft::new("", 0.0, today),
        },
        (S::Capture, E::Start(EntryPath::Divert)) => S::DivertExpense {
            draft: DivertDraft::new(today),
        },

        (S::Initializing, E::ImageCaptured(mode)) => analyzing(mode, S::Capture),

        (S::Analyzing { mode: ScanMode::Verify, .. }, E::Verified(Some(check))) => S::VerificationResult { check },
        // Unparseable verdict: skip straight to extraction
        (S::Analyzing { mode: ScanMode::Verify, back }, E::Verified(None)) => {
            S::Analyzing { mode: ScanMode::Receipt, back: back.clone() }
        }

        (S::Analyzing { mode: ScanMode::Receipt, .. }, E::Extracted(Some(scan))) => {
            let draft = scan.to_draft(today);
            if scan.is_high_confidence() {
                S::QuickConfirm { draft, confidence: scan.confidence }
            } else {
                S::Review { draft }
            }
        }
        (S::Analyzing { mode: ScanMode::Receipt, .. }, E::Extracted(None)) => S::Review {
            draft: ExpenseDraft::new("", 0.0, today),
        },

        (S::Analyzing { mode: ScanMode::Products, .. }, E::ProductsExtracted(Some(p))) if !p.items.is_empty() => {
            S::ReviewProducts { base: base_from_products(&p, today), items: p.items }
        }
        (S::Analyzing { mode: ScanMode::Products, .. }, E::ProductsExtracted(_)) => S::Review {
            draft: ExpenseDraft::new("", 0.0, today),
        },

        (S::Analyzing { mode: ScanMode::Split, back }, E::SplitSuggested(groups)) => {
            let groups: Vec<SplitGroup> = groups
                .unwrap_or_default()
                .into_iter()
                .filter(|g| !g.items.is_empty())
                .collect();
            match &**back {
                S::ReviewProducts { base, items } if !groups.is_empty() => S::SuggestSplit {
                    base: base.clone(),
                    items: items.clone(),
                    groups,
                },
                // No usable suggestion: back to the product list
                other => other.clone(),
            }
        }

        (S::VerificationResult { check }, E::Continue) => {
            if check.usable {
                analyzing(ScanMode::Receipt, S::Capture)
            } else {
                let mut draft = ExpenseDraft::new("", 0.0, today);
                draft.ruc = check.ruc.clone();
                draft.receipt_type = check.receipt_type.unwrap_or(ReceiptType::Ticket);
                draft.is_formal = Some(false);
                S::Review { draft }
            }
        }

        (S::ManualEntry { .. }, E::EditDraft(draft)) => S::ManualEntry { draft },
        (S::Review { .. }, E::EditDraft(draft)) => S::Review { draft },
        (S::QuickConfirm { confidence, .. }, E::EditDraft(draft)) => S::QuickConfirm { draft, confidence: *confidence },
        (S::QuickConfirm { draft, .. }, E::EditFull) => S::Review { draft: draft.clone() },

        (S::ManualEntry { draft }, E::RucResolved { name, category }) => S::ManualEntry {
            draft: with_ruc(draft, &name, category),
        },
        (S::Review { draft }, E::RucResolved { name, category }) => S::Review {
            draft: with_ruc(draft, &name, category),
        },
        (S::QuickConfirm { draft, confidence }, E::RucResolved { name, category }) => S::QuickConfirm {
            draft: with_ruc(draft, &name, category),
            confidence: *confidence,
        },

        (S::ManualEntry { draft }, E::Submit)
        | (S::Review { draft }, E::Submit)
        | (S::QuickConfirm { draft, .. }, E::Submit) => submit_expense(draft, state)?,

        (S::DivertExpense { .. }, E::EditDivert(draft)) => S::DivertExpense { draft },
        (S::DivertExpense { draft }, E::Submit) => {
            draft.validate()?;
            saving(SaveRequest::Diverted(draft.clone()), state)
        }

        (S::ReviewProducts { items, .. }, E::EditDraft(draft)) => S::ReviewProducts {
            base: draft,
            items: items.clone(),
        },
        (S::ReviewProducts { .. }, E::RequestSplit) => analyzing(ScanMode::Split, state.clone()),
        (S::ReviewProducts { base, items }, E::Submit) => submit_expense(&merge_products(base, items), state)?,

        (S::SuggestSplit { base, groups, .. }, E::AcceptSplit) => {
            let drafts = split_drafts(base, groups);
            for d in &drafts {
                d.validate()?;
            }
            saving(SaveRequest::Expenses(drafts), state)
        }
        (S::SuggestSplit { base, items, .. }, E::RejectSplit) => S::ReviewProducts {
            base: base.clone(),
            items: items.clone(),
        },

        (S::Saving { .. }, E::Saved { saved_ids, reward, offer }) => S::SaveSuccess { saved_ids, reward, offer },

        (S::SaveSuccess { offer: Some(offer), .. }, E::Continue) => S::SavingOpportunity { offer: offer.clone() },
        (S::SaveSuccess { offer: None, .. }, E::Continue) => S::Closed,
        (S::SavingOpportunity { .. }, E::Continue) => S::Closed,

        (S::Error { return_to, .. }, E::Dismiss) => (**return_to).clone(),

        (current, ev) if ev.is_async_result() => current.clone(),
        (current, ev) => {
            return Err(WizardError::InvalidEvent {
                state: current.name(),
                event: ev.name(),
            });
        }
    };

    Ok(next)
}

/// Owned wizard instance; rejected events leave the state untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Wizard {
    state: WizardState,
}

impl Default for Wizard {
    fn default() -> Self {
        Self::new()
    }
}

impl Wizard {
    pub fn new() -> Self {
        Self { state: WizardState::Capture }
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn apply(&mut self, event: WizardEvent, today: NaiveDate) -> Result<&WizardState, WizardError> {
        self.state = transition(&self.state, event, today)?;
        Ok(&self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    fn step(w: &mut Wizard, e: WizardEvent) -> WizardState {
        w.apply(e, today()).unwrap().clone()
    }

    fn item(name: &str, amount: f64, category: Category) -> LineItem {
        LineItem { name: name.to_string(), amount, category }
    }

    fn scan(confidence: f64) -> ScannedReceipt {
        ScannedReceipt {
            merchant_name: Some("Tottus".to_string()),
            ruc: Some("20508565934".to_string()),
            date: Some(NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()),
            total: Some(84.5),
            category: Some(Category::Food),
            receipt_type: Some(ReceiptType::Boleta),
            confidence,
        }
    }

    #[test]
    fn test_camera_path_to_quick_confirm() {
        let mut w = Wizard::new();
        assert_eq!(step(&mut w, WizardEvent::Start(EntryPath::Camera)), WizardState::Initializing);
        let s = step(&mut w, WizardEvent::ImageCaptured(ScanMode::Receipt));
        assert_eq!(s.awaiting(), Some(ScanMode::Receipt));
        let s = step(&mut w, WizardEvent::Extracted(Some(scan(0.93))));
        match s {
            WizardState::QuickConfirm { draft, confidence } => {
                assert_eq!(draft.merchant_name, "Tottus");
                assert_eq!(draft.total, 84.5);
                assert_eq!(confidence, 0.93);
            }
            other => panic!("expected quick_confirm, got {}", other.name()),
        }
        let s = step(&mut w, WizardEvent::Submit);
        assert!(matches!(s, WizardState::Saving { request: SaveRequest::Expenses(ref d), .. } if d.len() == 1));
    }

    #[test]
    fn test_low_confidence_falls_back_to_review() {
        let mut w = Wizard::new();
        step(&mut w, WizardEvent::Start(EntryPath::Upload(ScanMode::Receipt)));
        let s = step(&mut w, WizardEvent::Extracted(Some(scan(0.6))));
        assert_eq!(s.name(), "review");
        assert_eq!(s.draft().unwrap().merchant_name, "Tottus");
    }

    #[test]
    fn test_incomplete_high_confidence_goes_to_review() {
        let mut incomplete = scan(0.99);
        incomplete.total = None;
        let mut w = Wizard::new();
        step(&mut w, WizardEvent::Start(EntryPath::Upload(ScanMode::Receipt)));
        assert_eq!(step(&mut w, WizardEvent::Extracted(Some(incomplete))).name(), "review");
    }

    #[test]
    fn test_null_extraction_is_fallback_not_error() {
        let mut w = Wizard::new();
        step(&mut w, WizardEvent::Start(EntryPath::Upload(ScanMode::Receipt)));
        let s = step(&mut w, WizardEvent::Extracted(None));
        assert_eq!(s.draft().unwrap().merchant_name, "");
        assert_eq!(s.draft().unwrap().date, today());
    }

    #[test]
    fn test_verification_paths() {
        let mut w = Wizard::new();
        step(&mut w, WizardEvent::Start(EntryPath::Upload(ScanMode::Verify)));
        let check = ReceiptCheck { usable: true, receipt_type: Some(ReceiptType::Factura), ruc: None, issues: vec![] };
        assert_eq!(step(&mut w, WizardEvent::Verified(Some(check))).name(), "verification_result");
        assert_eq!(step(&mut w, WizardEvent::Continue).awaiting(), Some(ScanMode::Receipt));

        let mut w = Wizard::new();
        step(&mut w, WizardEvent::Start(EntryPath::Upload(ScanMode::Verify)));
        let check = ReceiptCheck {
            usable: false,
            receipt_type: Some(ReceiptType::Ticket),
            ruc: None,
            issues: vec!["sin RUC".to_string()],
        };
        step(&mut w, WizardEvent::Verified(Some(check)));
        let s = step(&mut w, WizardEvent::Continue);
        assert_eq!(s.name(), "review");
        assert_eq!(s.draft().unwrap().is_formal, Some(false));

        let mut w = Wizard::new();
        step(&mut w, WizardEvent::Start(EntryPath::Upload(ScanMode::Verify)));
        assert_eq!(step(&mut w, WizardEvent::Verified(None)).awaiting(), Some(ScanMode::Receipt));
    }

    #[test]
    fn test_manual_validation_blocks_submit() {
        let mut w = Wizard::new();
        step(&mut w, WizardEvent::Start(EntryPath::Manual));
        let err = w.apply(WizardEvent::Submit, today()).unwrap_err();
        assert_eq!(err, WizardError::Validation(TreevuError::MissingField("merchant_name")));
        assert_eq!(w.state().name(), "manual_entry");

        let draft = ExpenseDraft::new("Farmacia", 35.0, today()).with_category(Category::Health);
        step(&mut w, WizardEvent::EditDraft(draft));
        assert_eq!(step(&mut w, WizardEvent::Submit).name(), "saving");
    }

    #[test]
    fn test_ruc_autofill() {
        let mut w = Wizard::new();
        step(&mut w, WizardEvent::Start(EntryPath::Manual));
        step(&mut w, WizardEvent::EditDraft(ExpenseDraft::new("", 10.0, today()).with_ruc("20100070970")));
        let s = step(
            &mut w,
            WizardEvent::RucResolved { name: "SUPERMERCADOS PERUANOS S.A.".to_string(), category: Some(Category::Food) },
        );
        let d = s.draft().unwrap();
        assert_eq!(d.merchant_name, "SUPERMERCADOS PERUANOS S.A.");
        assert_eq!(d.category, Category::Food);
    }

    #[test]
    fn test_product_split_accept() {
        let mut w = Wizard::new();
        step(&mut w, WizardEvent::Start(EntryPath::Upload(ScanMode::Products)));
        let products = ScannedProducts {
            merchant_name: Some("Plaza Vea".to_string()),
            items: vec![
                item("Arroz", 20.0, Category::Food),
                item("Shampoo", 15.0, Category::Health),
                item("Leche", 10.0, Category::Food),
            ],
            ..Default::default()
        };
        assert_eq!(step(&mut w, WizardEvent::ProductsExtracted(Some(products))).name(), "review_products");
        assert_eq!(step(&mut w, WizardEvent::RequestSplit).awaiting(), Some(ScanMode::Split));
        let groups = vec![
            SplitGroup { category: Category::Food, items: vec![item("Arroz", 20.0, Category::Food), item("Leche", 10.0, Category::Food)] },
            SplitGroup { category: Category::Health, items: vec![item("Shampoo", 15.0, Category::Health)] },
        ];
        assert_eq!(step(&mut w, WizardEvent::SplitSuggested(Some(groups))).name(), "suggest_split");
        match step(&mut w, WizardEvent::AcceptSplit) {
            WizardState::Saving { request: SaveRequest::Expenses(drafts), .. } => {
                assert_eq!(drafts.len(), 2);
                assert_eq!(drafts[0].total, 30.0);
                assert_eq!(drafts[0].merchant_name, "Plaza Vea");
                assert_eq!(drafts[1].category, Category::Health);
            }
            other => panic!("expected saving, got {}", other.name()),
        }
    }

    #[test]
    fn test_product_list_single_expense() {
        let base = ExpenseDraft::new("Plaza Vea", 0.0, today());
        let merged = merge_products(&base, &[item("Arroz", 20.0, Category::Food), item("Vino", 45.0, Category::Entertainment)]);
        assert_eq!(merged.total, 65.0);
        assert_eq!(merged.category, Category::Entertainment);
        assert_eq!(merged.products.len(), 2);
    }

    #[test]
    fn test_empty_split_returns_to_products() {
        let mut w = Wizard::new();
        step(&mut w, WizardEvent::Start(EntryPath::Upload(ScanMode::Products)));
        let products = ScannedProducts { items: vec![item("Arroz", 20.0, Category::Food)], ..Default::default() };
        step(&mut w, WizardEvent::ProductsExtracted(Some(products)));
        step(&mut w, WizardEvent::RequestSplit);
        assert_eq!(step(&mut w, WizardEvent::SplitSuggested(None)).name(), "review_products");
    }

    #[test]
    fn test_error_returns_to_caller() {
        let mut w = Wizard::new();
        step(&mut w, WizardEvent::Start(EntryPath::Upload(ScanMode::Receipt)));
        let s = step(&mut w, WizardEvent::Failed(CollaboratorFailure::new(FailureKind::Extraction, "timeout")));
        match &s {
            WizardState::Error { message, .. } => assert!(message.contains("Inténtalo de nuevo")),
            other => panic!("expected error, got {}", other.name()),
        }
        assert_eq!(step(&mut w, WizardEvent::Dismiss), WizardState::Capture);

        let mut w = Wizard::new();
        step(&mut w, WizardEvent::Start(EntryPath::Manual));
        step(&mut w, WizardEvent::Failed(CollaboratorFailure::new(FailureKind::RucLookup, "503")));
        assert_eq!(step(&mut w, WizardEvent::Dismiss).name(), "manual_entry");
    }

    #[test]
    fn test_save_success_and_saving_opportunity() {
        let mut w = Wizard::new();
        step(&mut w, WizardEvent::Start(EntryPath::Manual));
        step(&mut w, WizardEvent::EditDraft(ExpenseDraft::new("Cineplanet", 40.0, today()).with_category(Category::Entertainment)));
        step(&mut w, WizardEvent::Submit);
        let offer = SavingOffer { expense_id: "exp-1".to_string(), suggested_amount: 4.0, goal_ids: vec!["g1".to_string()] };
        let s = step(
            &mut w,
            WizardEvent::Saved { saved_ids: vec!["exp-1".to_string()], reward: RewardBreakdown::default(), offer: Some(offer) },
        );
        assert_eq!(s.name(), "save_success");
        assert_eq!(step(&mut w, WizardEvent::Continue).name(), "saving_opportunity");
        assert!(step(&mut w, WizardEvent::Continue).is_closed());
    }

    #[test]
    fn test_divert_path() {
        let mut w = Wizard::new();
        step(&mut w, WizardEvent::Start(EntryPath::Divert));
        assert!(w.apply(WizardEvent::Submit, today()).is_err());
        let mut d = DivertDraft::new(today());
        d.description = "Café de la tarde".to_string();
        d.amount = 12.0;
        step(&mut w, WizardEvent::EditDivert(d));
        assert!(matches!(step(&mut w, WizardEvent::Submit), WizardState::Saving { request: SaveRequest::Diverted(_), .. }));
    }

    #[test]
    fn test_failed_save_keeps_reviewed_draft() {
        let mut w = Wizard::new();
        step(&mut w, WizardEvent::Start(EntryPath::Upload(ScanMode::Receipt)));
        step(&mut w, WizardEvent::Extracted(Some(scan(0.6))));
        let mut draft = w.state().draft().unwrap().clone();
        draft.total = 90.0;
        step(&mut w, WizardEvent::EditDraft(draft.clone()));
        assert_eq!(step(&mut w, WizardEvent::Submit).name(), "saving");

        let s = step(&mut w, WizardEvent::Failed(CollaboratorFailure::new(FailureKind::Save, "disk full")));
        assert_eq!(s.name(), "error");
        assert_eq!(step(&mut w, WizardEvent::Dismiss), WizardState::Review { draft });
    }

    #[test]
    fn test_failed_divert_save_keeps_form() {
        let mut w = Wizard::new();
        step(&mut w, WizardEvent::Start(EntryPath::Divert));
        let mut d = DivertDraft::new(today());
        d.description = "Zapatillas".to_string();
        d.amount = 250.0;
        step(&mut w, WizardEvent::EditDivert(d.clone()));
        step(&mut w, WizardEvent::Submit);
        step(&mut w, WizardEvent::Failed(CollaboratorFailure::new(FailureKind::Save, "io")));
        assert_eq!(step(&mut w, WizardEvent::Dismiss), WizardState::DivertExpense { draft: d });
    }

    #[test]
    fn test_failure_while_in_error_keeps_origin() {
        let mut w = Wizard::new();
        step(&mut w, WizardEvent::Start(EntryPath::Manual));
        step(&mut w, WizardEvent::Failed(CollaboratorFailure::new(FailureKind::RucLookup, "503")));
        let s = step(&mut w, WizardEvent::Failed(CollaboratorFailure::new(FailureKind::Camera, "busy")));
        match &s {
            WizardState::Error { message, return_to } => {
                assert!(message.starts_with("No pudimos acceder a la cámara."));
                assert_eq!(return_to.name(), "manual_entry");
            }
            other => panic!("expected error, got {}", other.name()),
        }
        assert_eq!(step(&mut w, WizardEvent::Dismiss).name(), "manual_entry");
    }

    #[test]
    fn test_stale_results_are_ignored_and_invalid_events_rejected() {
        let mut w = Wizard::new();
        step(&mut w, WizardEvent::Start(EntryPath::Manual));
        let before = w.state().clone();
        assert_eq!(step(&mut w, WizardEvent::Extracted(Some(scan(0.9)))), before);
        let err = w.apply(WizardEvent::AcceptSplit, today()).unwrap_err();
        assert_eq!(err, WizardError::InvalidEvent { state: "manual_entry", event: "accept_split" });
        assert!(step(&mut w, WizardEvent::Close).is_closed());
    }
}
