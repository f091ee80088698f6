//! Effect driver for the capture wizard.
//!
//! The wizard itself is pure. `CaptureFlow` watches what it is waiting for,
//! makes the collaborator call, and feeds the result back in as an event.
//! Unreadable replies become `None` results (the fallback path); transport
//! errors become `Failed` events. Nothing is retried automatically.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use std::future::Future;
use tracing::{debug, warn};
use treevu_core::wizard::SaveRequest;
use treevu_core::{
    CollaboratorFailure, Dice, EntryPath, FailureKind, ScanMode, Wizard, WizardError, WizardEvent, WizardState,
};
use treevu_scan::prompts::{image_request, split_request};
use treevu_scan::{
    validate_ruc, CollaboratorRequest, ImagePayload, ParseOutcome, RawProducts, RawReceipt, RawSplit,
    RawVerification, Ruc, RucLookupResponse,
};

use crate::session::UserSession;
use crate::store::KeyValueStore;

/// Vision model that answers a collaborator request with free-form text
pub trait ReceiptAnalyzer {
    fn analyze(&self, request: &CollaboratorRequest) -> impl Future<Output = Result<String>>;
}

/// Remote taxpayer registry
pub trait TaxIdLookup {
    fn lookup(&self, ruc: &Ruc) -> impl Future<Output = Result<RucLookupResponse>>;
}

fn failure_kind(mode: ScanMode) -> FailureKind {
    match mode {
        ScanMode::Verify => FailureKind::Verification,
        ScanMode::Receipt => FailureKind::Extraction,
        ScanMode::Products => FailureKind::Products,
        ScanMode::Split => FailureKind::Split,
    }
}

/// Turn a reply into the matching wizard event.
pub fn result_event(mode: ScanMode, reply: &str) -> WizardEvent {
    match mode {
        ScanMode::Verify => WizardEvent::Verified(ParseOutcome::<RawVerification>::from_reply(reply).ok().map(|r| r.into_check())),
        ScanMode::Receipt => WizardEvent::Extracted(ParseOutcome::<RawReceipt>::from_reply(reply).ok().map(|r| r.into_scanned())),
        ScanMode::Products => {
            WizardEvent::ProductsExtracted(ParseOutcome::<RawProducts>::from_reply(reply).ok().map(|r| r.into_scanned()))
        }
        ScanMode::Split => WizardEvent::SplitSuggested(ParseOutcome::<RawSplit>::from_reply(reply).ok().map(|r| r.into_groups())),
    }
}

pub struct CaptureFlow<'a, A, L> {
    analyzer: &'a A,
    registry: &'a L,
    wizard: Wizard,
    image: Option<ImagePayload>,
    today: NaiveDate,
}

impl<'a, A: ReceiptAnalyzer, L: TaxIdLookup> CaptureFlow<'a, A, L> {
    pub fn new(analyzer: &'a A, registry: &'a L, today: NaiveDate) -> Self {
        Self {
            analyzer,
            registry,
            wizard: Wizard::new(),
            image: None,
            today,
        }
    }

    pub fn state(&self) -> &WizardState {
        self.wizard.state()
    }

    /// Apply a user event as-is.
    pub fn apply(&mut self, event: WizardEvent) -> Result<&WizardState, WizardError> {
        debug!(from = self.wizard.state().name(), event = event.name(), "wizard event");
        self.wizard.apply(event, self.today)
    }

    /// Upload path: the image is in hand, analysis runs right away.
    pub async fn upload(&mut self, mode: ScanMode, image: ImagePayload) -> Result<&WizardState> {
        self.image = Some(image);
        self.apply(WizardEvent::Start(EntryPath::Upload(mode)))?;
        self.run_pending().await;
        Ok(self.wizard.state())
    }

    /// Camera path, after `Start(Camera)`: the frame was captured.
    pub async fn captured(&mut self, mode: ScanMode, image: ImagePayload) -> Result<&WizardState> {
        self.image = Some(image);
        self.apply(WizardEvent::ImageCaptured(mode))?;
        self.run_pending().await;
        Ok(self.wizard.state())
    }

    /// Ask for a split of the product list and wait for the answer.
    pub async fn request_split(&mut self) -> Result<&WizardState> {
        self.apply(WizardEvent::RequestSplit)?;
        self.run_pending().await;
        Ok(self.wizard.state())
    }

    /// Continue from a step; may start a new analysis (usable verified receipt).
    pub async fn proceed(&mut self) -> Result<&WizardState> {
        self.apply(WizardEvent::Continue)?;
        self.run_pending().await;
        Ok(self.wizard.state())
    }

    fn request_for(&self, mode: ScanMode) -> Option<CollaboratorRequest> {
        match mode {
            ScanMode::Split => match self.wizard.state() {
                WizardState::Analyzing { back, .. } => match &**back {
                    WizardState::ReviewProducts { items, .. } => Some(split_request(items)),
                    _ => None,
                },
                _ => None,
            },
            _ => self.image.clone().and_then(|img| image_request(mode, img)),
        }
    }

    /// Drive collaborator calls until the wizard stops waiting.
    pub async fn run_pending(&mut self) {
        while let Some(mode) = self.wizard.state().awaiting() {
            let event = match self.request_for(mode) {
                None => WizardEvent::Failed(CollaboratorFailure::new(failure_kind(mode), "no input for request")),
                Some(req) => match self.analyzer.analyze(&req).await {
                    Ok(reply) => result_event(mode, &reply),
                    Err(e) => {
                        warn!(?mode, error = %e, "collaborator call failed");
                        WizardEvent::Failed(CollaboratorFailure::new(failure_kind(mode), e.to_string()))
                    }
                },
            };
            if let Err(e) = self.wizard.apply(event, self.today) {
                // Awaiting states accept every result event
                warn!(error = %e, "collaborator result rejected");
                break;
            }
        }
    }

    /// Check the draft's RUC locally, then against the registry, and autofill the form.
    ///
    /// A malformed RUC is a validation error and leaves the step as is; a
    /// registry failure moves the wizard to the error step.
    pub async fn resolve_ruc(&mut self) -> Result<&WizardState> {
        let Some(raw) = self.wizard.state().draft().and_then(|d| d.ruc.clone()) else {
            return Ok(self.wizard.state());
        };
        let ruc = validate_ruc(&raw).map_err(WizardError::from)?;

        let event = match self.registry.lookup(&ruc).await {
            Ok(resp) => match resp.autofill() {
                Some((name, category)) => WizardEvent::RucResolved { name, category },
                None => return Err(WizardError::from(treevu_core::TreevuError::InvalidRuc(ruc.to_string())).into()),
            },
            Err(e) => {
                warn!(%ruc, error = %e, "RUC lookup failed");
                WizardEvent::Failed(CollaboratorFailure::new(FailureKind::RucLookup, e.to_string()))
            }
        };
        self.apply(event)?;
        Ok(self.wizard.state())
    }

    /// Persist what the wizard is saving and report back.
    pub fn commit<S: KeyValueStore, D: Dice>(
        &mut self,
        session: &mut UserSession<S, D>,
        now: DateTime<Utc>,
    ) -> Result<&WizardState> {
        let WizardState::Saving { request, .. } = self.wizard.state() else {
            return Ok(self.wizard.state());
        };
        let event = match request.clone() {
            SaveRequest::Expenses(drafts) => match session.save_expenses(drafts, now) {
                Ok(out) => WizardEvent::Saved {
                    saved_ids: out.saved_ids,
                    reward: out.reward,
                    offer: out.offer,
                },
                Err(e) => WizardEvent::Failed(CollaboratorFailure::new(FailureKind::Save, e.to_string())),
            },
            SaveRequest::Diverted(draft) => match session.divert(draft, now) {
                Ok(d) => WizardEvent::Saved {
                    saved_ids: vec![d.id],
                    reward: Default::default(),
                    offer: None,
                },
                Err(e) => WizardEvent::Failed(CollaboratorFailure::new(FailureKind::Save, e.to_string())),
            },
        };
        self.apply(event)?;
        Ok(self.wizard.state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use treevu_core::wizard::DivertDraft;
    use treevu_core::{Category, ExpenseDraft};

    /// Replays canned replies and records the modes it was asked for.
    #[derive(Default)]
    struct FakeAnalyzer {
        replies: RefCell<VecDeque<Result<String>>>,
        seen: RefCell<Vec<ScanMode>>,
    }

    impl FakeAnalyzer {
        fn with(replies: Vec<Result<String>>) -> Self {
            Self { replies: RefCell::new(replies.into()), seen: RefCell::default() }
        }
    }

    impl ReceiptAnalyzer for FakeAnalyzer {
        async fn analyze(&self, request: &CollaboratorRequest) -> Result<String> {
            self.seen.borrow_mut().push(request.mode);
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no canned reply")))
        }
    }

    struct FakeRegistry(Option<RucLookupResponse>);

    impl TaxIdLookup for FakeRegistry {
        async fn lookup(&self, _ruc: &Ruc) -> Result<RucLookupResponse> {
            self.0.clone().ok_or_else(|| anyhow::anyhow!("registry 503"))
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    fn img() -> ImagePayload {
        ImagePayload::from_bytes(&[0xff, 0xd8, 0xff, 0xe0])
    }

    #[tokio::test]
    async fn test_upload_high_confidence_then_commit() {
        let analyzer = FakeAnalyzer::with(vec![Ok(r#"```json
{"merchantName": "Tottus", "total": 84.5, "date": "2026-03-09", "receiptType": "boleta", "category": "food", "confidence": 0.95}
```"#
            .to_string())]);
        let registry = FakeRegistry(None);
        let mut flow = CaptureFlow::new(&analyzer, &registry, today());
        assert_eq!(flow.upload(ScanMode::Receipt, img()).await.unwrap().name(), "quick_confirm");

        flow.apply(WizardEvent::Submit).unwrap();
        let mut session = UserSession::open("u1", "Ana", MemoryStore::new(), StdRng::seed_from_u64(3)).unwrap();
        let now = Utc::now();
        assert_eq!(flow.commit(&mut session, now).unwrap().name(), "save_success");
        assert_eq!(session.expenses().len(), 1);
        assert_eq!(session.expenses()[0].total, 84.5);
        assert!(flow.apply(WizardEvent::Continue).unwrap().is_closed());
    }

    #[tokio::test]
    async fn test_garbage_reply_falls_back_to_review() {
        let analyzer = FakeAnalyzer::with(vec![Ok("no pude leer nada".to_string())]);
        let registry = FakeRegistry(None);
        let mut flow = CaptureFlow::new(&analyzer, &registry, today());
        let s = flow.upload(ScanMode::Receipt, img()).await.unwrap();
        assert_eq!(s.name(), "review");
        assert_eq!(s.draft().map(|d| d.date), Some(today()));
    }

    #[tokio::test]
    async fn test_transport_error_goes_to_error_step() {
        let analyzer = FakeAnalyzer::with(vec![Err(anyhow::anyhow!("timeout"))]);
        let registry = FakeRegistry(None);
        let mut flow = CaptureFlow::new(&analyzer, &registry, today());
        let s = flow.upload(ScanMode::Receipt, img()).await.unwrap();
        assert_eq!(s.name(), "error");
        assert_eq!(analyzer.seen.borrow().len(), 1);
        assert_eq!(flow.apply(WizardEvent::Dismiss).unwrap(), &WizardState::Capture);
    }

    #[tokio::test]
    async fn test_unparseable_verification_skips_to_extraction() {
        let analyzer = FakeAnalyzer::with(vec![
            Ok("???".to_string()),
            Ok(r#"{"merchantName": "Inkafarma", "total": 35, "confidence": 0.4}"#.to_string()),
        ]);
        let registry = FakeRegistry(None);
        let mut flow = CaptureFlow::new(&analyzer, &registry, today());
        let s = flow.upload(ScanMode::Verify, img()).await.unwrap();
        assert_eq!(s.name(), "review");
        assert_eq!(*analyzer.seen.borrow(), vec![ScanMode::Verify, ScanMode::Receipt]);
        assert_eq!(s.draft().map(|d| d.category), Some(Category::Health));
    }

    #[tokio::test]
    async fn test_products_split_flow() {
        let analyzer = FakeAnalyzer::with(vec![
            Ok(r#"{"merchantName": "Plaza Vea", "products": [
                {"name": "Arroz", "amount": 20, "category": "food"},
                {"name": "Shampoo", "amount": 15, "category": "health"}]}"#
                .to_string()),
            Ok(r#"{"groups": [
                {"category": "food", "items": [{"name": "Arroz", "amount": 20}]},
                {"category": "health", "items": [{"name": "Shampoo", "amount": 15}]}]}"#
                .to_string()),
        ]);
        let registry = FakeRegistry(None);
        let mut flow = CaptureFlow::new(&analyzer, &registry, today());
        assert_eq!(flow.upload(ScanMode::Products, img()).await.unwrap().name(), "review_products");
        assert_eq!(flow.request_split().await.unwrap().name(), "suggest_split");
        flow.apply(WizardEvent::AcceptSplit).unwrap();

        let mut session = UserSession::open("u1", "Ana", MemoryStore::new(), StdRng::seed_from_u64(3)).unwrap();
        flow.commit(&mut session, Utc::now()).unwrap();
        assert_eq!(session.expenses().len(), 2);
        assert_eq!(session.progress().expense_count, 2);
    }

    #[tokio::test]
    async fn test_ruc_autofill_and_failures() {
        let analyzer = FakeAnalyzer::default();
        let registry = FakeRegistry(Some(RucLookupResponse {
            is_valid: true,
            registered_name: Some("Supermercados Peruanos S.A.".to_string()),
        }));
        let mut flow = CaptureFlow::new(&analyzer, &registry, today());
        flow.apply(WizardEvent::Start(EntryPath::Manual)).unwrap();
        flow.apply(WizardEvent::EditDraft(ExpenseDraft::new("", 12.0, today()).with_ruc("20100070970")))
            .unwrap();
        let d = flow.resolve_ruc().await.unwrap().draft().cloned().unwrap();
        assert_eq!(d.merchant_name, "Supermercados Peruanos S.A.");
        assert_eq!(d.category, Category::Food);

        // Bad check digit: validation error, step unchanged
        flow.apply(WizardEvent::EditDraft(ExpenseDraft::new("X", 12.0, today()).with_ruc("20100070971")))
            .unwrap();
        assert!(flow.resolve_ruc().await.is_err());
        assert_eq!(flow.state().name(), "manual_entry");

        // Registry down: error step
        let down = FakeRegistry(None);
        let mut flow = CaptureFlow::new(&analyzer, &down, today());
        flow.apply(WizardEvent::Start(EntryPath::Manual)).unwrap();
        flow.apply(WizardEvent::EditDraft(ExpenseDraft::new("", 12.0, today()).with_ruc("20100070970")))
            .unwrap();
        assert_eq!(flow.resolve_ruc().await.unwrap().name(), "error");
    }

    #[tokio::test]
    async fn test_camera_verify_then_extract() {
        let analyzer = FakeAnalyzer::with(vec![
            Ok(r#"{"isValid": true, "receiptType": "factura", "ruc": "20100070970", "issues": []}"#.to_string()),
            Ok(r#"{"merchantName": "Wong", "total": "S/ 52.30", "confidence": 0.5}"#.to_string()),
        ]);
        let registry = FakeRegistry(None);
        let mut flow = CaptureFlow::new(&analyzer, &registry, today());
        assert_eq!(flow.apply(WizardEvent::Start(EntryPath::Camera)).unwrap(), &WizardState::Initializing);

        assert_eq!(flow.captured(ScanMode::Verify, img()).await.unwrap().name(), "verification_result");
        let s = flow.proceed().await.unwrap();
        assert_eq!(s.name(), "review");
        assert_eq!(s.draft().map(|d| d.total), Some(52.3));
        assert_eq!(*analyzer.seen.borrow(), vec![ScanMode::Verify, ScanMode::Receipt]);
    }

    #[tokio::test]
    async fn test_divert_commit_funds_goal() {
        let analyzer = FakeAnalyzer::default();
        let registry = FakeRegistry(None);
        let mut session = UserSession::open("u1", "Ana", MemoryStore::new(), StdRng::seed_from_u64(3)).unwrap();
        let goal = session.add_goal("Viaje", 300.0, "✈️", Utc::now()).unwrap();

        let mut flow = CaptureFlow::new(&analyzer, &registry, today());
        flow.apply(WizardEvent::Start(EntryPath::Divert)).unwrap();
        let mut d = DivertDraft::new(today());
        d.description = "Delivery".to_string();
        d.amount = 35.0;
        d.goal_id = Some(goal.id.clone());
        flow.apply(WizardEvent::EditDivert(d)).unwrap();
        flow.apply(WizardEvent::Submit).unwrap();

        assert_eq!(flow.commit(&mut session, Utc::now()).unwrap().name(), "save_success");
        assert_eq!(session.goal(&goal.id).unwrap().current_amount, 35.0);
        assert!(session.expenses().is_empty());
        assert!(analyzer.seen.borrow().is_empty());
    }
}
