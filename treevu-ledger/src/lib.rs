//! treevu-ledger: per-user session state, persistence, capture driver, analytics and export

pub mod analytics;
pub mod capture;
pub mod export;
pub mod session;
pub mod store;

pub use analytics::{AnalyticsEvent, AnalyticsSink, JsonlSink, MemorySink, NoopSink};
pub use capture::{CaptureFlow, ReceiptAnalyzer, TaxIdLookup};
pub use export::{export_to_path, write_csv};
pub use session::{SaveOutcome, UserSession};
pub use store::{FileStore, KeyValueStore, MemoryStore, Slice, SliceStore};
