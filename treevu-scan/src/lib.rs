//! treevu-scan: collaborator payloads for receipt scanning, response parsing and RUC checks.

pub mod ai_response;
pub mod prompts;
pub mod ruc;
pub mod types;

pub use ai_response::{extract_json_text, parse_json_response, ParseOutcome, ResponseError};
pub use prompts::{CollaboratorRequest, ImagePayload};
pub use ruc::{validate_ruc, Ruc, RucKind};
pub use types::{RawProducts, RawReceipt, RawSplit, RawVerification, RucLookupResponse};
