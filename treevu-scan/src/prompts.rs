//! Requests sent to the receipt collaborator.
//!
//! Each request carries a Spanish prompt, the image (when there is one) and a
//! JSON schema describing the reply. Transport is up to the caller.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use treevu_core::{Category, LineItem, ReceiptType, ScanMode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePayload {
    pub media_type: String,
    pub data_base64: String,
}

impl ImagePayload {
    /// Encode raw image bytes; the media type is sniffed from the magic number.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            media_type: sniff_media_type(bytes).to_string(),
            data_base64: STANDARD.encode(bytes),
        }
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data_base64)
    }
}

fn sniff_media_type(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "image/jpeg",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaboratorRequest {
    pub mode: ScanMode,
    pub prompt: String,
    pub image: Option<ImagePayload>,
    pub schema: Value,
}

const REPLY_RULES: &str = "Responde solo con JSON válido que siga el esquema indicado, sin texto adicional. \
Usa null para los campos que no puedas leer. Montos en soles, como números.";

fn category_names() -> Vec<&'static str> {
    Category::ALL.iter().map(|c| c.as_str()).collect()
}

fn receipt_types() -> Vec<&'static str> {
    ReceiptType::ALL.iter().map(|r| r.as_str()).collect()
}

pub fn verify_request(image: ImagePayload) -> CollaboratorRequest {
    CollaboratorRequest {
        mode: ScanMode::Verify,
        prompt: format!(
            "Revisa este comprobante peruano. Indica si sirve para deducir gastos ante SUNAT \
             (factura, boleta o recibo por honorarios con RUC legible), qué tipo de comprobante es, \
             el RUC del emisor y cualquier problema que veas. {REPLY_RULES}"
        ),
        image: Some(image),
        schema: json!({
            "type": "object",
            "properties": {
                "usable": {"type": "boolean"},
                "receiptType": {"type": ["string", "null"], "enum": receipt_types()},
                "ruc": {"type": ["string", "null"]},
                "issues": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["usable"]
        }),
    }
}

pub fn receipt_request(image: ImagePayload) -> CollaboratorRequest {
    CollaboratorRequest {
        mode: ScanMode::Receipt,
        prompt: format!(
            "Extrae los datos de este comprobante: razón social del comercio, RUC, fecha (YYYY-MM-DD), \
             total pagado, categoría del gasto y tipo de comprobante. Incluye tu confianza entre 0 y 1. \
             {REPLY_RULES}"
        ),
        image: Some(image),
        schema: json!({
            "type": "object",
            "properties": {
                "merchantName": {"type": ["string", "null"]},
                "ruc": {"type": ["string", "null"]},
                "date": {"type": ["string", "null"]},
                "total": {"type": ["number", "null"]},
                "category": {"type": ["string", "null"], "enum": category_names()},
                "receiptType": {"type": ["string", "null"], "enum": receipt_types()},
                "confidence": {"type": "number"}
            },
            "required": ["confidence"]
        }),
    }
}

fn product_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": {"type": "string"},
            "amount": {"type": "number"},
            "quantity": {"type": ["number", "null"]},
            "category": {"type": "string", "enum": category_names()}
        },
        "required": ["name", "amount"]
    })
}

pub fn products_request(image: ImagePayload) -> CollaboratorRequest {
    CollaboratorRequest {
        mode: ScanMode::Products,
        prompt: format!(
            "Lista cada producto de este comprobante con su precio, cantidad y categoría. \
             Incluye también el comercio, RUC, fecha y tipo de comprobante. {REPLY_RULES}"
        ),
        image: Some(image),
        schema: json!({
            "type": "object",
            "properties": {
                "merchantName": {"type": ["string", "null"]},
                "ruc": {"type": ["string", "null"]},
                "date": {"type": ["string", "null"]},
                "receiptType": {"type": ["string", "null"], "enum": receipt_types()},
                "products": {"type": "array", "items": product_schema()}
            },
            "required": ["products"]
        }),
    }
}

/// Split suggestion works from the already-extracted list, so no image is sent.
pub fn split_request(items: &[LineItem]) -> CollaboratorRequest {
    let listing: Vec<String> = items
        .iter()
        .map(|i| format!("- {} | S/ {:.2} | {}", i.name, i.amount, i.category.as_str()))
        .collect();
    CollaboratorRequest {
        mode: ScanMode::Split,
        prompt: format!(
            "Agrupa estos productos en gastos separados por categoría, sin repetir ni omitir productos:\n{}\n{REPLY_RULES}",
            listing.join("\n")
        ),
        image: None,
        schema: json!({
            "type": "object",
            "properties": {
                "groups": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "category": {"type": "string", "enum": category_names()},
                            "items": {"type": "array", "items": product_schema()}
                        },
                        "required": ["category", "items"]
                    }
                }
            },
            "required": ["groups"]
        }),
    }
}

/// Build the request for an image-based scan mode. `Split` takes items, not an image.
pub fn image_request(mode: ScanMode, image: ImagePayload) -> Option<CollaboratorRequest> {
    match mode {
        ScanMode::Verify => Some(verify_request(image)),
        ScanMode::Receipt => Some(receipt_request(image)),
        ScanMode::Products => Some(products_request(image)),
        ScanMode::Split => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    #[test]
    fn test_image_payload() {
        let img = ImagePayload::from_bytes(&PNG_HEADER);
        assert_eq!(img.media_type, "image/png");
        assert_eq!(img.data_base64, "iVBORw0KGgo=");
        assert!(img.data_url().starts_with("data:image/png;base64,"));
        assert_eq!(ImagePayload::from_bytes(&[0xff, 0xd8, 0xff]).media_type, "image/jpeg");
    }

    #[test]
    fn test_receipt_request_shape() {
        let req = receipt_request(ImagePayload::from_bytes(&PNG_HEADER));
        assert_eq!(req.mode, ScanMode::Receipt);
        assert!(req.image.is_some());
        assert!(req.prompt.contains("JSON"));
        assert_eq!(req.schema["properties"]["category"]["enum"].as_array().map(|a| a.len()), Some(10));
    }

    #[test]
    fn test_split_request_lists_items() {
        let items = vec![
            LineItem { name: "Arroz".to_string(), amount: 20.0, category: Category::Food },
            LineItem { name: "Shampoo".to_string(), amount: 15.5, category: Category::Health },
        ];
        let req = split_request(&items);
        assert!(req.image.is_none());
        assert!(req.prompt.contains("- Arroz | S/ 20.00 | food"));
        assert!(req.prompt.contains("S/ 15.50"));
    }

    #[test]
    fn test_image_request_modes() {
        let img = ImagePayload::from_bytes(&PNG_HEADER);
        assert_eq!(image_request(ScanMode::Verify, img.clone()).map(|r| r.mode), Some(ScanMode::Verify));
        assert!(image_request(ScanMode::Split, img).is_none());
    }
}
