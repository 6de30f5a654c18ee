// 🧹 Extraction Normalizer
// Best-effort cleanup of near-JSON text returned by the analysis service
//
//   1. direct parse
//   2. on failure: strip code fences, drop line breaks, drop trailing commas
//   3. retry once, then give up with a fixed error
//
// This is a heuristic, not a grammar. Anything that survives neither pass
// is reported as `ExtractionError::Unparseable`.

use crate::error::ExtractionError;
use crate::tax::TaxRate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)```(?:json)?\n?|\n?```").expect("valid fence regex"));
static LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r|\n\s*").expect("valid newline regex"));
static TRAILING_COMMA_ARRAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*\]").expect("valid array comma regex"));
static TRAILING_COMMA_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*\}").expect("valid object comma regex"));

// ============================================================================
// RECEIPT SHAPE
// ============================================================================

/// One line item as reported by the analysis service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptItem {
    pub name: String,
    /// Missing or unreadable prices stay `None`; only eligible items need one
    pub price: Option<f64>,
    #[serde(rename = "HealthSpendingAccountEligible")]
    pub hsa_eligible: bool,
    pub eligibility_reason: Option<String>,
    pub price_analysis: Option<String>,
}

/// Structured receipt extracted from the analysis reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptAnalysis {
    pub date: Option<String>,
    pub merchant: String,
    pub tax_rate: TaxRate,
    pub items: Vec<ReceiptItem>,
}

impl ReceiptAnalysis {
    pub fn eligible_items(&self) -> impl Iterator<Item = &ReceiptItem> {
        self.items.iter().filter(|item| item.hsa_eligible)
    }

    /// Decode from an already-parsed JSON value
    pub fn from_value(value: &Value) -> Result<Self, ExtractionError> {
        let obj = value.as_object().ok_or_else(|| {
            ExtractionError::InvalidFormat("expected a JSON object".to_string())
        })?;

        let items = match obj.get("items") {
            Some(Value::Array(items)) => items,
            _ => {
                // The service reports its own failures as {"error": "..."}
                let reason = obj
                    .get("error")
                    .and_then(Value::as_str)
                    .map(|e| format!("analysis reported: {}", e))
                    .unwrap_or_else(|| "missing items array".to_string());
                return Err(ExtractionError::InvalidFormat(reason));
            }
        };

        let items = items
            .iter()
            .enumerate()
            .map(|(index, item)| decode_item(index, item))
            .collect::<Result<Vec<_>, _>>()?;

        let merchant = string_field(obj, "merchant")
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "Unknown merchant".to_string());

        Ok(ReceiptAnalysis {
            date: string_field(obj, "date").filter(|d| !d.is_empty()),
            merchant,
            tax_rate: TaxRate::parse(obj.get("taxRate"))?,
            items,
        })
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(|s| s.trim().to_string())
}

fn decode_item(index: usize, value: &Value) -> Result<ReceiptItem, ExtractionError> {
    let obj = value.as_object().ok_or_else(|| {
        ExtractionError::InvalidFormat(format!("item {} is not an object", index))
    })?;

    let hsa_eligible = match obj.get("HealthSpendingAccountEligible") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    };

    Ok(ReceiptItem {
        name: string_field(obj, "name")
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Item {}", index + 1)),
        price: obj.get("price").and_then(parse_price),
        hsa_eligible,
        eligibility_reason: string_field(obj, "eligibilityReason"),
        price_analysis: string_field(obj, "priceAnalysis"),
    })
}

/// Price as number or string ("4.99", "$4.99", "1,299.00")
pub fn parse_price(value: &Value) -> Option<f64> {
    let price = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .trim_start_matches('$')
                .chars()
                .filter(|c| *c != ',')
                .collect();
            cleaned.trim().parse().ok()?
        }
        _ => return None,
    };
    price.is_finite().then_some(price)
}

// ============================================================================
// CLEANUP + PARSE
// ============================================================================

/// Apply the fixed substitution sequence
pub fn clean_json_text(raw: &str) -> String {
    let text = CODE_FENCE.replace_all(raw, "");
    let text = LINE_BREAK.replace_all(&text, "");
    let text = TRAILING_COMMA_ARRAY.replace_all(&text, "]");
    let text = TRAILING_COMMA_OBJECT.replace_all(&text, "}");
    text.trim().to_string()
}

/// Direct parse, then one cleanup-and-retry
pub fn parse_lenient_json(raw: &str) -> Result<Value, ExtractionError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => Ok(value),
        Err(first) => {
            debug!("Direct parse failed ({}), retrying after cleanup", first);
            let cleaned = clean_json_text(raw);
            serde_json::from_str::<Value>(&cleaned).map_err(|second| {
                warn!("Receipt text unparseable after cleanup: {}", second);
                ExtractionError::Unparseable
            })
        }
    }
}

/// Full normalization: text → `ReceiptAnalysis`
pub fn parse_receipt_text(raw: &str) -> Result<ReceiptAnalysis, ExtractionError> {
    let value = parse_lenient_json(raw)?;
    ReceiptAnalysis::from_value(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHARMACY: &str = r#"{"date":"2024-03-01","merchant":"Pharmacy","taxRate":"8","items":[{"name":"Aspirin","price":10.00,"HealthSpendingAccountEligible":true}]}"#;

    #[test]
    fn test_direct_parse() {
        let analysis = parse_receipt_text(PHARMACY).unwrap();

        assert_eq!(analysis.date.as_deref(), Some("2024-03-01"));
        assert_eq!(analysis.merchant, "Pharmacy");
        assert_eq!(analysis.tax_rate.percent(), 8.0);
        assert_eq!(analysis.items.len(), 1);
        assert_eq!(analysis.items[0].price, Some(10.0));
        assert!(analysis.items[0].hsa_eligible);
    }

    #[test]
    fn test_fenced_reply_with_trailing_commas() {
        let raw = "```json\n{\n  \"date\": \"2024-05-02\",\n  \"merchant\": \"CVS\",\n  \"taxRate\": \"6.25%\",\n  \"items\": [\n    {\"name\": \"Bandages\", \"price\": 4.99, \"HealthSpendingAccountEligible\": true,},\n    {\"name\": \"Candy\", \"price\": 1.50, \"HealthSpendingAccountEligible\": false},\n  ],\n}\n```";

        assert!(serde_json::from_str::<Value>(raw).is_err());

        let analysis = parse_receipt_text(raw).unwrap();
        assert_eq!(analysis.merchant, "CVS");
        assert_eq!(analysis.items.len(), 2);
        assert_eq!(analysis.eligible_items().count(), 1);
    }

    #[test]
    fn test_clean_json_text() {
        let raw = "```JSON\r\n{\"a\": [1, 2,],\n \"b\": {\"c\": 1,}}\n```";
        assert_eq!(clean_json_text(raw), r#"{"a": [1, 2],"b": {"c": 1}}"#);
    }

    #[test]
    fn test_unparseable_after_cleanup() {
        let err = parse_receipt_text("Sorry, I could not read this receipt.").unwrap_err();
        assert_eq!(err, ExtractionError::Unparseable);

        // Truncated reply
        let err = parse_receipt_text(r#"{"date":"2024-03-01","items":[{"name":"Asp"#).unwrap_err();
        assert_eq!(err, ExtractionError::Unparseable);
    }

    #[test]
    fn test_missing_items_is_invalid_format() {
        let err = parse_receipt_text(r#"{"date":"2024-03-01","merchant":"X"}"#).unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidFormat(_)));

        let err = parse_receipt_text(r#"[1, 2, 3]"#).unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidFormat(_)));
    }

    #[test]
    fn test_service_error_object() {
        let err = parse_receipt_text(r#"{"error": "Invalid JSON response from Gemini"}"#).unwrap_err();
        match err {
            ExtractionError::InvalidFormat(reason) => assert!(reason.contains("Gemini")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_lenient_item_fields() {
        let raw = r#"{"date":"2024-01-09","merchant":"","taxRate":7,"items":[
            {"name":"Thermometer","price":"$12.49","HealthSpendingAccountEligible":"true","eligibilityReason":"Diagnostic"},
            {"price":"n/a","HealthSpendingAccountEligible":false}
        ]}"#;

        let analysis = parse_receipt_text(raw).unwrap();
        assert_eq!(analysis.merchant, "Unknown merchant");
        assert_eq!(analysis.items[0].price, Some(12.49));
        assert!(analysis.items[0].hsa_eligible);
        assert_eq!(analysis.items[0].eligibility_reason.as_deref(), Some("Diagnostic"));
        assert_eq!(analysis.items[1].name, "Item 2");
        assert_eq!(analysis.items[1].price, None);
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price(&serde_json::json!(3.5)), Some(3.5));
        assert_eq!(parse_price(&serde_json::json!("1,299.00")), Some(1299.0));
        assert_eq!(parse_price(&serde_json::json!("free")), None);
        assert_eq!(parse_price(&serde_json::json!(true)), None);
    }
}
