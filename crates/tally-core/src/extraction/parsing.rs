//! Post-processing for generative-model invoice replies
//!
//! The model is asked for a bare JSON object but may wrap it in a code fence,
//! omit keys, or format amounts as currency strings. Unparseable JSON
//! degrades to an all-default record; JSON that parses into the wrong shape
//! is a `MalformedResponse`.

use chrono::NaiveDate;
use serde_json::{Map, Value};
use tracing::{error, warn};

use crate::error::{Error, Result};
use crate::models::{InvoiceExtraction, LineItem};

/// Markdown code fence delimiter
const FENCE: &str = "```";

/// Language tag the model tends to put after the opening fence
const JSON_TAG: &str = "json";

/// Date format requested in the prompt
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Maximum reply length echoed into error messages
const MAX_ECHO_LEN: usize = 200;

/// Strip surrounding whitespace and an optional code fence from a model reply
///
/// Only a reply that *starts* with a fence is unwrapped: the segment between
/// the first two fences is kept, minus a leading `json` tag.
pub fn strip_code_fence(reply: &str) -> &str {
    let text = reply.trim();
    let text = if text.starts_with(FENCE) {
        let inner = text.split(FENCE).nth(1).unwrap_or("");
        inner.strip_prefix(JSON_TAG).unwrap_or(inner)
    } else {
        text
    };
    text.trim()
}

/// Parse a generated reply into an invoice record
///
/// `raw_text` is left empty on the returned record.
pub fn parse_invoice_reply(reply: &str) -> Result<InvoiceExtraction> {
    let cleaned = strip_code_fence(reply);

    let value: Value = match serde_json::from_str(cleaned) {
        Ok(value) => value,
        Err(e) => {
            error!(error = %e, raw = %cleaned, "JSON parsing error in model reply, using defaults");
            return Ok(InvoiceExtraction::default());
        }
    };

    let Value::Object(fields) = value else {
        return Err(Error::MalformedResponse(format!(
            "Response is not a JSON object | Raw: {}",
            truncate(cleaned)
        )));
    };

    Ok(InvoiceExtraction {
        invoice_date: parse_date_field(&fields, "invoice_date"),
        due_date: parse_date_field(&fields, "due_date"),
        items: parse_items(fields.get("items"))?,
        total_amount: parse_total_amount(fields.get("total_amount")),
        raw_text: String::new(),
    })
}

/// Parse a currency-formatted string such as `"$1,234.50"`
///
/// Strips `$` and `,` before parsing. Returns None for anything that is not
/// a finite number afterwards.
pub fn parse_currency(s: &str) -> Option<f64> {
    let cleaned = s.replace(['$', ','], "");
    cleaned
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Coerce a JSON number or currency string to a finite amount, defaulting to 0.0
fn coerce_amount(value: Option<&Value>) -> f64 {
    let amount = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => parse_currency(s).unwrap_or_else(|| {
            warn!(value = %s, "Could not parse amount, using 0.0");
            0.0
        }),
        _ => 0.0,
    };
    if amount.is_finite() {
        amount
    } else {
        0.0
    }
}

/// Invoice totals are never negative
fn parse_total_amount(value: Option<&Value>) -> f64 {
    let amount = coerce_amount(value);
    if amount < 0.0 {
        warn!(amount, "Negative total amount, using 0.0");
        0.0
    } else {
        amount
    }
}

fn parse_date_field(fields: &Map<String, Value>, key: &str) -> Option<NaiveDate> {
    match fields.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => match NaiveDate::parse_from_str(s.trim(), DATE_FORMAT) {
            Ok(date) => Some(date),
            Err(_) => {
                warn!(field = key, value = %s, "Could not parse date");
                None
            }
        },
        Some(other) => {
            warn!(field = key, value = %other, "Unexpected date value");
            None
        }
    }
}

fn parse_items(value: Option<&Value>) -> Result<Vec<LineItem>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(entries)) => entries
            .iter()
            .enumerate()
            .map(|(i, entry)| match entry {
                Value::Object(item) => Ok(parse_line_item(item)),
                other => Err(Error::MalformedResponse(format!(
                    "items[{}] is not an object: {}",
                    i,
                    truncate(&other.to_string())
                ))),
            })
            .collect(),
        Some(other) => Err(Error::MalformedResponse(format!(
            "items is not an array: {}",
            truncate(&other.to_string())
        ))),
    }
}

fn parse_line_item(item: &Map<String, Value>) -> LineItem {
    let name = match item.get("name") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    LineItem {
        name,
        quantity: coerce_amount(item.get("quantity")),
        price: coerce_amount(item.get("price")),
        total: coerce_amount(item.get("total")),
    }
}

fn truncate(s: &str) -> String {
    if s.len() > MAX_ECHO_LEN {
        let mut end = MAX_ECHO_LEN;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fence() {
        let reply = "```json\n{\"total_amount\": 5}\n```";
        assert_eq!(strip_code_fence(reply), "{\"total_amount\": 5}");
    }

    #[test]
    fn test_strip_untagged_fence() {
        let reply = "  ```\n{\"a\": 1}\n```  ";
        assert_eq!(strip_code_fence(reply), "{\"a\": 1}");
    }

    #[test]
    fn test_text_before_fence_is_not_stripped() {
        let reply = "Here you go: ```json {} ```";
        assert_eq!(strip_code_fence(reply), reply);
    }

    #[test]
    fn test_fenced_reply_parses_with_defaults() {
        let result = parse_invoice_reply("```json\n{\"total_amount\": 5}\n```").unwrap();
        assert_eq!(result.total_amount, 5.0);
        assert_eq!(result.invoice_date, None);
        assert_eq!(result.due_date, None);
        assert!(result.items.is_empty());
        assert!(result.raw_text.is_empty());
    }

    #[test]
    fn test_prose_reply_degrades_to_defaults() {
        let result = parse_invoice_reply("Sure! Here is the invoice.").unwrap();
        assert_eq!(result, InvoiceExtraction::default());
    }

    #[test]
    fn test_empty_after_fence_degrades_to_defaults() {
        let result = parse_invoice_reply("```json\n```").unwrap();
        assert_eq!(result, InvoiceExtraction::default());
    }

    #[test]
    fn test_non_object_is_malformed() {
        let err = parse_invoice_reply("[{\"total_amount\": 5}]").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));

        let err = parse_invoice_reply("42").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn test_currency_string_total() {
        let result = parse_invoice_reply(r#"{"total_amount": "$1,234.50"}"#).unwrap();
        assert_eq!(result.total_amount, 1234.50);
    }

    #[test]
    fn test_uncoercible_total_is_zero() {
        let result = parse_invoice_reply(r#"{"total_amount": "unknown"}"#).unwrap();
        assert_eq!(result.total_amount, 0.0);
    }

    #[test]
    fn test_non_finite_and_negative_totals_are_zero() {
        let result = parse_invoice_reply(r#"{"total_amount": "NaN"}"#).unwrap();
        assert_eq!(result.total_amount, 0.0);

        let result = parse_invoice_reply(r#"{"total_amount": "inf"}"#).unwrap();
        assert_eq!(result.total_amount, 0.0);

        let result = parse_invoice_reply(r#"{"total_amount": -12.5}"#).unwrap();
        assert_eq!(result.total_amount, 0.0);
    }

    #[test]
    fn test_null_total_is_zero() {
        let result = parse_invoice_reply(r#"{"total_amount": null}"#).unwrap();
        assert_eq!(result.total_amount, 0.0);
    }

    #[test]
    fn test_dates_parse_or_drop() {
        let result = parse_invoice_reply(
            r#"{"invoice_date": "2024-01-05", "due_date": "YYYY-MM-DD or null"}"#,
        )
        .unwrap();
        assert_eq!(result.invoice_date, NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(result.due_date, None);

        let result = parse_invoice_reply(r#"{"invoice_date": "2024-02-30"}"#).unwrap();
        assert_eq!(result.invoice_date, None);

        let result = parse_invoice_reply(r#"{"invoice_date": 20240105}"#).unwrap();
        assert_eq!(result.invoice_date, None);
    }

    #[test]
    fn test_items_keep_order_and_coerce_fields() {
        let reply = r#"{
            "items": [
                {"name": "Widget", "quantity": 2, "price": "$10.00", "total": 20},
                {"name": "Gadget", "quantity": "1", "price": 5.5, "total": "5.50"},
                {"quantity": 1}
            ],
            "total_amount": 25.5
        }"#;
        let result = parse_invoice_reply(reply).unwrap();

        assert_eq!(result.items.len(), 3);
        assert_eq!(result.items[0].name, "Widget");
        assert_eq!(result.items[0].quantity, 2.0);
        assert_eq!(result.items[0].price, 10.0);
        assert_eq!(result.items[1].name, "Gadget");
        assert_eq!(result.items[1].quantity, 1.0);
        assert_eq!(result.items[1].total, 5.5);
        assert_eq!(result.items[2].name, "");
        assert_eq!(result.items[2].price, 0.0);
        assert_eq!(result.total_amount, 25.5);
    }

    #[test]
    fn test_null_items_are_empty() {
        let result = parse_invoice_reply(r#"{"items": null}"#).unwrap();
        assert!(result.items.is_empty());
    }

    #[test]
    fn test_structurally_wrong_items_are_malformed() {
        let err = parse_invoice_reply(r#"{"items": "Widget x1"}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));

        let err = parse_invoice_reply(r#"{"items": ["Widget"]}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn test_parse_currency() {
        assert_eq!(parse_currency("$1,234.50"), Some(1234.50));
        assert_eq!(parse_currency(" 50.00 "), Some(50.0));
        assert_eq!(parse_currency("unknown"), None);
        assert_eq!(parse_currency(""), None);
    }

    #[test]
    fn test_truncate_long_reply() {
        let long = "x".repeat(500);
        let truncated = truncate(&long);
        assert_eq!(truncated.len(), MAX_ECHO_LEN + 3);
        assert!(truncated.ends_with("..."));
    }
}
