// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Best-effort decoding of order payloads.

use serde_json::{Map, Value};
use tracing::debug;

/// Value reported for any field that could not be extracted.
pub const UNKNOWN: &str = "unknown";

/// Correlation identifiers extracted from an order message.
///
/// Each field is decoded independently: a payload carrying a valid `orderid` but a numeric
/// `user` still yields the real order id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderDetails {
    order_id: Option<String>,
    user_id: Option<String>,
}

impl OrderDetails {
    /// Never fails; anything missing or mistyped is left as `None`.
    pub fn decode(payload: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(payload) {
            Ok(Value::Object(fields)) => OrderDetails {
                order_id: string_field(&fields, "orderid"),
                user_id: string_field(&fields, "user"),
            },
            Ok(other) => {
                debug!(kind = json_kind(&other), "order payload is not an object");
                OrderDetails::default()
            }
            Err(err) => {
                debug!(error = %err, "malformed order payload");
                OrderDetails::default()
            }
        }
    }

    pub fn order_id(&self) -> &str {
        self.order_id.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn user_id(&self) -> &str {
        self.user_id.as_deref().unwrap_or(UNKNOWN)
    }
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_both_fields_verbatim() {
        let payload = json!({ "orderid": "A100", "user": "u42", "total": 12.5 }).to_string();
        let details = OrderDetails::decode(payload.as_bytes());

        assert_eq!(details.order_id(), "A100");
        assert_eq!(details.user_id(), "u42");
    }

    #[test]
    fn missing_fields_fall_back_independently() {
        let only_order = OrderDetails::decode(br#"{"orderid":"A7"}"#);
        assert_eq!(only_order.order_id(), "A7");
        assert_eq!(only_order.user_id(), UNKNOWN);

        let only_user = OrderDetails::decode(br#"{"user":"bob"}"#);
        assert_eq!(only_user.order_id(), UNKNOWN);
        assert_eq!(only_user.user_id(), "bob");
    }

    #[test]
    fn mistyped_field_does_not_spoil_the_other() {
        let details = OrderDetails::decode(br#"{"orderid":"A8","user":42}"#);
        assert_eq!(details.order_id(), "A8");
        assert_eq!(details.user_id(), UNKNOWN);
    }

    #[test]
    fn non_object_and_garbage_bodies_yield_unknown() {
        for payload in [
            &b"[\"A100\",\"u42\"]"[..],
            b"\"A100\"",
            b"null",
            b"{not json",
            b"",
            &[0xff, 0xfe, 0x00][..],
        ] {
            let details = OrderDetails::decode(payload);
            assert_eq!(details.order_id(), UNKNOWN);
            assert_eq!(details.user_id(), UNKNOWN);
        }
    }
}
