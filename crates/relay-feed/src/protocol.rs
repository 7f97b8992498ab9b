//! JSON-RPC framing for the `logsSubscribe` feed.

use relay_core::{Commitment, Notification, SubscriptionHandle, SubscriptionTarget};
use serde::Deserialize;
use serde_json::{Value, json};

/// Notification method name for log subscriptions.
pub const NOTIFICATION_METHOD: &str = "logsNotification";

/// `logsSubscribe` request restricted to transactions mentioning `target`.
pub fn subscribe_request(id: u64, target: &SubscriptionTarget, commitment: Commitment) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "logsSubscribe",
        "params": [
            { "mentions": [target.as_str()] },
            { "commitment": commitment.as_str() },
        ],
    })
    .to_string()
}

/// `logsUnsubscribe` request for an active handle.
pub fn unsubscribe_request(id: u64, handle: SubscriptionHandle) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "logsUnsubscribe",
        "params": [handle.0],
    })
    .to_string()
}

/// A decoded text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    /// Successful reply to a request.
    Response {
        /// Request id being answered.
        id: u64,
        /// The `result` member.
        result: Value,
    },
    /// Error reply. `id` is absent when the feed could not parse the request.
    ErrorResponse {
        /// Request id being answered, if known.
        id: Option<u64>,
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
    },
    /// A log notification for an active subscription.
    Notification(Notification),
    /// Any other server-initiated message.
    Other {
        /// The `method` member, if present.
        method: Option<String>,
    },
}

/// Frame that does not decode as a feed message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed feed message: {0}")]
pub struct DecodeError(pub String);

#[derive(Deserialize)]
struct Envelope {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<ErrorObject>,
    method: Option<String>,
    params: Option<Value>,
}

#[derive(Deserialize)]
struct ErrorObject {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct LogsParams {
    subscription: u64,
    result: LogsResult,
}

#[derive(Deserialize)]
struct LogsResult {
    context: LogsContext,
    value: LogsValue,
}

#[derive(Deserialize)]
struct LogsContext {
    slot: u64,
}

#[derive(Deserialize)]
struct LogsValue {
    signature: String,
    #[serde(default)]
    err: Option<Value>,
    #[serde(default)]
    logs: Vec<String>,
}

/// Decode one text frame.
pub fn decode(text: &str) -> Result<FeedMessage, DecodeError> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|e| DecodeError(e.to_string()))?;

    if let Some(error) = envelope.error {
        return Ok(FeedMessage::ErrorResponse {
            id: envelope.id,
            code: error.code,
            message: error.message,
        });
    }

    match (envelope.id, envelope.method) {
        (Some(id), None) => Ok(FeedMessage::Response {
            id,
            result: envelope.result.unwrap_or(Value::Null),
        }),
        (_, Some(method)) if method == NOTIFICATION_METHOD => {
            let params = envelope
                .params
                .ok_or_else(|| DecodeError("notification without params".into()))?;
            let params: LogsParams =
                serde_json::from_value(params).map_err(|e| DecodeError(e.to_string()))?;
            Ok(FeedMessage::Notification(Notification {
                subscription: SubscriptionHandle(params.subscription),
                slot: params.result.context.slot,
                signature: params.result.value.signature,
                err: params.result.value.err,
                logs: params.result.value.logs,
            }))
        }
        (_, method) => Ok(FeedMessage::Other { method }),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn subscribe_request_shape() {
        let target = SubscriptionTarget::new("Vote111111111111111111111111111111111111111").unwrap();
        let req: Value =
            serde_json::from_str(&subscribe_request(7, &target, Commitment::Confirmed)).unwrap();
        assert_eq!(
            req,
            json!({
                "jsonrpc": "2.0",
                "id": 7,
                "method": "logsSubscribe",
                "params": [
                    {"mentions": ["Vote111111111111111111111111111111111111111"]},
                    {"commitment": "confirmed"}
                ]
            })
        );
    }

    #[test]
    fn unsubscribe_request_carries_handle() {
        let req: Value =
            serde_json::from_str(&unsubscribe_request(2, SubscriptionHandle(4242))).unwrap();
        assert_eq!(req["method"], "logsUnsubscribe");
        assert_eq!(req["params"], json!([4242]));
        assert_eq!(req["id"], 2);
    }

    #[test]
    fn decodes_confirmation() {
        let msg = decode(r#"{"jsonrpc":"2.0","result":24040,"id":1}"#).unwrap();
        assert_eq!(
            msg,
            FeedMessage::Response {
                id: 1,
                result: json!(24040)
            }
        );
    }

    #[test]
    fn decodes_error_reply() {
        let msg = decode(
            r#"{"jsonrpc":"2.0","error":{"code":-32602,"message":"Invalid params"},"id":1}"#,
        )
        .unwrap();
        assert_matches!(
            msg,
            FeedMessage::ErrorResponse { id: Some(1), code: -32602, message } if message == "Invalid params"
        );
    }

    #[test]
    fn decodes_logs_notification() {
        let text = json!({
            "jsonrpc": "2.0",
            "method": "logsNotification",
            "params": {
                "result": {
                    "context": {"slot": 5208469},
                    "value": {
                        "signature": "5h6xBEauJ3PK6SWCZ1PGjBvj8vDdWG3KpwATGy1ARAXFSDwt8GFXM7W5Ncn16wmqokgpiKRLuS83KUxyZyv2sUYv",
                        "err": null,
                        "logs": ["Program 11111111111111111111111111111111 invoke [1]"]
                    }
                },
                "subscription": 24040
            }
        })
        .to_string();

        let FeedMessage::Notification(n) = decode(&text).unwrap() else {
            panic!("expected notification");
        };
        assert_eq!(n.subscription, SubscriptionHandle(24040));
        assert_eq!(n.slot, 5_208_469);
        assert!(n.err.is_none());
        assert_eq!(n.logs.len(), 1);
        assert!(n.signature.starts_with("5h6xBE"));
    }

    #[test]
    fn failed_transaction_keeps_err() {
        let text = json!({
            "jsonrpc": "2.0",
            "method": "logsNotification",
            "params": {
                "result": {
                    "context": {"slot": 1},
                    "value": {"signature": "abc", "err": {"InstructionError": [0, "Custom"]}}
                },
                "subscription": 1
            }
        })
        .to_string();
        let FeedMessage::Notification(n) = decode(&text).unwrap() else {
            panic!("expected notification");
        };
        assert!(n.err.is_some());
        assert!(n.logs.is_empty());
    }

    #[test]
    fn notification_missing_signature_is_error() {
        let text = json!({
            "jsonrpc": "2.0",
            "method": "logsNotification",
            "params": {"result": {"context": {"slot": 1}, "value": {}}, "subscription": 1}
        })
        .to_string();
        assert!(decode(&text).is_err());
    }

    #[test]
    fn unknown_method_is_other() {
        let msg = decode(r#"{"jsonrpc":"2.0","method":"slotNotification","params":{}}"#).unwrap();
        assert_eq!(
            msg,
            FeedMessage::Other {
                method: Some("slotNotification".into())
            }
        );
    }

    #[test]
    fn garbage_is_error() {
        assert!(decode("not json").is_err());
    }
}
