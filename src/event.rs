//! The schema-less telephony event and the small set of provider-facing
//! option/policy types carried over from the stream abstraction.
//!
//! Events are never deserialized into a fixed struct: PBX dialects differ,
//! and a rigid schema would silently drop producer-specific fields. A
//! [`TelephonyEvent`] is a thin wrapper around a JSON object that forwards
//! every key it was given, verbatim, all the way to the webhook endpoints.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The lower-case key the broker normalizes every event to carry.
pub const DOMAIN_KEY: &str = "domain";
/// The capitalized key producers are also permitted to send.
pub const DOMAIN_KEY_CAPITALIZED: &str = "Domain";
const CALL_ID_KEY: &str = "call_id";
const CALL_ID_KEY_CAPITALIZED: &str = "CallID";

/// An opaque JSON object, preserved verbatim from ingress through delivery.
///
/// The only attribute the broker interprets is the tenant identifier
/// (`domain`/`Domain`); everything else passes through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TelephonyEvent(Map<String, Value>);

impl TelephonyEvent {
    /// Wrap an already-parsed JSON object.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Parse a raw JSON value, rejecting anything that isn't an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// The tenant identifier, if present under either spelling.
    pub fn tenant(&self) -> Option<&str> {
        self.0
            .get(DOMAIN_KEY)
            .or_else(|| self.0.get(DOMAIN_KEY_CAPITALIZED))
            .and_then(Value::as_str)
    }

    /// The call identifier, if present under either spelling.
    pub fn call_id(&self) -> Option<&str> {
        self.0
            .get(CALL_ID_KEY)
            .or_else(|| self.0.get(CALL_ID_KEY_CAPITALIZED))
            .and_then(Value::as_str)
    }

    /// Ensures a lower-case `domain` key is present, copying it from the
    /// capitalized `Domain` key when only that one was sent. Both keys are
    /// left on the object afterward — the broker never removes a field the
    /// producer sent (invariant 1).
    ///
    /// Returns `false` when neither key carries a non-empty string value.
    pub fn normalize_tenant(&mut self) -> bool {
        if matches!(self.0.get(DOMAIN_KEY), Some(Value::String(s)) if !s.is_empty()) {
            return true;
        }
        if let Some(Value::String(domain)) = self.0.get(DOMAIN_KEY_CAPITALIZED).cloned() {
            if !domain.is_empty() {
                self.0.insert(DOMAIN_KEY.to_string(), Value::String(domain));
                return true;
            }
        }
        false
    }

    /// Clones the object, adding/overwriting `delivery_attempt` and
    /// `using_forwarder` per the forwarded-payload contract (§6). Falls back
    /// to the unmodified object if enrichment is impossible (it never is,
    /// since the receiver is already a JSON object, but this keeps the
    /// contract explicit at the call site).
    pub fn enriched(&self, attempt: i64) -> Value {
        let mut enriched = self.0.clone();
        enriched.insert("delivery_attempt".to_string(), Value::from(attempt));
        enriched.insert("using_forwarder".to_string(), Value::from(1));
        Value::Object(enriched)
    }

    /// Borrow the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume and return the underlying JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// A message as handed back by a [`crate::provider::Subscription`], carrying
/// the stream metadata needed by the `ConsumerLoop` state machine.
#[derive(Debug, Clone)]
pub struct ReceivedEvent {
    /// The event payload.
    pub event: TelephonyEvent,
    /// Provider-assigned sequence number.
    pub sequence: u64,
    /// 1-based count of how many times the stream has delivered this message.
    pub num_delivered: u64,
    /// Stream name the message was read from.
    pub stream: String,
}

/// Delivery policy for a durable consumer.
///
/// Maps onto the provider-native delivery policy (NATS JetStream
/// `DeliverPolicy`). The broker always creates its forwarder consumer with
/// `New`, but the type stays general so the observability API's transient
/// tailing consumer (`GET /api/stream/messages`) can request `Last`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum DeliverPolicy {
    /// Deliver only messages published after subscription time.
    #[default]
    New,
    /// Deliver all available messages.
    All,
    /// Deliver starting from the last message.
    Last,
}

/// Options controlling durable subscription creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeOptions {
    /// Maximum delivery attempts before the stream gives up on a message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_deliver: Option<i64>,
    /// How long to wait for an ack before redelivery, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_wait_secs: Option<u64>,
    /// Where to start consuming from.
    #[serde(default)]
    pub deliver_policy: DeliverPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(json: Value) -> TelephonyEvent {
        TelephonyEvent::from_value(json).unwrap()
    }

    #[test]
    fn from_value_rejects_non_objects() {
        assert!(TelephonyEvent::from_value(Value::String("nope".into())).is_none());
        assert!(TelephonyEvent::from_value(Value::Array(vec![])).is_none());
    }

    #[test]
    fn tenant_reads_either_spelling() {
        let e = obj(serde_json::json!({"domain": "t.example"}));
        assert_eq!(e.tenant(), Some("t.example"));

        let e = obj(serde_json::json!({"Domain": "t.example"}));
        assert_eq!(e.tenant(), Some("t.example"));
    }

    #[test]
    fn normalize_inserts_lowercase_without_removing_capitalized() {
        let mut e = obj(serde_json::json!({"Domain": "t.example", "call_id": "c3"}));
        assert!(e.normalize_tenant());
        assert_eq!(e.as_map().get("domain").unwrap(), "t.example");
        assert_eq!(e.as_map().get("Domain").unwrap(), "t.example");
        assert_eq!(e.as_map().get("call_id").unwrap(), "c3");
    }

    #[test]
    fn normalize_fails_when_neither_key_present() {
        let mut e = obj(serde_json::json!({"call_id": "c2"}));
        assert!(!e.normalize_tenant());
    }

    #[test]
    fn enriched_adds_attempt_and_marker_without_losing_fields() {
        let e = obj(serde_json::json!({"domain": "t.example", "call_id": "c1", "state": "missed"}));
        let enriched = e.enriched(2);
        assert_eq!(enriched["delivery_attempt"], 2);
        assert_eq!(enriched["using_forwarder"], 1);
        assert_eq!(enriched["call_id"], "c1");
        assert_eq!(enriched["state"], "missed");
    }

    #[test]
    fn call_id_optional() {
        let e = obj(serde_json::json!({"domain": "t.example"}));
        assert_eq!(e.call_id(), None);
    }
}
