use nanorelay_core::{error::Result, AccountId, RelayError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::actions::{IS_FILTERED, SUBSCRIBE, UPDATE};

/// Client → relay request.
/// Wire: `{ "action": "register_account", "account": "nano_1abc" }`
///
/// Unknown extra fields are ignored; an unknown `action` fails to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientAction {
    RegisterAccount { account: AccountId },
    UnregisterAccount { account: AccountId },
    ListenAll,
    UnlistenAll,
}

impl ClientAction {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Relay → node subscription request.
/// Wire: `{ "action": "update", "topic": "confirmation", "options": { "accounts_add": ["nano_1abc"] } }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamRequest {
    pub action: String,
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<SubscriptionOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionOptions {
    /// The node expects an empty string here, not an empty list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accounts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accounts_add: Option<Vec<AccountId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accounts_del: Option<Vec<AccountId>>,
}

impl UpstreamRequest {
    /// Opens the filtered subscription with no accounts yet.
    pub fn subscribe_empty(topic: &str) -> Self {
        Self {
            action: SUBSCRIBE.to_string(),
            topic: topic.to_string(),
            options: Some(SubscriptionOptions {
                accounts: Some(String::new()),
                ..Default::default()
            }),
        }
    }

    /// Subscribes to every event on `topic` with no account filter.
    pub fn subscribe_all(topic: &str) -> Self {
        Self {
            action: SUBSCRIBE.to_string(),
            topic: topic.to_string(),
            options: None,
        }
    }

    pub fn add_account(topic: &str, account: AccountId) -> Self {
        Self {
            action: UPDATE.to_string(),
            topic: topic.to_string(),
            options: Some(SubscriptionOptions {
                accounts_add: Some(vec![account]),
                ..Default::default()
            }),
        }
    }

    pub fn remove_account(topic: &str, account: AccountId) -> Self {
        Self {
            action: UPDATE.to_string(),
            topic: topic.to_string(),
            options: Some(SubscriptionOptions {
                accounts_del: Some(vec![account]),
                ..Default::default()
            }),
        }
    }

    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// One notification from the node, kept as a JSON object so it can be
/// forwarded verbatim.
///
/// Shape of interest:
/// `{ "topic": "confirmation", "message": { "account": "…", "block": { "link_as_account": "…" } } }`
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamEvent {
    body: Map<String, Value>,
}

impl UpstreamEvent {
    pub fn parse(text: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(body) => Ok(Self { body }),
            other => Err(RelayError::Protocol(format!(
                "expected a JSON object from upstream, got {}",
                kind_of(&other)
            ))),
        }
    }

    pub fn topic(&self) -> Option<&str> {
        self.body.get("topic").and_then(Value::as_str)
    }

    /// `message.account`, if present and a string.
    pub fn primary_account(&self) -> Option<AccountId> {
        self.body
            .get("message")
            .and_then(|m| m.get("account"))
            .and_then(Value::as_str)
            .map(AccountId::from)
    }

    /// `message.block.link_as_account`, if present and a string.
    pub fn linked_account(&self) -> Option<AccountId> {
        self.body
            .get("message")
            .and_then(|m| m.get("block"))
            .and_then(|b| b.get("link_as_account"))
            .and_then(Value::as_str)
            .map(AccountId::from)
    }

    /// Serialize the payload for clients with `is_filtered` set.
    pub fn delivery_text(&mut self, is_filtered: bool) -> Result<String> {
        self.body
            .insert(IS_FILTERED.to_string(), Value::Bool(is_filtered));
        Ok(serde_json::to_string(&self.body)?)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
