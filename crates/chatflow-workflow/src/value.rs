// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime values carried on wires between blocks.

use std::collections::BTreeMap;

use chatflow_core::{
    ChatSender, ChatflowError, IMMessage, LlmChatResponse, MessageElement, UserProfile,
};
use serde::{Deserialize, Serialize};

use crate::types::names;

/// A value produced by a block output or consumed by a block input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Message(IMMessage),
    Element(MessageElement),
    Sender(ChatSender),
    LlmResponse(LlmChatResponse),
    Profile(UserProfile),
    Json(serde_json::Value),
}

impl Value {
    /// The type-system name of this value's runtime shape.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => names::ANY,
            Self::Bool(_) => names::BOOL,
            Self::Int(_) => names::INT,
            Self::Float(_) => names::FLOAT,
            Self::Text(_) => names::STR,
            Self::List(_) => names::LIST,
            Self::Map(_) => names::MAP,
            Self::Message(_) => names::IM_MESSAGE,
            Self::Element(_) => names::MESSAGE_ELEMENT,
            Self::Sender(_) => names::CHAT_SENDER,
            Self::LlmResponse(_) => names::LLM_CHAT_RESPONSE,
            Self::Profile(_) => names::USER_PROFILE,
            Self::Json(_) => names::JSON,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&IMMessage> {
        match self {
            Self::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sender(&self) -> Option<&ChatSender> {
        match self {
            Self::Sender(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_llm_response(&self) -> Option<&LlmChatResponse> {
        match self {
            Self::LlmResponse(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_profile(&self) -> Option<&UserProfile> {
        match self {
            Self::Profile(p) => Some(p),
            _ => None,
        }
    }

    /// Structural conversion from JSON, used for param defaults.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<IMMessage> for Value {
    fn from(m: IMMessage) -> Self {
        Self::Message(m)
    }
}

impl From<MessageElement> for Value {
    fn from(e: MessageElement) -> Self {
        Self::Element(e)
    }
}

impl From<ChatSender> for Value {
    fn from(s: ChatSender) -> Self {
        Self::Sender(s)
    }
}

impl From<LlmChatResponse> for Value {
    fn from(r: LlmChatResponse) -> Self {
        Self::LlmResponse(r)
    }
}

impl From<UserProfile> for Value {
    fn from(p: UserProfile) -> Self {
        Self::Profile(p)
    }
}

impl From<serde_json::Value> for Value {
    fn from(j: serde_json::Value) -> Self {
        Self::Json(j)
    }
}

/// Named values: a block's inputs going in, or its outputs coming out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(BTreeMap<String, Value>);

/// Inputs passed to [`Block::execute`](crate::block::Block::execute).
pub type Inputs = Values;

/// Outputs returned from [`Block::execute`](crate::block::Block::execute).
pub type Outputs = Values;

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_map(self) -> BTreeMap<String, Value> {
        self.0
    }

    /// A present, non-null value.
    pub fn require(&self, name: &str) -> Result<&Value, ChatflowError> {
        match self.0.get(name) {
            Some(v) if !v.is_null() => Ok(v),
            _ => Err(ChatflowError::Internal(format!("missing input `{name}`"))),
        }
    }

    pub fn text(&self, name: &str) -> Result<&str, ChatflowError> {
        let v = self.require(name)?;
        v.as_str().ok_or_else(|| mismatch(name, names::STR, v))
    }

    pub fn message(&self, name: &str) -> Result<&IMMessage, ChatflowError> {
        let v = self.require(name)?;
        v.as_message().ok_or_else(|| mismatch(name, names::IM_MESSAGE, v))
    }

    pub fn sender(&self, name: &str) -> Result<&ChatSender, ChatflowError> {
        let v = self.require(name)?;
        v.as_sender().ok_or_else(|| mismatch(name, names::CHAT_SENDER, v))
    }

    pub fn llm_response(&self, name: &str) -> Result<&LlmChatResponse, ChatflowError> {
        let v = self.require(name)?;
        v.as_llm_response()
            .ok_or_else(|| mismatch(name, names::LLM_CHAT_RESPONSE, v))
    }

    pub fn list(&self, name: &str) -> Result<&[Value], ChatflowError> {
        let v = self.require(name)?;
        v.as_list().ok_or_else(|| mismatch(name, names::LIST, v))
    }
}

impl FromIterator<(String, Value)> for Values {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, Value>> for Values {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl IntoIterator for Values {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

fn mismatch(name: &str, expected: &str, got: &Value) -> ChatflowError {
    ChatflowError::Internal(format!(
        "input `{name}` expected {expected}, got {}",
        got.type_name()
    ))
}
