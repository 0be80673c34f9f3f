// packages/mockserver/src/state/value.rs
//! Values held by the state store
//!
//! A [`Directive`] is what test code puts into the live directive set: either
//! a literal [`Value`] or a deferred producer that is called once, when the
//! next request is snapshotted. A [`Snapshot`] is the finalized record of one
//! request and only ever holds literal values.

use crate::lifecycle::mail::MailMessage;
use crate::utils::errors::{MockServerError, Result};
use bytes::Bytes;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::SocketAddr;
use std::ops::Index;
use std::sync::Arc;

/// A concrete captured or user-supplied value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(#[serde(serialize_with = "serialize_bytes")] Bytes),
    List(Vec<Value>),

    /// Ordered header pairs, repeated names allowed
    Headers(Vec<(String, String)>),

    Addr(SocketAddr),
    Message(MailMessage),
}

fn serialize_bytes<S: Serializer>(bytes: &Bytes, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(bytes))
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value, integers included
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Raw bytes; strings are viewed as their UTF-8 encoding
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::Str(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_headers(&self) -> Option<&[(String, String)]> {
        match self {
            Value::Headers(pairs) => Some(pairs),
            _ => None,
        }
    }

    pub fn as_addr(&self) -> Option<SocketAddr> {
        match self {
            Value::Addr(addr) => Some(*addr),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&MailMessage> {
        match self {
            Value::Message(message) => Some(message),
            _ => None,
        }
    }

    /// First header value with `name`, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.as_headers()?
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Every header value with `name`, in order
    pub fn header_all(&self, name: &str) -> Vec<&str> {
        self.as_headers()
            .unwrap_or_default()
            .iter()
            .filter(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .collect()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u16> for Value {
    fn from(i: u16) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(Bytes::from(b))
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(Bytes::copy_from_slice(b))
    }
}

impl<const N: usize> From<&[u8; N]> for Value {
    fn from(b: &[u8; N]) -> Self {
        Value::Bytes(Bytes::copy_from_slice(b))
    }
}

impl From<SocketAddr> for Value {
    fn from(addr: SocketAddr) -> Self {
        Value::Addr(addr)
    }
}

impl From<MailMessage> for Value {
    fn from(message: MailMessage) -> Self {
        Value::Message(message)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items.into_iter().map(Value::Str).collect())
    }
}

impl<K: Into<String>, V: Into<String>> From<Vec<(K, V)>> for Value {
    fn from(pairs: Vec<(K, V)>) -> Self {
        Value::Headers(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Value {
    fn from(pairs: [(K, V); N]) -> Self {
        Value::Headers(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<String>> From<HashMap<K, V>> for Value {
    fn from(map: HashMap<K, V>) -> Self {
        Value::Headers(map.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<String>> From<BTreeMap<K, V>> for Value {
    fn from(map: BTreeMap<K, V>) -> Self {
        Value::Headers(map.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl PartialEq<str> for Value {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == Some(other)
    }
}

impl PartialEq<&str> for Value {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == Some(*other)
    }
}

impl PartialEq<i64> for Value {
    fn eq(&self, other: &i64) -> bool {
        self.as_i64() == Some(*other)
    }
}

impl PartialEq<i32> for Value {
    fn eq(&self, other: &i32) -> bool {
        self.as_i64() == Some(i64::from(*other))
    }
}

impl PartialEq<bool> for Value {
    fn eq(&self, other: &bool) -> bool {
        self.as_bool() == Some(*other)
    }
}

impl PartialEq<&[u8]> for Value {
    fn eq(&self, other: &&[u8]) -> bool {
        matches!(self, Value::Bytes(b) if b.as_ref() == *other)
    }
}

impl<const N: usize> PartialEq<&[u8; N]> for Value {
    fn eq(&self, other: &&[u8; N]) -> bool {
        matches!(self, Value::Bytes(b) if b.as_ref() == other.as_slice())
    }
}

/// Zero-argument producer of a deferred directive value
pub type Producer = Arc<dyn Fn() -> Value + Send + Sync>;

/// Entry of the live directive set
#[derive(Clone)]
pub enum Directive {
    Literal(Value),

    /// Called exactly once, when the next request is snapshotted
    Deferred(Producer),
}

impl Directive {
    pub fn literal(value: impl Into<Value>) -> Self {
        Directive::Literal(value.into())
    }

    pub fn deferred<F, V>(producer: F) -> Self
    where
        F: Fn() -> V + Send + Sync + 'static,
        V: Into<Value>,
    {
        Directive::Deferred(Arc::new(move || producer().into()))
    }

    /// Concrete value, calling the producer of a deferred directive
    pub fn resolve(&self) -> Value {
        match self {
            Directive::Literal(value) => value.clone(),
            Directive::Deferred(producer) => producer(),
        }
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Directive::Literal(value) => Some(value),
            Directive::Deferred(_) => None,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Directive::Deferred(_))
    }
}

impl fmt::Debug for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Directive::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<Value> for Directive {
    fn from(value: Value) -> Self {
        Directive::Literal(value)
    }
}

/// Copy of the live directive set
///
/// Holds user directives and the transport fields of the last request.
#[derive(Debug, Clone, Default)]
pub struct Data {
    entries: BTreeMap<String, Directive>,
}

impl Data {
    pub fn new() -> Self {
        Self::default()
    }

    /// Literal value under `key`; deferred entries read as `None`
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).and_then(Directive::as_literal)
    }

    pub fn directive(&self, key: &str) -> Option<&Directive> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Directive)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn insert(&mut self, key: String, directive: Directive) -> Option<Directive> {
        self.entries.insert(key, directive)
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<Directive> {
        self.entries.remove(key)
    }

    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.entries.retain(|key, _| keep(key));
    }
}

impl Index<&str> for Data {
    type Output = Value;

    /// Panics if `key` is missing or deferred
    fn index(&self, key: &str) -> &Value {
        match self.get(key) {
            Some(value) => value,
            None => panic!("no literal value for key {:?}", key),
        }
    }
}

/// Finalized record of one request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Snapshot {
    entries: BTreeMap<String, Value>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First value of a received request header
    pub fn header(&self, name: &str) -> Option<&str> {
        self.get("headers")?.header(name)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| MockServerError::Http(format!("Snapshot serialization error: {}", e)))
    }
}

impl Index<&str> for Snapshot {
    type Output = Value;

    /// Panics if `key` is missing
    fn index(&self, key: &str) -> &Value {
        match self.entries.get(key) {
            Some(value) => value,
            None => panic!("no value for key {:?} in snapshot", key),
        }
    }
}

impl FromIterator<(String, Value)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Extend<(String, Value)> for Snapshot {
    fn extend<I: IntoIterator<Item = (String, Value)>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

impl IntoIterator for Snapshot {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
