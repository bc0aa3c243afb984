//! Request parameter and job result value model.
//!
//! Requests are built from [`ParamValue`]s, which distinguish binary blobs
//! and structured objects from plain JSON so the codec knows what to wrap.
//! Responses decode into [`ResultValue`]s, which may carry raw bytes or a
//! deserialized object once the codec has unwrapped them.

use std::collections::BTreeMap;

use serde_json::Value;

/// A single request parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Transmitted unchanged (string, number, boolean, sequence, mapping).
    Json(Value),
    /// Binary blob, wrapped as a `data:` URI before transmission.
    Bytes(Vec<u8>),
    /// Structured object. Serialized and wrapped when object serialization
    /// is enabled on the codec, otherwise transmitted as plain JSON.
    Object(Value),
}

impl From<Value> for ParamValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Json(Value::String(value.to_string()))
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Json(Value::String(value))
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Json(Value::Bool(value))
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Json(Value::from(value))
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Json(Value::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Json(Value::from(value))
    }
}

impl From<Vec<u8>> for ParamValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&[u8]> for ParamValue {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

/// Parameters of one job request, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParams {
    values: BTreeMap<String, ParamValue>,
}

impl RequestParams {
    /// Empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Insert a parameter, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Option<ParamValue> {
        self.values.insert(key.into(), value.into())
    }

    /// Remove a parameter.
    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.values.remove(key)
    }

    /// Look up a parameter.
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    /// Whether `key` is set.
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no parameter is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.values.iter()
    }

    /// The underlying map.
    pub fn into_inner(self) -> BTreeMap<String, ParamValue> {
        self.values
    }
}

impl<K, V> FromIterator<(K, V)> for RequestParams
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// A response field after decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue {
    /// Left as received.
    Json(Value),
    /// Unwrapped base64 payload.
    Bytes(Vec<u8>),
    /// Unwrapped and deserialized base64 payload.
    Object(Value),
    /// A list whose string elements were decoded individually.
    List(Vec<ResultValue>),
}

impl ResultValue {
    /// The text, if this is a plain string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Json(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// The bytes, if this is a decoded blob.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// The JSON value, unless this is a blob or a list.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) | Self::Object(value) => Some(value),
            _ => None,
        }
    }

    /// The items, if this is a list.
    pub fn as_list(&self) -> Option<&[ResultValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

/// Decoded response fields, keyed by field name.
pub type DecodedFields = BTreeMap<String, ResultValue>;

/// Wrap raw JSON fields without decoding any of them.
pub fn passthrough_fields(fields: serde_json::Map<String, Value>) -> DecodedFields {
    fields
        .into_iter()
        .map(|(key, value)| (key, ResultValue::Json(value)))
        .collect()
}

/// The terminal result of one job.
///
/// Field contents are endpoint specific (text, images, audio, timing
/// metadata). `success` and `job_id` are the only fields every endpoint
/// shares.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobResult {
    fields: DecodedFields,
}

impl JobResult {
    /// Wrap decoded fields.
    pub fn new(fields: DecodedFields) -> Self {
        Self { fields }
    }

    /// `true` only when the server explicitly reported success.
    pub fn success(&self) -> bool {
        matches!(
            self.fields.get("success"),
            Some(ResultValue::Json(Value::Bool(true)))
        )
    }

    /// The `job_id` field, if present.
    pub fn job_id(&self) -> Option<&str> {
        self.get_str("job_id")
    }

    /// Look up a field.
    pub fn get(&self, key: &str) -> Option<&ResultValue> {
        self.fields.get(key)
    }

    /// A field as text.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(ResultValue::as_str)
    }

    /// A field as decoded bytes.
    pub fn get_bytes(&self, key: &str) -> Option<&[u8]> {
        self.fields.get(key).and_then(ResultValue::as_bytes)
    }

    /// Insert a field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: ResultValue) -> Option<ResultValue> {
        self.fields.insert(key.into(), value)
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// All decoded fields.
    pub fn fields(&self) -> &DecodedFields {
        &self.fields
    }

    /// The decoded fields, consumed.
    pub fn into_fields(self) -> DecodedFields {
        self.fields
    }
}
