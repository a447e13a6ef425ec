use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use url::Url;

/// Request descriptor the attack engine fires on every hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackTarget {
    /// The HTTP method (GET, POST, etc.)
    pub method: String,
    /// The URL to request
    pub url: Url,
    /// HTTP headers to include in the request
    pub headers: Vec<Header>,
    /// Request body
    pub body: Option<Vec<u8>>,
}

/// Represents an HTTP header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Header name
    pub name: String,
    /// Header value
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Outcome of a single request fired by the attack engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    /// When the request was started
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// How long the request took
    pub latency: Duration,
    /// HTTP status code, zero when no response was received
    pub status_code: u16,
    /// Error message if the request failed
    pub error: Option<String>,
    /// Method of the request, empty when the targeter failed
    pub method: String,
    /// URL of the request, empty when the targeter failed
    pub url: String,
    /// Size of the response body in bytes
    pub bytes_in: usize,
    /// Size of the request body in bytes
    pub bytes_out: usize,
}

impl Hit {
    /// True for a 2xx response without transport error
    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status_code)
    }
}

/// Summary of the hits of one attack
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    /// Total number of requests
    pub requests: usize,
    /// Number of successful requests (2xx status)
    pub success: usize,
    /// Time between the first and the last hit
    pub duration: Duration,
    /// Minimum latency observed
    pub min: Duration,
    /// Maximum latency observed
    pub max: Duration,
    /// Mean latency
    pub mean: Duration,
    /// 50th percentile latency
    pub p50: Duration,
    /// 90th percentile latency
    pub p90: Duration,
    /// 95th percentile latency
    pub p95: Duration,
    /// 99th percentile latency
    pub p99: Duration,
    /// Requests per second
    pub rate: f64,
    /// Total bytes received
    pub bytes_in: usize,
    /// Total bytes sent
    pub bytes_out: usize,
    /// Success rate (0.0 - 1.0)
    pub success_rate: f64,
    /// Distinct error messages, in order of first appearance
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Connect,
    Trace,
}

impl RequestMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Connect => "CONNECT",
            Self::Trace => "TRACE",
        }
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "CONNECT" => Ok(Self::Connect),
            "TRACE" => Ok(Self::Trace),
            _ => Err(format!("unknown request method: {}", s)),
        }
    }
}

/// How parameters are encoded into the outgoing request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    /// Parameters are not sent
    #[default]
    None,
    /// Parameters go to the URL query
    Query,
    /// Parameters go to an url-encoded form body
    Form,
    /// Parameters go to a JSON object body
    Json,
}

impl RequestType {
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::None | Self::Query => None,
            Self::Form => Some("application/x-www-form-urlencoded"),
            Self::Json => Some("application/json"),
        }
    }
}

impl std::str::FromStr for RequestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "query" => Ok(Self::Query),
            "form" => Ok(Self::Form),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown request type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormInputKind {
    #[default]
    String,
    Number,
}

/// One templated input: a header, a parameter or a target variable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormInput {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub hint: String,
    #[serde(default)]
    pub kind: FormInputKind,
    #[serde(default)]
    pub value: String,
}

impl FormInput {
    pub fn new(kind: FormInputKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(FormInputKind::String, value)
    }

    pub fn number(value: impl Into<String>) -> Self {
        Self::new(FormInputKind::Number, value)
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = hint.into();
        self
    }

    fn json_value(&self) -> serde_json::Value {
        if self.kind == FormInputKind::Number {
            if let Ok(n) = self.value.parse::<serde_json::Number>() {
                return serde_json::Value::Number(n);
            }
        }
        serde_json::Value::String(self.value.clone())
    }
}

/// Ordered mapping of input name to its form input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyFormInput(pub BTreeMap<String, FormInput>);

impl KeyFormInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, input: FormInput) -> Option<FormInput> {
        self.0.insert(key.into(), input)
    }

    pub fn with(mut self, key: impl Into<String>, input: FormInput) -> Self {
        self.insert(key, input);
        self
    }

    pub fn get(&self, key: &str) -> Option<&FormInput> {
        self.0.get(key)
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|input| input.value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FormInput)> {
        self.0.iter()
    }

    pub fn to_headers(&self) -> Vec<Header> {
        self.0
            .iter()
            .map(|(name, input)| Header::new(name.clone(), input.value.clone()))
            .collect()
    }

    /// Encode as `application/x-www-form-urlencoded`
    pub fn to_urlencoded(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, input) in &self.0 {
            serializer.append_pair(name, &input.value);
        }
        serializer.finish()
    }

    /// Encode as a JSON object, number inputs as JSON numbers
    pub fn to_json(&self) -> serde_json::Value {
        let object = self
            .0
            .iter()
            .map(|(name, input)| (name.clone(), input.json_value()))
            .collect();
        serde_json::Value::Object(object)
    }
}

impl FromIterator<(String, FormInput)> for KeyFormInput {
    fn from_iter<I: IntoIterator<Item = (String, FormInput)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
