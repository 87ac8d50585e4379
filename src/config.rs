//! Configuration for the mock registry.
//!
//! Declares ignore-lists, lookup settings and preset mocks.

use crate::error::{MockPlugError, Result};
use crate::fingerprint::UriParts;
use crate::response::HTTP_SUCCESS;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockPlugConfig {
    /// Names excluded from fingerprinting
    #[serde(default)]
    pub ignore: IgnoreConfig,

    /// Global settings
    #[serde(default)]
    pub settings: GlobalSettings,

    /// Mocks registered when the registry is built
    #[serde(default)]
    pub mocks: Vec<MockDefinition>,
}

impl MockPlugConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("failed to load {}", path.display()))?;
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        for (i, mock) in self.mocks.iter().enumerate() {
            mock.validate().map_err(|e| match e {
                MockPlugError::InvalidConfig(msg) => {
                    MockPlugError::InvalidConfig(format!("mock {}: {}", i, msg))
                }
                other => other,
            })?;
        }
        Ok(())
    }
}

/// Ignore-lists applied before fingerprinting.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct IgnoreConfig {
    #[serde(default)]
    pub query_params: Vec<String>,

    #[serde(default)]
    pub headers: Vec<String>,
}

/// A preset request/response pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MockDefinition {
    pub request: RequestDescriptor,

    #[serde(default)]
    pub response: ResponseDefinition,
}

impl MockDefinition {
    pub fn validate(&self) -> Result<()> {
        self.request.validate()?;
        self.response.validate()?;
        Ok(())
    }
}

/// The request side of a mock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestDescriptor {
    /// HTTP verb (GET, POST, ...)
    pub verb: String,

    /// Absolute request URI
    pub uri: String,

    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl RequestDescriptor {
    pub fn validate(&self) -> Result<()> {
        if self.verb.trim().is_empty() {
            return Err(MockPlugError::InvalidConfig(format!(
                "empty verb for {}",
                self.uri
            )));
        }
        UriParts::parse(&self.uri)?;
        Ok(())
    }
}

/// Response definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseDefinition {
    /// HTTP status code
    #[serde(default = "default_status")]
    pub status: u16,

    /// Response headers
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Response body
    #[serde(default)]
    pub body: Option<ResponseBody>,
}

fn default_status() -> u16 {
    HTTP_SUCCESS
}

impl Default for ResponseDefinition {
    fn default() -> Self {
        Self {
            status: HTTP_SUCCESS,
            headers: HashMap::new(),
            body: None,
        }
    }
}

impl ResponseDefinition {
    /// Validate the response definition.
    pub fn validate(&self) -> Result<()> {
        if !(100..=599).contains(&self.status) {
            return Err(MockPlugError::InvalidConfig(format!(
                "invalid status code: {}",
                self.status
            )));
        }
        if let Some(body) = &self.body {
            body.to_value()?;
        }
        Ok(())
    }

    /// The body as a JSON value; `null` when absent.
    pub fn body_value(&self) -> Result<serde_json::Value> {
        match &self.body {
            Some(body) => body.to_value(),
            None => Ok(serde_json::Value::Null),
        }
    }
}

/// Response body configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBody {
    /// Plain text body
    Text { content: String },
    /// JSON body
    Json { content: serde_json::Value },
    /// Base64 encoded binary, rendered lossily as text
    Base64 { content: String },
    /// Load from file
    File { path: String },
}

impl ResponseBody {
    pub fn to_value(&self) -> Result<serde_json::Value> {
        match self {
            ResponseBody::Text { content } => Ok(serde_json::Value::String(content.clone())),
            ResponseBody::Json { content } => Ok(content.clone()),
            ResponseBody::Base64 { content } => {
                use base64::Engine;
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(content)
                    .map_err(|e| MockPlugError::InvalidConfig(format!("invalid base64: {}", e)))?;
                Ok(serde_json::Value::String(
                    String::from_utf8_lossy(&bytes).into_owned(),
                ))
            }
            ResponseBody::File { path } => std::fs::read_to_string(path)
                .map(serde_json::Value::String)
                .map_err(|e| {
                    MockPlugError::InvalidConfig(format!("failed to read file {}: {}", path, e))
                }),
        }
    }
}

/// What a transport does with a request no mock matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedPolicy {
    /// Raise an unmatched-request error
    #[default]
    Fail,
    /// Hand the request to the fallback transport
    Passthrough,
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSettings {
    /// Log matched lookups
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log unmatched lookups
    #[serde(default = "default_true")]
    pub log_unmatched: bool,

    /// Case-insensitive header names when fingerprinting
    #[serde(default = "default_true")]
    pub case_insensitive_headers: bool,

    /// Unmatched request handling at the transport boundary
    #[serde(default)]
    pub unmatched: UnmatchedPolicy,
}

fn default_true() -> bool {
    true
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            log_matches: true,
            log_unmatched: true,
            case_insensitive_headers: true,
            unmatched: UnmatchedPolicy::Fail,
        }
    }
}
