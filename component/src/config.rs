//! Key-value configuration handed to each component.
//!
//! Every key maps to one or more string values, so list properties such as
//! `subscribe` share the same lookup as scalar ones. Parsing the platform's
//! model files is someone else's job; this type only offers presence and
//! value queries plus a JSON loader.

use std::{collections::BTreeMap, path::Path};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

pub const MACHINE_NAME: &str = "hostname";
pub const PORT: &str = "port";
pub const SCHEDULER: &str = "scheduler";
pub const SUBSCRIBE: &str = "subscribe";
pub const PUBLISH: &str = "publish";

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
enum RawValue {
    One(String),
    Many(Vec<String>),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComponentConfig {
    properties: BTreeMap<String, Vec<String>>,
}

impl ComponentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a flat JSON object whose values are strings or string arrays.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let raw: BTreeMap<String, RawValue> = serde_json::from_str(text)?;
        let properties = raw
            .into_iter()
            .map(|(key, value)| match value {
                RawValue::One(v) => (key, vec![v]),
                RawValue::Many(vs) => (key, vs),
            })
            .collect();
        Ok(Self { properties })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Builder form of [`ComponentConfig::push`].
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    /// Append `value` to the values of `key`.
    pub fn push(&mut self, key: &str, value: impl Into<String>) {
        self.properties
            .entry(key.to_string())
            .or_default()
            .push(value.into());
    }

    /// Replace all values of `key` with `value`.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.properties.insert(key.to_string(), vec![value.into()]);
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.properties.get(key).is_some_and(|v| !v.is_empty())
    }

    /// First value of `key`.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    pub fn property_list(&self, key: &str) -> &[String] {
        self.properties.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.property(key)
            .ok_or_else(|| ConfigError::MissingParameter(key.to_string()))
    }

    pub fn machine_name(&self) -> Result<&str, ConfigError> {
        self.require(MACHINE_NAME)
    }

    pub fn scheduler_host(&self) -> Option<&str> {
        self.property(SCHEDULER)
    }

    /// Outbound port; `0` lets the system pick one.
    pub fn port(&self) -> Result<u16, ConfigError> {
        match self.property(PORT) {
            None => Ok(0),
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                key: PORT.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Check the parameters a component declared.
    ///
    /// Missing mandatory parameters are an error. Missing optional ones are
    /// returned so the caller can report them.
    pub fn validate(&self, spec: &ParamSpec) -> Result<Vec<String>, ConfigError> {
        if let Some(missing) = spec.mandatory.iter().find(|p| !self.has_property(p)) {
            return Err(ConfigError::MissingParameter(missing.to_string()));
        }
        let absent: Vec<String> = spec
            .optional
            .iter()
            .filter(|p| !self.has_property(p))
            .map(|p| p.to_string())
            .collect();
        for param in &absent {
            warn!("optional configuration parameter {param} is missing");
        }
        Ok(absent)
    }
}

/// Parameter names a component expects in its configuration.
#[derive(Clone, Debug, Default)]
pub struct ParamSpec {
    pub mandatory: Vec<&'static str>,
    pub optional: Vec<&'static str>,
}

impl ParamSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mandatory(mut self, name: &'static str) -> Self {
        self.mandatory.push(name);
        self
    }

    pub fn optional(mut self, name: &'static str) -> Self {
        self.optional.push(name);
        self
    }
}
