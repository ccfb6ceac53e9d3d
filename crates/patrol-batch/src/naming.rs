//! Output naming.
//!
//! A namer sees the feature's field values and a caller-owned
//! [`NamingState`]; it is called exactly once per written trajectory, in
//! input order.

use std::collections::HashMap;

use crate::input::FeatureInput;

/// Running counters shared by the names of one batch.
#[derive(Debug, Clone, Default)]
pub struct NamingState {
    counters: HashMap<String, u32>,
}

impl NamingState {
    /// Returns the next index for `key`, starting at 0.
    pub fn next_index(&mut self, key: &str) -> u32 {
        let counter = self.counters.entry(key.to_string()).or_insert(0);
        let index = *counter;
        *counter += 1;
        index
    }
}

pub trait TrajectoryNamer: Send + Sync {
    fn name(&self, feature: &FeatureInput, state: &mut NamingState) -> String;
}

/// `<field1>_<field2>_..._<index>`, where the index counts names sharing the
/// same field values.
#[derive(Debug, Clone)]
pub struct KeyedIndexNamer {
    fields: Vec<String>,
    /// Key used when no fields are configured.
    fallback: String,
}

impl KeyedIndexNamer {
    pub fn new(fields: Vec<String>) -> Self {
        Self {
            fields,
            fallback: "trajectory".to_string(),
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    fn key(&self, feature: &FeatureInput) -> String {
        if self.fields.is_empty() {
            return self.fallback.clone();
        }
        self.fields
            .iter()
            .map(|f| sanitize(&feature.field_text(f).unwrap_or_default()))
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl TrajectoryNamer for KeyedIndexNamer {
    fn name(&self, feature: &FeatureInput, state: &mut NamingState) -> String {
        let key = self.key(feature);
        let index = state.next_index(&key);
        format!("{key}_{index}")
    }
}

/// Keeps names usable as file names.
fn sanitize(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_whitespace() => '-',
            c => c,
        })
        .collect()
}
