//! Validation error set attached to a record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One validation message, tagged with the attribute it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationMessage {
    pub attribute: String,
    pub message: String,
}

/// Per-attribute validation messages.
///
/// The [`Errors::BASE`] key holds record-level messages that no single
/// attribute owns; editing an attribute never clears them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Errors {
    entries: BTreeMap<String, Vec<String>>,
}

impl Errors {
    /// Key for errors that belong to the record as a whole.
    pub const BASE: &'static str = "base";

    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an error set from `(attribute, messages)` pairs.
    /// Attributes with no messages are dropped.
    pub fn from_map<I, K, M>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, M)>,
        K: Into<String>,
        M: IntoIterator,
        M::Item: Into<String>,
    {
        let mut errors = Self::new();
        for (attribute, messages) in entries {
            let attribute = attribute.into();
            for message in messages {
                errors.add(attribute.clone(), message);
            }
        }
        errors
    }

    /// Appends a message for an attribute.
    pub fn add(&mut self, attribute: impl Into<String>, message: impl Into<String>) {
        self.entries
            .entry(attribute.into())
            .or_default()
            .push(message.into());
    }

    /// Removes every message for an attribute. Returns whether any existed.
    pub fn remove(&mut self, attribute: &str) -> bool {
        self.entries.remove(attribute).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of messages.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn has(&self, attribute: &str) -> bool {
        self.entries.contains_key(attribute)
    }

    /// Messages for an attribute, in the order they were added.
    pub fn get(&self, attribute: &str) -> &[String] {
        self.entries.get(attribute).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn errors_for(&self, attribute: &str) -> Vec<ValidationMessage> {
        self.get(attribute)
            .iter()
            .map(|message| ValidationMessage {
                attribute: attribute.to_string(),
                message: message.clone(),
            })
            .collect()
    }

    /// Attributes that currently carry messages, sorted.
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Every message, grouped by attribute.
    pub fn iter(&self) -> impl Iterator<Item = ValidationMessage> + '_ {
        self.entries.iter().flat_map(|(attribute, messages)| {
            messages.iter().map(move |message| ValidationMessage {
                attribute: attribute.clone(),
                message: message.clone(),
            })
        })
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for entry in self.iter() {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{} {}", entry.attribute, entry.message)?;
        }
        Ok(())
    }
}
