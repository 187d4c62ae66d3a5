//! Cache key codec.
//!
//! A [`CacheKey`] is the identity of one `(name, args, kwargs)` invocation.
//! Positional arguments keep their order; keyword arguments are sorted by
//! name so that the order a caller wrote them in never matters.

use crate::errors::AnalysisError;
use crate::value::{ArgValue, KeyFloat, KeyValue};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Positional and keyword arguments for one invocation.
///
/// Setting the same keyword twice keeps the last value.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    positional: Vec<ArgValue>,
    keywords: Vec<(String, ArgValue)>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<ArgValue>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Set a keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.keywords.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.keywords.push((name, value)),
        }
        self
    }

    pub fn positional(&self) -> &[ArgValue] {
        &self.positional
    }

    pub fn keywords(&self) -> &[(String, ArgValue)] {
        &self.keywords
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keywords.is_empty()
    }
}

/// Canonical identity of an analysis invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub name: String,
    pub args: Vec<KeyValue>,
    /// Sorted by keyword name.
    pub kwargs: Vec<(String, KeyValue)>,
}

impl CacheKey {
    /// Short, stable digest used in log lines.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        // serde_json output for canonical values is deterministic
        match serde_json::to_vec(self) {
            Ok(bytes) => hasher.update(&bytes),
            Err(_) => hasher.update(self.to_string().as_bytes()),
        }
        let digest = format!("{:x}", hasher.finalize());
        digest[..12].to_string()
    }

    pub fn kwarg(&self, name: &str) -> Option<&KeyValue> {
        self.kwargs
            .binary_search_by(|(k, _)| k.as_str().cmp(name))
            .ok()
            .map(|idx| &self.kwargs[idx].1)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        let mut first = true;
        for arg in &self.args {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{arg}")?;
        }
        for (name, value) in &self.kwargs {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{name}={value}")?;
        }
        write!(f, ")")
    }
}

/// Canonicalize `name` plus `arguments` into a [`CacheKey`].
///
/// Fails with [`AnalysisError::UnhashableArgument`] when any value (at any
/// nesting depth) cannot take part in equality comparison.
pub fn make_key(name: &str, arguments: &Arguments) -> Result<CacheKey, AnalysisError> {
    let args = arguments
        .positional()
        .iter()
        .enumerate()
        .map(|(idx, value)| canonicalize(value).map_err(|reason| unhashable(name, idx.to_string(), reason)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut kwargs = arguments
        .keywords()
        .iter()
        .map(|(k, value)| {
            canonicalize(value)
                .map(|v| (k.clone(), v))
                .map_err(|reason| unhashable(name, k.clone(), reason))
        })
        .collect::<Result<Vec<_>, _>>()?;
    kwargs.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(CacheKey {
        name: name.to_string(),
        args,
        kwargs,
    })
}

fn unhashable(analysis: &str, position: String, reason: String) -> AnalysisError {
    AnalysisError::UnhashableArgument {
        analysis: analysis.to_string(),
        position,
        reason,
    }
}

fn canonicalize(value: &ArgValue) -> Result<KeyValue, String> {
    match value {
        ArgValue::Null => Ok(KeyValue::Null),
        ArgValue::Bool(b) => Ok(KeyValue::Bool(*b)),
        ArgValue::Int(i) => Ok(KeyValue::Int(*i)),
        ArgValue::Float(x) => KeyFloat::new(*x)
            .map(KeyValue::Float)
            .ok_or_else(|| "NaN is not equal to itself".to_string()),
        ArgValue::Str(s) => Ok(KeyValue::Str(s.clone())),
        ArgValue::Bytes(b) => Ok(KeyValue::Bytes(b.clone())),
        ArgValue::List(items) => items
            .iter()
            .map(canonicalize)
            .collect::<Result<Vec<_>, _>>()
            .map(KeyValue::List),
        // BTreeMap iteration is already sorted by key
        ArgValue::Map(entries) => entries
            .iter()
            .map(|(k, v)| canonicalize(v).map(|v| (k.clone(), v)))
            .collect::<Result<Vec<_>, _>>()
            .map(KeyValue::Map),
        ArgValue::Opaque(_) => Err("opaque handles have no value identity".to_string()),
    }
}
