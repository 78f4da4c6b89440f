//! Route identifiers and match results.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::method::Method;

/// Opaque identifier assigned to each (method, pattern) registration.
///
/// Keys are assigned monotonically starting at zero; the caller maps them
/// to handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteKey(u32);

impl RouteKey {
    /// Creates a key from its raw index.
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index, suitable for indexing a handler table.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A registered route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDef {
    pub method: Method,
    pub pattern: String,
    pub key: RouteKey,
}

/// A captured parameter. `value` is `None` for an omitted optional
/// parameter under [`OptionalParamDefaults::SetUndefined`].
///
/// [`OptionalParamDefaults::SetUndefined`]: crate::OptionalParamDefaults::SetUndefined
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: Option<String>,
}

/// Parameters extracted from a matched path, in path order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(Vec<Param>);

impl Params {
    /// Creates empty params.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter with a value.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push(Param {
            name: name.into(),
            value: Some(value.into()),
        });
    }

    /// Appends a parameter without a value.
    pub fn push_undefined(&mut self, name: impl Into<String>) {
        self.0.push(Param {
            name: name.into(),
            value: None,
        });
    }

    /// Gets a parameter value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.value.as_deref())
    }

    /// Returns true if `name` is present, with or without a value.
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|p| p.name == name)
    }

    /// Returns true if `name` is present without a value.
    pub fn is_undefined(&self, name: &str) -> bool {
        self.0.iter().any(|p| p.name == name && p.value.is_none())
    }

    /// Parses a parameter as a specific type.
    pub fn parse<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|v| v.parse().ok())
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns an iterator over the parameters.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0.iter().map(|p| (p.name.as_str(), p.value.as_deref()))
    }
}

/// A successful match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteMatch {
    pub key: RouteKey,
    pub params: Params,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params() {
        let mut params = Params::new();
        params.push("id", "123");
        params.push_undefined("tab");

        assert_eq!(params.get("id"), Some("123"));
        assert_eq!(params.parse::<i64>("id"), Some(123));
        assert_eq!(params.get("tab"), None);
        assert!(params.contains("tab"));
        assert!(params.is_undefined("tab"));
        assert!(!params.is_undefined("id"));
        assert_eq!(params.get("missing"), None);
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_route_key_serializes_as_number() {
        let json = serde_json::to_string(&RouteKey::new(7)).unwrap();
        assert_eq!(json, "7");
        assert_eq!(RouteKey::new(7).to_string(), "#7");
    }
}
