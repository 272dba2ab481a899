//! Client Config (CC) — declarative description of one tool provider
//! (spec.md §3).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// The reserved name of the built-in in-process client (spec.md §6).
pub const BIFROST_INTERNAL: &str = "bifrostInternal";

/// Transport kind for a client (spec.md §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Stdio,
    Http,
    Sse,
    #[serde(rename = "in-process")]
    InProcess,
}

/// A set of tool names, or the wildcard `{*}`, or the empty set.
///
/// Used for both `toolsToExecute` and `toolsToAutoExecute`. An empty
/// `Named` set means "deny all" / "all require approval" depending on which
/// field it appears in (spec.md §3).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ToolFilter {
    /// Nothing is permitted.
    #[default]
    None,
    /// Everything is permitted (the literal `"*"`).
    All,
    /// Exactly these tool names are permitted.
    Named(HashSet<String>),
}

impl ToolFilter {
    pub fn named(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let set: HashSet<String> = names.into_iter().map(Into::into).collect();
        if set.is_empty() {
            ToolFilter::None
        } else {
            ToolFilter::Named(set)
        }
    }

    /// True when `tool_name` is permitted by this filter.
    pub fn allows(&self, tool_name: &str) -> bool {
        match self {
            ToolFilter::None => false,
            ToolFilter::All => true,
            ToolFilter::Named(set) => set.contains(tool_name),
        }
    }
}

impl Serialize for ToolFilter {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            ToolFilter::None => serializer.collect_seq(std::iter::empty::<String>()),
            ToolFilter::All => serializer.collect_seq(std::iter::once("*")),
            ToolFilter::Named(set) => serializer.collect_seq(set.iter()),
        }
    }
}

impl<'de> Deserialize<'de> for ToolFilter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let names: Vec<String> = Vec::deserialize(deserializer)?;
        if names.iter().any(|n| n == "*") {
            Ok(ToolFilter::All)
        } else {
            Ok(ToolFilter::named(names))
        }
    }
}

/// Transport-specific connection details.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransportConfig {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: Vec<(String, String)>,
    },
    Http {
        url: String,
        #[serde(default)]
        headers: Vec<(String, String)>,
    },
    InProcess,
}

/// Declarative description of one tool provider (spec.md §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Unique, stable handle used for admin ops and cancellation bookkeeping.
    pub id: String,
    /// Externally visible identifier: used in qualified tool names and
    /// sandbox bindings. Must be a valid identifier (see [`is_valid_identifier`]).
    pub name: String,
    pub connection_type: ConnectionType,
    pub transport: TransportConfig,
    /// Tools from this client that are callable at all. Empty = deny all.
    #[serde(default)]
    pub tools_to_execute: ToolFilter,
    /// Subset of `tools_to_execute` that bypasses user approval in the agent
    /// loop. Empty = all require approval.
    #[serde(default)]
    pub tools_to_auto_execute: ToolFilter,
    /// Whether this client's tools are reachable from sandboxed code.
    #[serde(default)]
    pub is_code_mode_client: bool,
    /// Per-call timeout override; falls back to the dispatcher default
    /// (30s) when `None`.
    #[serde(default)]
    pub call_timeout_secs: Option<u64>,
}

impl ClientConfig {
    /// Validates invariants that don't depend on any other client: a valid
    /// identifier name, and a transport block matching `connection_type`.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if !is_valid_identifier(&self.name) {
            return Err(GatewayError::Validation(format!(
                "client name {:?} is not a valid identifier",
                self.name
            )));
        }
        let transport_matches = matches!(
            (&self.connection_type, &self.transport),
            (ConnectionType::Stdio, TransportConfig::Stdio { .. })
                | (ConnectionType::Http, TransportConfig::Http { .. })
                | (ConnectionType::Sse, TransportConfig::Http { .. })
                | (ConnectionType::InProcess, TransportConfig::InProcess)
        );
        if !transport_matches {
            return Err(GatewayError::Validation(format!(
                "client {:?}: connection_type {:?} does not match transport block",
                self.name, self.connection_type
            )));
        }
        Ok(())
    }
}

/// `name` must be usable both as a sandbox top-level binding and as the
/// left half of a qualified tool name, so it follows identifier rules:
/// starts with an ASCII letter or underscore, continues with alphanumerics
/// or underscores.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Builds the qualified tool name `<clientName>-<toolName>` (spec.md §3).
pub fn qualify(client_name: &str, tool_name: &str) -> String {
    format!("{client_name}-{tool_name}")
}

/// Splits a qualified tool name into `(clientName, toolName)`.
///
/// The split point is the *first* `-`, matching spec.md §4.3's "strips the
/// `<clientName>-` prefix" — client names themselves cannot contain `-`
/// since they must be identifiers, so this is unambiguous.
pub fn unqualify(qualified: &str) -> Option<(&str, &str)> {
    qualified.split_once('-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_validation() {
        assert!(is_valid_identifier("GoTestServer"));
        assert!(is_valid_identifier("_private"));
        assert!(!is_valid_identifier("3server"));
        assert!(!is_valid_identifier("go-test"));
        assert!(!is_valid_identifier(""));
    }

    #[test]
    fn qualify_and_unqualify_round_trip() {
        let q = qualify("GoTestServer", "uuid_generate");
        assert_eq!(q, "GoTestServer-uuid_generate");
        assert_eq!(unqualify(&q), Some(("GoTestServer", "uuid_generate")));
    }

    #[test]
    fn tool_filter_wildcard_allows_anything() {
        assert!(ToolFilter::All.allows("anything"));
        assert!(!ToolFilter::None.allows("anything"));
        let named = ToolFilter::named(["a", "b"]);
        assert!(named.allows("a"));
        assert!(!named.allows("c"));
    }

    #[test]
    fn empty_named_set_collapses_to_none() {
        let empty: Vec<String> = vec![];
        assert_eq!(ToolFilter::named(empty), ToolFilter::None);
    }
}
