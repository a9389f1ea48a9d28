//! Capability negotiation types (MCP 2025-06-18 §initialize).
//!
//! A feature is *available* on a session iff both the client and the server
//! advertised it during `initialize` — see [`ServerCapabilities::intersect`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client-advertised capabilities.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<UnitCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elicitation: Option<UnitCapability>,
}

/// Server-advertised capabilities.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<UnitCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completions: Option<UnitCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<ListChangedCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ListChangedCapability>,
}

/// A capability with no sub-flags, present or absent.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UnitCapability {}

/// A capability whose only flag is whether its list can change.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListChangedCapability {
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Resource capability — subscribe support plus list-changed.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResourcesCapability {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Roots capability.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RootsCapability {
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

impl ServerCapabilities {
    /// Capabilities actually usable on a session: features both sides
    /// advertised. The server's capability map is the advertised ceiling;
    /// this narrows it to what the negotiating client also declared.
    #[must_use]
    pub fn intersect(&self, client: &ClientCapabilities) -> NegotiatedCapabilities {
        NegotiatedCapabilities {
            logging: self.logging.is_some(),
            completions: self.completions.is_some(),
            prompts: self.prompts.is_some(),
            resources: self.resources.is_some(),
            tools: self.tools.is_some(),
            sampling: client.sampling.is_some(),
            elicitation: client.elicitation.is_some(),
            roots: client.roots.is_some(),
        }
    }
}

/// The subset of capabilities actually available on a session after
/// negotiation — a flat, easily-queried table rather than a nested map.
#[derive(Debug, Clone, Copy, Default)]
pub struct NegotiatedCapabilities {
    pub logging: bool,
    pub completions: bool,
    pub prompts: bool,
    pub resources: bool,
    pub tools: bool,
    pub sampling: bool,
    pub elicitation: bool,
    pub roots: bool,
}

impl NegotiatedCapabilities {
    /// Whether the given server→client notification method is admitted.
    #[must_use]
    pub fn admits_notification(&self, method: &str) -> bool {
        match method {
            "notifications/message" => self.logging,
            "notifications/resources/updated" | "notifications/resources/list_changed" => {
                self.resources
            }
            "notifications/prompts/list_changed" => self.prompts,
            "notifications/tools/list_changed" => self.tools,
            "notifications/progress" | "notifications/cancelled" => true,
            _ => false,
        }
    }

    /// Whether the given server→client request method is admitted.
    ///
    /// `completion/complete` is deliberately absent: this server treats
    /// completion as client-origin only (the client asks the server to
    /// complete prompt/resource arguments) and never issues it itself.
    #[must_use]
    pub fn admits_client_request(&self, method: &str) -> bool {
        match method {
            "sampling/createMessage" => self.sampling,
            "roots/list" => self.roots,
            "elicitation/create" => self.elicitation,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersect_requires_both_sides() {
        let server = ServerCapabilities {
            logging: Some(UnitCapability {}),
            ..Default::default()
        };
        let client = ClientCapabilities::default();
        let negotiated = server.intersect(&client);
        assert!(negotiated.logging);
        assert!(!negotiated.sampling);
        assert!(!negotiated.admits_client_request("sampling/createMessage"));
    }

    #[test]
    fn progress_and_cancelled_always_admitted() {
        let negotiated = NegotiatedCapabilities::default();
        assert!(negotiated.admits_notification("notifications/progress"));
        assert!(negotiated.admits_notification("notifications/cancelled"));
        assert!(!negotiated.admits_notification("notifications/tools/list_changed"));
    }
}
