// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! Configuration document schema
//!
//! The routing configuration is a single JSON document with a required
//! `version` field. Version 2 is current (named profiles); version 1
//! documents carried a flat top-level route list and are upgraded into a
//! "Default" profile on load. Field names are camelCase on the wire.

use crate::endpoint::EndpointId;
use crate::filter::RouteFilter;
use crate::logging::LoggingConfig;
use crate::message_log;
use crate::route::{RouteDefinition, RouteId};
use crate::taxonomy::MessageType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::warn;

/// Current schema version.
pub const CONFIG_VERSION: u32 = 2;

/// Name of the profile used when `activeProfileName` is blank.
pub const DEFAULT_PROFILE: &str = "Default";

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub version: u32,
    #[serde(default)]
    pub active_profile_name: String,
    #[serde(default = "default_log_buffer_size")]
    pub log_buffer_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
    #[serde(default)]
    pub profiles: Vec<ProfileConfig>,
}

fn default_log_buffer_size() -> usize {
    message_log::DEFAULT_CAPACITY
}

/// A named set of routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileConfig {
    pub name: String,
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
}

/// Persisted form of one route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RouteId>,
    pub source_endpoint_id: String,
    pub target_endpoint_id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub channels: Vec<u8>,
    #[serde(default)]
    pub message_types: Vec<MessageType>,
}

fn default_true() -> bool {
    true
}

impl RouteEntry {
    /// Build the in-memory route. Returns `None` (with a warning) for
    /// entries that cannot form a valid route; config load skips them
    /// rather than rejecting the whole document.
    pub fn into_route(self) -> Option<RouteDefinition> {
        let source = self.source_endpoint_id.trim();
        let target = self.target_endpoint_id.trim();
        if source.is_empty() || target.is_empty() {
            warn!("skipping route with blank endpoint id");
            return None;
        }
        let source = EndpointId::from(source);
        let target = EndpointId::from(target);
        if source == target {
            warn!(%source, "skipping route from endpoint to itself");
            return None;
        }

        // De-duplicate and drop out-of-range channels instead of failing:
        // persisted documents may predate stricter validation.
        let channels: BTreeSet<u8> = self
            .channels
            .into_iter()
            .filter(|c| (1..=16).contains(c))
            .collect();
        let filter = RouteFilter::new(channels, self.message_types).ok()?;

        Some(RouteDefinition {
            id: self.id.unwrap_or_default(),
            source,
            target,
            enabled: self.enabled,
            filter,
        })
    }

    pub fn from_route(route: &RouteDefinition) -> Self {
        Self {
            id: Some(route.id),
            source_endpoint_id: route.source.as_str().to_string(),
            target_endpoint_id: route.target.as_str().to_string(),
            enabled: route.enabled,
            channels: route.filter.channels().collect(),
            message_types: route.filter.message_types().collect(),
        }
    }
}

impl AppConfig {
    /// Clamp fields to their documented bounds after a load.
    pub(crate) fn sanitize(&mut self) {
        self.log_buffer_size = self
            .log_buffer_size
            .clamp(message_log::MIN_CAPACITY, message_log::MAX_CAPACITY);
    }

    /// Profile selected by `activeProfileName`; blank means "Default".
    pub fn active_profile_name(&self) -> &str {
        let name = self.active_profile_name.trim();
        if name.is_empty() { DEFAULT_PROFILE } else { name }
    }

    /// Routes of the active profile, sanitized into route definitions.
    /// An unknown profile name yields no routes.
    pub fn active_routes(&self) -> Vec<RouteDefinition> {
        let wanted = self.active_profile_name();
        self.profiles
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(wanted))
            .map(|p| {
                p.routes
                    .iter()
                    .cloned()
                    .filter_map(RouteEntry::into_route)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            active_profile_name: DEFAULT_PROFILE.to_string(),
            log_buffer_size: default_log_buffer_size(),
            logging: None,
            profiles: vec![ProfileConfig {
                name: DEFAULT_PROFILE.to_string(),
                routes: Vec::new(),
            }],
        }
    }
}

/// Version 1 document: flat route list, no profiles.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LegacyConfigV1 {
    #[allow(dead_code)]
    pub version: u32,
    #[serde(default = "default_log_buffer_size")]
    pub log_buffer_size: usize,
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
}

impl LegacyConfigV1 {
    pub(crate) fn upgrade(self) -> AppConfig {
        AppConfig {
            version: CONFIG_VERSION,
            active_profile_name: DEFAULT_PROFILE.to_string(),
            log_buffer_size: self.log_buffer_size,
            logging: None,
            profiles: vec![ProfileConfig {
                name: DEFAULT_PROFILE.to_string(),
                routes: self.routes,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(source: &str, target: &str) -> RouteEntry {
        RouteEntry {
            id: None,
            source_endpoint_id: source.to_string(),
            target_endpoint_id: target.to_string(),
            enabled: true,
            channels: vec![],
            message_types: vec![],
        }
    }

    #[test]
    fn route_entry_round_trips() {
        let entry = RouteEntry {
            id: Some(RouteId::new()),
            source_endpoint_id: "hw:in1".to_string(),
            target_endpoint_id: "hw:out1".to_string(),
            enabled: false,
            channels: vec![2, 2, 16],
            message_types: vec![MessageType::NoteOn],
        };
        let route = entry.clone().into_route().unwrap();
        let back = RouteEntry::from_route(&route);

        assert_eq!(back.id, entry.id);
        assert_eq!(back.source_endpoint_id, entry.source_endpoint_id);
        assert_eq!(back.target_endpoint_id, entry.target_endpoint_id);
        assert!(!back.enabled);
        assert_eq!(back.channels, vec![2, 16]);
        assert_eq!(back.message_types, vec![MessageType::NoteOn]);
    }

    #[test]
    fn invalid_entries_are_skipped() {
        assert!(entry("", "hw:out").into_route().is_none());
        assert!(entry("hw:a", "  ").into_route().is_none());
        assert!(entry("hw:a", "HW:A").into_route().is_none());
    }

    #[test]
    fn out_of_range_channels_are_dropped() {
        let mut e = entry("hw:a", "hw:b");
        e.channels = vec![0, 1, 16, 17, 200];
        let route = e.into_route().unwrap();
        assert_eq!(route.filter.channels().collect::<Vec<_>>(), vec![1, 16]);
    }

    #[test]
    fn missing_id_gets_a_fresh_one() {
        let a = entry("hw:a", "hw:b").into_route().unwrap();
        let b = entry("hw:a", "hw:b").into_route().unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn active_profile_falls_back_to_default() {
        let mut config = AppConfig::default();
        config.active_profile_name = "   ".to_string();
        assert_eq!(config.active_profile_name(), DEFAULT_PROFILE);

        config.profiles[0].routes.push(entry("hw:a", "hw:b"));
        assert_eq!(config.active_routes().len(), 1);

        config.active_profile_name = "Missing".to_string();
        assert!(config.active_routes().is_empty());
    }

    #[test]
    fn wire_format_is_camel_case() {
        let json = serde_json::to_string(&AppConfig::default()).unwrap();
        assert!(json.contains("\"activeProfileName\""));
        assert!(json.contains("\"logBufferSize\""));

        let parsed: AppConfig = serde_json::from_str(
            r#"{
                "version": 2,
                "activeProfileName": "Live",
                "profiles": [{
                    "name": "Live",
                    "routes": [{
                        "sourceEndpointId": "hw:in1",
                        "targetEndpointId": "hw:out1",
                        "channels": [2],
                        "messageTypes": ["NoteOn", "NoteOff"]
                    }]
                }]
            }"#,
        )
        .unwrap();
        assert_eq!(parsed.active_routes().len(), 1);
    }
}
