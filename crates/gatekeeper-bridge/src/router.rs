//! # Topic Router
//!
//! Dispatch table from topic to handler, built once at startup.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  "rfid-identifier"    ──► Route::Rfid         ──► AuthenticationCtrl   │
//! │  "pin-entry"          ──► Route::Pin          ──► AuthenticationCtrl   │
//! │  "sync-control-flag"  ──► Route::SyncControl  ──► SyncController       │
//! │  "sync-data"          ──► Route::SyncData     ──► SyncController       │
//! │  anything else        ──► UnroutedTopic (logged, dropped)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Construction fails unless every route has exactly one topic and no
//! topic is claimed twice.

use std::collections::HashMap;

use crate::config::TopicSettings;
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::Route;

/// Topic dispatch table.
#[derive(Debug, Clone)]
pub struct Router {
    routes: HashMap<String, Route>,
}

impl Router {
    /// Builds a router from explicit `(topic, route)` pairs.
    pub fn new(entries: impl IntoIterator<Item = (String, Route)>) -> BridgeResult<Self> {
        let mut routes: HashMap<String, Route> = HashMap::new();

        for (topic, route) in entries {
            if let Some(existing) = routes.get(&topic) {
                return Err(BridgeError::DuplicateRoute(format!(
                    "topic '{}' claimed by {} and {}",
                    topic, existing, route
                )));
            }
            if routes.values().any(|r| *r == route) {
                return Err(BridgeError::DuplicateRoute(format!(
                    "{} has more than one topic",
                    route
                )));
            }
            routes.insert(topic, route);
        }

        if let Some(missing) = Route::ALL.iter().find(|r| !routes.values().any(|v| v == *r)) {
            return Err(BridgeError::InvalidConfig(format!(
                "no topic configured for {}",
                missing
            )));
        }

        Ok(Router { routes })
    }

    /// Builds the router from the `[topics]` config section.
    pub fn from_topics(topics: &TopicSettings) -> BridgeResult<Self> {
        Self::new([
            (topics.rfid.clone(), Route::Rfid),
            (topics.pin.clone(), Route::Pin),
            (topics.sync_control.clone(), Route::SyncControl),
            (topics.sync_data.clone(), Route::SyncData),
        ])
    }

    /// Resolves a topic.
    pub fn route(&self, topic: &str) -> BridgeResult<Route> {
        self.routes
            .get(topic)
            .copied()
            .ok_or_else(|| BridgeError::UnroutedTopic(topic.to_string()))
    }

    /// Topics to subscribe to, sorted.
    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.routes.keys().cloned().collect();
        topics.sort();
        topics
    }
}
