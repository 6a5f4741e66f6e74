//! Binder configuration
//!
//! Loaded from a TOML file (all fields optional):
//!
//! ```toml
//! event_prefix = "on"
//! events = ["swipe"]            # added to the built-in event names
//! digest_interval_ms = 100
//! strict_models = true
//! restore_root_attributes = true
//! event_log_capacity = 1024
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BindError, Result};

/// Event names recognized after the prefix (`onclick` -> `click`)
pub const DEFAULT_EVENTS: &[&str] = &[
    "click",
    "dblclick",
    "change",
    "input",
    "submit",
    "reset",
    "focus",
    "blur",
    "keydown",
    "keyup",
    "keypress",
    "mousedown",
    "mouseup",
    "mouseover",
    "mouseout",
    "mousemove",
    "mouseenter",
    "mouseleave",
    "load",
    "scroll",
    "select",
    "contextmenu",
    "wheel",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BindConfig {
    /// Prefix marking event targets (`button@onclick`)
    pub event_prefix: String,

    /// Extra event names on top of `DEFAULT_EVENTS`
    pub events: Vec<String>,

    /// Period of `run_digest_loop_default`
    pub digest_interval_ms: u64,

    /// Reject rebinding a root to another model without a mapper
    pub strict_models: bool,

    /// Restore the root's own attributes and properties on reset, not only its children
    pub restore_root_attributes: bool,

    /// Events kept by the binder's log (0 disables it)
    pub event_log_capacity: usize,
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            event_prefix: "on".to_string(),
            events: Vec::new(),
            digest_interval_ms: 100,
            strict_models: true,
            restore_root_attributes: true,
            event_log_capacity: 1024,
        }
    }
}

impl BindConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| BindError::Config {
            reason: format!("Failed to parse config: {}", e),
        })
    }

    /// Event named by a target, if it is one (`onclick` -> `Some("click")`)
    ///
    /// Matching is ASCII case-insensitive; the returned name is lowercase.
    pub fn event_name(&self, target: &str) -> Option<String> {
        let prefix_len = self.event_prefix.len();
        if prefix_len == 0
            || target.len() <= prefix_len
            || !target.is_char_boundary(prefix_len)
            || !target[..prefix_len].eq_ignore_ascii_case(&self.event_prefix)
        {
            return None;
        }
        let event = target[prefix_len..].to_ascii_lowercase();
        let known = DEFAULT_EVENTS.contains(&event.as_str())
            || self.events.iter().any(|e| e.eq_ignore_ascii_case(&event));
        known.then_some(event)
    }
}
