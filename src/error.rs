//! Error types with fix suggestions
//!
//! Error code ranges:
//! - BIND-010-019: Key and selector errors
//! - BIND-020-029: Usage errors (registry misuse)
//! - BIND-030-039: Tree consistency errors
//! - BIND-040-049: Model and mapper errors
//! - BIND-050-059: Config and IO errors

use thiserror::Error;

use crate::dom::NodeId;

pub type Result<T> = std::result::Result<T, BindError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

#[derive(Error, Debug)]
pub enum BindError {
    // ─────────────────────────────────────────────────────────────
    // Key and selector errors (BIND-010 to BIND-019)
    // ─────────────────────────────────────────────────────────────
    #[error("[BIND-010] Invalid selector '{selector}' at position {position}: {details}")]
    InvalidSelector {
        selector: String,
        position: usize,
        details: String,
    },

    #[error("[BIND-011] Invalid mapping key '{key}': {details}")]
    InvalidKey { key: String, details: String },

    // ─────────────────────────────────────────────────────────────
    // Usage errors (BIND-020 to BIND-029)
    // ─────────────────────────────────────────────────────────────
    #[error("[BIND-020] Root {root} is already bound to a different model and no mapper was given")]
    ModelConflict { root: NodeId },

    #[error("[BIND-021] Reentrant bind on root {root} overlaps root {active} which is still being bound")]
    ReentrantBind { root: NodeId, active: NodeId },

    // ─────────────────────────────────────────────────────────────
    // Tree consistency errors (BIND-030 to BIND-039)
    // ─────────────────────────────────────────────────────────────
    #[error("[BIND-030] Cannot {operation}: node {node} has no parent")]
    Detached {
        operation: &'static str,
        node: NodeId,
    },

    #[error("[BIND-031] Node {node} is not a child of {parent}")]
    NotAChild { node: NodeId, parent: NodeId },

    #[error("[BIND-032] Inserting {node} under {parent} would make a node its own ancestor")]
    HierarchyCycle { node: NodeId, parent: NodeId },

    // ─────────────────────────────────────────────────────────────
    // Model and mapper errors (BIND-040 to BIND-049)
    // ─────────────────────────────────────────────────────────────
    #[error("[BIND-040] Failed to serialize model: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("[BIND-041] Mapper failed: {reason}")]
    Mapper { reason: String },

    // ─────────────────────────────────────────────────────────────
    // Config and IO errors (BIND-050 to BIND-059)
    // ─────────────────────────────────────────────────────────────
    #[error("[BIND-050] Config error: {reason}")]
    Config { reason: String },

    #[error("[BIND-051] IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BindError {
    /// Shorthand for mapper-reported failures
    pub fn mapper(reason: impl Into<String>) -> Self {
        Self::Mapper {
            reason: reason.into(),
        }
    }

    /// Error code (e.g. "BIND-020") for programmatic matching
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSelector { .. } => "BIND-010",
            Self::InvalidKey { .. } => "BIND-011",
            Self::ModelConflict { .. } => "BIND-020",
            Self::ReentrantBind { .. } => "BIND-021",
            Self::Detached { .. } => "BIND-030",
            Self::NotAChild { .. } => "BIND-031",
            Self::HierarchyCycle { .. } => "BIND-032",
            Self::Serialize(_) => "BIND-040",
            Self::Mapper { .. } => "BIND-041",
            Self::Config { .. } => "BIND-050",
            Self::Io(_) => "BIND-051",
        }
    }
}

impl FixSuggestion for BindError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            BindError::InvalidSelector { .. } => Some(
                "Use type, #id, .class and [attr] selectors joined by spaces, '>', '+', '~' or ','",
            ),
            BindError::InvalidKey { .. } => {
                Some("Keys are 'selector', 'selector@attribute' or 'selector:property'")
            }
            BindError::ModelConflict { .. } => Some(
                "Pass a mapper when rebinding to a new model, or evict the root first",
            ),
            BindError::ReentrantBind { .. } => Some(
                "Do not call bind on the same subtree from a callable value; defer it until the bind returns",
            ),
            BindError::Detached { .. } => {
                Some("Iterated and hidden nodes must be attached to a parent in the template")
            }
            BindError::NotAChild { .. } => Some("Pass the node's actual parent"),
            BindError::HierarchyCycle { .. } => {
                Some("Clone the node with deep_clone before inserting it below itself")
            }
            BindError::Serialize(_) => {
                Some("Check the model's Serialize impl (map keys must be strings)")
            }
            BindError::Mapper { .. } => Some("Check the mapper's assumptions about the model"),
            BindError::Config { .. } => Some("Check TOML syntax and field names in the config file"),
            BindError::Io(_) => Some("Check file path and permissions"),
        }
    }
}
