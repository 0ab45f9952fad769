//! Error types with fix suggestions

use thiserror::Error;

use crate::service::ServiceError;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

#[derive(Error, Debug)]
pub enum WeftError {
    #[error("Markup parse error: {0}")]
    Markup(String),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    // ─────────────────────────────────────────────────────────────
    // Schema errors (WEFT-010 to WEFT-012)
    // ─────────────────────────────────────────────────────────────
    #[error("WEFT-010: Unknown model '{name}'")]
    UnknownModel { name: String },

    #[error("WEFT-011: Model '{model}' has no property '{property}'")]
    UnknownProperty { model: String, property: String },

    // ─────────────────────────────────────────────────────────────
    // Expression errors (WEFT-020 to WEFT-021)
    // ─────────────────────────────────────────────────────────────
    #[error("WEFT-020: Expression parse error at position {position}: {details}")]
    ExpressionParse { position: usize, details: String },

    #[error("WEFT-021: Expected a key/value literal, got {got}")]
    ExpressionNotAMap { got: String },

    // ─────────────────────────────────────────────────────────────
    // Resolution errors (WEFT-030)
    // ─────────────────────────────────────────────────────────────
    #[error("WEFT-030: Resolution did not converge after {passes} passes")]
    NonTermination { passes: usize },
}

impl From<quick_xml::Error> for WeftError {
    fn from(e: quick_xml::Error) -> Self {
        WeftError::Markup(e.to_string())
    }
}

impl FixSuggestion for WeftError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            WeftError::Markup(_) => Some("Check that the fragment is well-formed markup"),
            WeftError::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
            WeftError::Service(_) => Some("Check the data service backend is reachable"),
            WeftError::UnknownModel { .. } => Some("Register the model in the ModelRegistry"),
            WeftError::UnknownProperty { .. } => {
                Some("Check the attribute directive against the model's property map")
            }
            WeftError::ExpressionParse { .. } | WeftError::ExpressionNotAMap { .. } => {
                Some("Embedded data must be a {key: value, ...} literal")
            }
            WeftError::NonTermination { .. } => {
                Some("A directive handler is reinserting its own marker; check custom triggers")
            }
        }
    }
}
