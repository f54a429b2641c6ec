//! Validation error model
use rollgate_query::SyntaxError;
use thiserror::Error;

/// A rejected rollout configuration: the offending field path and the
/// invariant it violates.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{field}: {kind}")]
pub struct ValidationError {
    pub field: String,
    pub kind: ValidationErrorKind,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, kind: ValidationErrorKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationErrorKind {
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    #[error("at least one variation is required")]
    NoVariations,

    #[error("exactly one of variation, percentage or progressiveRollout is required")]
    MissingMode,

    #[error("only one of variation, percentage or progressiveRollout may be set (found {})", .0.join(", "))]
    ConflictingModes(Vec<&'static str>),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("invalid date '{0}', expected RFC 3339")]
    InvalidDate(String),

    #[error("variation '{0}' not found in variations")]
    UnknownVariation(String),

    #[error("targeting rule name is required")]
    MissingRuleName,

    #[error("duplicate targeting rule name '{0}'")]
    DuplicateRuleName(String),

    #[error("invalid query: {0}")]
    InvalidQuery(SyntaxError),

    #[error("percentage for '{variation}' cannot be negative (got {value})")]
    NegativePercentage { variation: String, value: f64 },

    #[error("percentage must be between 0 and 100 (got {0})")]
    PercentageOutOfRange(f64),

    #[error("end date must be after start date")]
    EndNotAfterStart,

    #[error("step date must be after the previous step date")]
    StepNotAfterPrevious,

    #[error("invalid {what} '{value}'")]
    InvalidName { what: &'static str, value: String },
}
