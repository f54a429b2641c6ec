//! Rollgate Core: rollout config model and validator
//!
//! A [`RolloutConfig`] describes how one feature flag resolves: its
//! variations, ordered targeting rules, default rule, scheduled steps and
//! experimentation window. [`validate`] checks a typed config,
//! [`validate_document`] lifts and checks a raw JSON document.
//!
//! ```
//! use rollgate_core::{validate, Resolution, RolloutConfig, TargetingRule};
//!
//! let config = RolloutConfig::boolean(false).with_rule(TargetingRule::new(
//!     "internal",
//!     r#"email ew "@company.com""#,
//!     Resolution::variation("enabled"),
//! ));
//! assert!(validate(&config).is_ok());
//! ```

mod document;
pub mod error;
pub mod model;
pub mod naming;
pub mod validate;

pub use error::{ValidationError, ValidationErrorKind};
pub use model::{
    Experimentation, PercentageSplit, ProgressiveRollout, Resolution, RolloutConfig,
    RolloutEndpoint, ScheduledStep, TargetingRule, VariationValue, Variations,
};
pub use naming::{validate_flag_key, validate_project_name};
pub use rollgate_query::{check_syntax, SyntaxError};
pub use validate::{validate, validate_document};
