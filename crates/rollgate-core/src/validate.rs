//! Ordered validation of rollout configs.
//!
//! Checks run in a fixed order and the first failure is returned:
//!
//! 1. at least one variation
//! 2. one selection mode per rule (structural, see [`validate_document`])
//! 3. every variation reference resolves
//! 4. targeting rule names are unique and non-empty, queries parse
//! 5. percentage weights are non-negative (totals are not forced to 100)
//! 6. progressive rollouts end strictly after they start, endpoint
//!    percentages lie in `[0, 100]`
//! 7. scheduled steps have strictly increasing dates and valid rules
//! 8. experimentation windows end after they start
//!
//! [`validate_document`] adds a structural pass between checks 1 and 3:
//! mode exclusivity and RFC 3339 date syntax are checked while the document
//! is lifted into the typed model. An unparseable date is therefore reported
//! ahead of an unknown variation reference.
use crate::document::ConfigDocument;
use crate::error::{ValidationError, ValidationErrorKind};
use crate::model::{Resolution, RolloutConfig, TargetingRule};
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

/// Targeting list plus default rule, as found at the top level or inside a
/// scheduled step.
struct RuleSet<'a> {
    prefix: String,
    targeting: &'a [TargetingRule],
    default_rule: &'a Resolution,
}

impl<'a> RuleSet<'a> {
    fn resolutions(&self) -> Vec<(String, &'a Resolution)> {
        let mut out = vec![(format!("{}defaultRule", self.prefix), self.default_rule)];
        for (i, rule) in self.targeting.iter().enumerate() {
            out.push((format!("{}targeting[{}]", self.prefix, i), &rule.resolution));
        }
        out
    }
}

fn rule_sets(config: &RolloutConfig) -> Vec<RuleSet<'_>> {
    let mut sets = vec![top_level(config)];
    sets.extend(config.scheduled_rollout.iter().enumerate().map(|(i, step)| RuleSet {
        prefix: format!("scheduledRollout[{}].", i),
        targeting: step.targeting.as_deref().unwrap_or(&[]),
        default_rule: &step.default_rule,
    }));
    sets
}

fn top_level(config: &RolloutConfig) -> RuleSet<'_> {
    RuleSet {
        prefix: String::new(),
        targeting: &config.targeting,
        default_rule: &config.default_rule,
    }
}

/// Validate a typed config. Pure: the same input always yields the same
/// result.
pub fn validate(config: &RolloutConfig) -> Result<(), ValidationError> {
    check_variations(config)?;

    for set in rule_sets(config) {
        check_references(config, &set)?;
    }

    let top = top_level(config);
    check_rule_names_and_queries(&top)?;
    check_percentages(&top)?;
    check_progressive(config, &top)?;

    check_schedule(config)?;
    check_experimentation(config)?;

    debug!(
        variations = config.variations.len(),
        rules = config.targeting.len(),
        steps = config.scheduled_rollout.len(),
        "rollout config accepted"
    );
    Ok(())
}

/// Validate a stored or proposed document and return its typed form.
///
/// Malformed JSON shapes, unparseable dates and rules that select more than
/// one mode are reported here, after the variation-set check and before the
/// checks of [`validate`].
pub fn validate_document(doc: &Value) -> Result<RolloutConfig, ValidationError> {
    let raw = ConfigDocument::parse(doc)?;
    if raw.variations.is_empty() {
        return Err(no_variations());
    }
    let config = raw.lift()?;
    validate(&config)?;
    Ok(config)
}

fn no_variations() -> ValidationError {
    ValidationError::new("variations", ValidationErrorKind::NoVariations)
}

fn check_variations(config: &RolloutConfig) -> Result<(), ValidationError> {
    if config.variations.is_empty() {
        return Err(no_variations());
    }
    Ok(())
}

fn check_references(config: &RolloutConfig, set: &RuleSet<'_>) -> Result<(), ValidationError> {
    for (path, resolution) in set.resolutions() {
        for (suffix, name) in resolution.variation_refs() {
            if !config.variations.contains_key(name) {
                return Err(ValidationError::new(
                    format!("{}.{}", path, suffix),
                    ValidationErrorKind::UnknownVariation(name.to_string()),
                ));
            }
        }
    }
    Ok(())
}

fn check_rule_names_and_queries(set: &RuleSet<'_>) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for (i, rule) in set.targeting.iter().enumerate() {
        let path = format!("{}targeting[{}]", set.prefix, i);
        let name = rule.name.trim();
        if name.is_empty() {
            return Err(ValidationError::new(
                format!("{}.name", path),
                ValidationErrorKind::MissingRuleName,
            ));
        }
        if !seen.insert(name) {
            return Err(ValidationError::new(
                format!("{}.name", path),
                ValidationErrorKind::DuplicateRuleName(name.to_string()),
            ));
        }
        match rollgate_query::parse_query(&rule.query) {
            Ok(expr) => {
                debug!(rule = name, attributes = ?expr.attributes(), "targeting query parsed");
            }
            Err(e) => {
                return Err(ValidationError::new(
                    format!("{}.query", path),
                    ValidationErrorKind::InvalidQuery(e),
                ))
            }
        }
    }
    Ok(())
}

fn check_percentages(set: &RuleSet<'_>) -> Result<(), ValidationError> {
    for (path, resolution) in set.resolutions() {
        if let Resolution::Percentage(split) = resolution {
            for (variation, weight) in split {
                if *weight < 0.0 || weight.is_nan() {
                    return Err(ValidationError::new(
                        format!("{}.percentage.{}", path, variation),
                        ValidationErrorKind::NegativePercentage {
                            variation: variation.clone(),
                            value: *weight,
                        },
                    ));
                }
            }
        }
    }
    Ok(())
}

fn check_progressive(config: &RolloutConfig, set: &RuleSet<'_>) -> Result<(), ValidationError> {
    for (path, resolution) in set.resolutions() {
        let rollout = match resolution {
            Resolution::ProgressiveRollout(rollout) => rollout,
            _ => continue,
        };
        let path = format!("{}.progressiveRollout", path);

        for (which, endpoint) in [("initial", &rollout.initial), ("end", &rollout.end)] {
            if !config.variations.contains_key(&endpoint.variation) {
                return Err(ValidationError::new(
                    format!("{}.{}.variation", path, which),
                    ValidationErrorKind::UnknownVariation(endpoint.variation.clone()),
                ));
            }
        }

        if rollout.end.date <= rollout.initial.date {
            return Err(ValidationError::new(
                format!("{}.end.date", path),
                ValidationErrorKind::EndNotAfterStart,
            ));
        }

        for (which, endpoint) in [("initial", &rollout.initial), ("end", &rollout.end)] {
            if let Some(pct) = endpoint.percentage {
                if !(0.0..=100.0).contains(&pct) {
                    return Err(ValidationError::new(
                        format!("{}.{}.percentage", path, which),
                        ValidationErrorKind::PercentageOutOfRange(pct),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn check_schedule(config: &RolloutConfig) -> Result<(), ValidationError> {
    for (i, pair) in config.scheduled_rollout.windows(2).enumerate() {
        if pair[1].date <= pair[0].date {
            return Err(ValidationError::new(
                format!("scheduledRollout[{}].date", i + 1),
                ValidationErrorKind::StepNotAfterPrevious,
            ));
        }
    }

    for set in rule_sets(config).iter().skip(1) {
        check_references(config, set)?;
        check_rule_names_and_queries(set)?;
        check_percentages(set)?;
        check_progressive(config, set)?;
    }
    Ok(())
}

fn check_experimentation(config: &RolloutConfig) -> Result<(), ValidationError> {
    if let Some(exp) = &config.experimentation {
        if let (Some(start), Some(end)) = (exp.start, exp.end) {
            if end <= start {
                return Err(ValidationError::new(
                    "experimentation.end",
                    ValidationErrorKind::EndNotAfterStart,
                ));
            }
        }
    }
    Ok(())
}
