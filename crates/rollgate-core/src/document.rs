//! Raw configuration documents.
//!
//! Stored and proposed configs arrive as loosely shaped JSON in which every
//! selection mode is an optional field. Lifting such a document into a
//! [`RolloutConfig`] is where mode exclusivity and date syntax are enforced.
use crate::error::{ValidationError, ValidationErrorKind};
use crate::model::{
    Experimentation, PercentageSplit, ProgressiveRollout, Resolution, RolloutConfig,
    RolloutEndpoint, ScheduledStep, TargetingRule, Variations,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConfigDocument {
    #[serde(default)]
    pub variations: Variations,
    #[serde(default)]
    targeting: Vec<RuleDocument>,
    default_rule: Option<ResolutionDocument>,
    #[serde(default)]
    scheduled_rollout: Vec<StepDocument>,
    experimentation: Option<ExperimentationDocument>,
    disable: Option<bool>,
    track_events: Option<bool>,
    version: Option<String>,
    bucketing_key: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolutionDocument {
    variation: Option<String>,
    percentage: Option<PercentageSplit>,
    progressive_rollout: Option<ProgressiveDocument>,
}

#[derive(Debug, Deserialize)]
struct RuleDocument {
    #[serde(default)]
    name: String,
    #[serde(default)]
    query: String,
    #[serde(flatten)]
    resolution: ResolutionDocument,
    disable: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ProgressiveDocument {
    initial: Option<EndpointDocument>,
    end: Option<EndpointDocument>,
}

#[derive(Debug, Deserialize)]
struct EndpointDocument {
    #[serde(default)]
    variation: String,
    percentage: Option<f64>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepDocument {
    date: Option<String>,
    targeting: Option<Vec<RuleDocument>>,
    default_rule: Option<ResolutionDocument>,
}

#[derive(Debug, Deserialize)]
struct ExperimentationDocument {
    start: Option<String>,
    end: Option<String>,
}

impl ConfigDocument {
    pub(crate) fn parse(doc: &Value) -> Result<Self, ValidationError> {
        Self::deserialize(doc).map_err(|e| {
            ValidationError::new("$", ValidationErrorKind::MalformedDocument(e.to_string()))
        })
    }

    /// Build the typed config. Assumes the variation set was already checked.
    pub(crate) fn lift(self) -> Result<RolloutConfig, ValidationError> {
        let default_rule = lift_resolution(
            self.default_rule.unwrap_or_default(),
            "defaultRule",
        )?;
        let targeting = lift_rules(self.targeting, "targeting")?;

        let scheduled_rollout = self
            .scheduled_rollout
            .into_iter()
            .enumerate()
            .map(|(i, step)| lift_step(step, &format!("scheduledRollout[{}]", i)))
            .collect::<Result<Vec<_>, _>>()?;

        let experimentation = self
            .experimentation
            .map(|exp| -> Result<Experimentation, ValidationError> {
                Ok(Experimentation {
                    start: parse_optional_date(exp.start, "experimentation.start")?,
                    end: parse_optional_date(exp.end, "experimentation.end")?,
                })
            })
            .transpose()?;

        Ok(RolloutConfig {
            variations: self.variations,
            targeting,
            default_rule,
            scheduled_rollout,
            experimentation,
            disable: self.disable.unwrap_or(false),
            track_events: self.track_events.unwrap_or(true),
            version: self.version.filter(|v| !v.is_empty()),
            bucketing_key: self.bucketing_key.filter(|v| !v.is_empty()),
            metadata: self.metadata,
        })
    }
}

fn lift_rules(rules: Vec<RuleDocument>, prefix: &str) -> Result<Vec<TargetingRule>, ValidationError> {
    rules
        .into_iter()
        .enumerate()
        .map(|(i, rule)| {
            let path = format!("{}[{}]", prefix, i);
            Ok(TargetingRule {
                resolution: lift_resolution(rule.resolution, &path)?,
                name: rule.name,
                query: rule.query,
                disable: rule.disable.unwrap_or(false),
            })
        })
        .collect()
}

fn lift_step(step: StepDocument, path: &str) -> Result<ScheduledStep, ValidationError> {
    let date = match step.date.filter(|d| !d.is_empty()) {
        Some(raw) => parse_date(&raw, &format!("{}.date", path))?,
        None => {
            return Err(ValidationError::new(
                format!("{}.date", path),
                ValidationErrorKind::MissingField("date"),
            ))
        }
    };
    let targeting = step
        .targeting
        .map(|rules| lift_rules(rules, &format!("{}.targeting", path)))
        .transpose()?;
    let default_rule = lift_resolution(
        step.default_rule.unwrap_or_default(),
        &format!("{}.defaultRule", path),
    )?;

    Ok(ScheduledStep {
        date,
        targeting,
        default_rule,
    })
}

fn lift_resolution(doc: ResolutionDocument, path: &str) -> Result<Resolution, ValidationError> {
    // An empty variation name or split counts as unset.
    let variation = doc.variation.filter(|v| !v.is_empty());
    let percentage = doc.percentage.filter(|p| !p.is_empty());

    let mut found = Vec::new();
    if variation.is_some() {
        found.push("variation");
    }
    if percentage.is_some() {
        found.push("percentage");
    }
    if doc.progressive_rollout.is_some() {
        found.push("progressiveRollout");
    }
    if found.len() > 1 {
        return Err(ValidationError::new(path, ValidationErrorKind::ConflictingModes(found)));
    }

    if let Some(name) = variation {
        return Ok(Resolution::Variation(name));
    }
    if let Some(split) = percentage {
        return Ok(Resolution::Percentage(split));
    }
    match doc.progressive_rollout {
        Some(rollout) => {
            let path = format!("{}.progressiveRollout", path);
            Ok(Resolution::ProgressiveRollout(ProgressiveRollout {
                initial: lift_endpoint(rollout.initial, &path, "initial")?,
                end: lift_endpoint(rollout.end, &path, "end")?,
            }))
        }
        None => Err(ValidationError::new(path, ValidationErrorKind::MissingMode)),
    }
}

fn lift_endpoint(
    endpoint: Option<EndpointDocument>,
    path: &str,
    which: &'static str,
) -> Result<RolloutEndpoint, ValidationError> {
    let path = format!("{}.{}", path, which);
    let endpoint = endpoint
        .ok_or_else(|| ValidationError::new(&path, ValidationErrorKind::MissingField(which)))?;
    let date = match endpoint.date.filter(|d| !d.is_empty()) {
        Some(raw) => parse_date(&raw, &format!("{}.date", path))?,
        None => {
            return Err(ValidationError::new(
                format!("{}.date", path),
                ValidationErrorKind::MissingField("date"),
            ))
        }
    };
    Ok(RolloutEndpoint {
        variation: endpoint.variation,
        percentage: endpoint.percentage,
        date,
    })
}

fn parse_optional_date(raw: Option<String>, field: &str) -> Result<Option<DateTime<Utc>>, ValidationError> {
    raw.filter(|d| !d.is_empty())
        .map(|d| parse_date(&d, field))
        .transpose()
}

fn parse_date(raw: &str, field: &str) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| ValidationError::new(field, ValidationErrorKind::InvalidDate(raw.to_string())))
}
