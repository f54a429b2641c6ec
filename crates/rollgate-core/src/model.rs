//! Data model: RolloutConfig and the rules it is built from.
//!
//! The serde representation is the wire/storage document (camelCase keys).
//! Selection modes are a tagged [`Resolution`], so a typed config can never
//! carry two modes at once; raw documents go through
//! [`crate::validate_document`] instead.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;

/// Variation name → value.
pub type Variations = BTreeMap<String, VariationValue>;

/// Variation name → weight. Totals other than 100 are accepted.
pub type PercentageSplit = BTreeMap<String, f64>;

/// The value a flag resolves to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariationValue {
    Bool(bool),
    /// Kept as parsed, so integers stay integers.
    Number(Number),
    String(String),
    /// Objects, arrays and null.
    Document(Value),
}

impl From<bool> for VariationValue {
    fn from(v: bool) -> Self {
        VariationValue::Bool(v)
    }
}

/// Non-finite values have no JSON form and become `null`.
impl From<f64> for VariationValue {
    fn from(v: f64) -> Self {
        match Number::from_f64(v) {
            Some(n) => VariationValue::Number(n),
            None => VariationValue::Document(Value::Null),
        }
    }
}

impl From<i64> for VariationValue {
    fn from(v: i64) -> Self {
        VariationValue::Number(v.into())
    }
}

impl From<&str> for VariationValue {
    fn from(v: &str) -> Self {
        VariationValue::String(v.to_string())
    }
}

impl From<Value> for VariationValue {
    fn from(v: Value) -> Self {
        VariationValue::Document(v)
    }
}

/// How a rule picks a variation. Serialized as a single-key object:
/// `{"variation": ..}`, `{"percentage": ..}` or `{"progressiveRollout": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Resolution {
    Variation(String),
    Percentage(PercentageSplit),
    ProgressiveRollout(ProgressiveRollout),
}

impl Resolution {
    pub fn variation(name: impl Into<String>) -> Self {
        Resolution::Variation(name.into())
    }

    pub fn split<I, S>(weights: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Resolution::Percentage(weights.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Wire name of the selection mode.
    pub fn mode(&self) -> &'static str {
        match self {
            Resolution::Variation(_) => "variation",
            Resolution::Percentage(_) => "percentage",
            Resolution::ProgressiveRollout(_) => "progressiveRollout",
        }
    }

    /// Every variation name this resolution refers to, with the field path
    /// (relative to the resolution) where it appears.
    pub fn variation_refs(&self) -> Vec<(String, &str)> {
        match self {
            Resolution::Variation(name) => vec![("variation".to_string(), name.as_str())],
            Resolution::Percentage(split) => split
                .keys()
                .map(|name| (format!("percentage.{}", name), name.as_str()))
                .collect(),
            Resolution::ProgressiveRollout(rollout) => vec![
                (
                    "progressiveRollout.initial.variation".to_string(),
                    rollout.initial.variation.as_str(),
                ),
                (
                    "progressiveRollout.end.variation".to_string(),
                    rollout.end.variation.as_str(),
                ),
            ],
        }
    }
}

/// Date-bounded ramp between two endpoints. Interpolation between the
/// endpoints is done downstream; only the endpoints live here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressiveRollout {
    pub initial: RolloutEndpoint,
    pub end: RolloutEndpoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutEndpoint {
    pub variation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    pub date: DateTime<Utc>,
}

impl RolloutEndpoint {
    pub fn new(variation: impl Into<String>, percentage: Option<f64>, date: DateTime<Utc>) -> Self {
        Self {
            variation: variation.into(),
            percentage,
            date,
        }
    }
}

/// Named, ordered predicate plus the resolution it selects on match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetingRule {
    pub name: String,
    pub query: String,
    #[serde(flatten)]
    pub resolution: Resolution,
    #[serde(default, skip_serializing_if = "is_false")]
    pub disable: bool,
}

impl TargetingRule {
    pub fn new(name: impl Into<String>, query: impl Into<String>, resolution: Resolution) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            resolution,
            disable: false,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.disable = true;
        self
    }
}

/// A full replacement of targeting and default rule, effective at `date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledStep {
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targeting: Option<Vec<TargetingRule>>,
    pub default_rule: Resolution,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Experimentation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

/// The unit bound to `{project, flagKey}`; always replaced wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutConfig {
    pub variations: Variations,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targeting: Vec<TargetingRule>,
    pub default_rule: Resolution,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scheduled_rollout: Vec<ScheduledStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimentation: Option<Experimentation>,
    #[serde(default)]
    pub disable: bool,
    #[serde(default = "default_true")]
    pub track_events: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucketing_key: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

fn default_true() -> bool {
    true
}

fn is_false(v: &bool) -> bool {
    !*v
}

impl RolloutConfig {
    pub fn new(variations: Variations, default_rule: Resolution) -> Self {
        Self {
            variations,
            targeting: Vec::new(),
            default_rule,
            scheduled_rollout: Vec::new(),
            experimentation: None,
            disable: false,
            track_events: true,
            version: None,
            bucketing_key: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Two-variation boolean flag serving `default`.
    pub fn boolean(default: bool) -> Self {
        let mut variations = Variations::new();
        variations.insert("enabled".to_string(), VariationValue::Bool(true));
        variations.insert("disabled".to_string(), VariationValue::Bool(false));
        let default_rule = Resolution::variation(if default { "enabled" } else { "disabled" });
        Self::new(variations, default_rule)
    }

    pub fn with_variation(mut self, name: impl Into<String>, value: impl Into<VariationValue>) -> Self {
        self.variations.insert(name.into(), value.into());
        self
    }

    pub fn with_rule(mut self, rule: TargetingRule) -> Self {
        self.targeting.push(rule);
        self
    }

    pub fn with_step(mut self, step: ScheduledStep) -> Self {
        self.scheduled_rollout.push(step);
        self
    }

    pub fn with_experimentation(mut self, experimentation: Experimentation) -> Self {
        self.experimentation = Some(experimentation);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_bucketing_key(mut self, key: impl Into<String>) -> Self {
        self.bucketing_key = Some(key.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disable = true;
        self
    }

    /// The storage document for this config.
    pub fn to_document(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolution_wire_shape() {
        let rule = Resolution::variation("enabled");
        assert_eq!(serde_json::to_value(&rule).unwrap(), json!({"variation": "enabled"}));

        let split = Resolution::split([("enabled", 10.0), ("disabled", 90.0)]);
        assert_eq!(
            serde_json::to_value(&split).unwrap(),
            json!({"percentage": {"disabled": 90.0, "enabled": 10.0}})
        );
    }

    #[test]
    fn test_targeting_rule_flattens_resolution() {
        let rule = TargetingRule::new("admins", r#"role eq "admin""#, Resolution::variation("enabled"));
        let doc = serde_json::to_value(&rule).unwrap();
        assert_eq!(
            doc,
            json!({"name": "admins", "query": "role eq \"admin\"", "variation": "enabled"})
        );

        let back: TargetingRule = serde_json::from_value(doc).unwrap();
        assert_eq!(back, rule);
    }

    #[test]
    fn test_variation_values() {
        let doc = json!({
            "variations": {
                "on": true,
                "ratio": 0.25,
                "label": "modern",
                "layout": {"color": "green", "size": "large"}
            },
            "defaultRule": {"variation": "on"}
        });
        let config: RolloutConfig = serde_json::from_value(doc).unwrap();
        assert_eq!(config.variations["on"], VariationValue::Bool(true));
        assert_eq!(config.variations["ratio"], VariationValue::from(0.25));
        assert_eq!(config.variations["label"], VariationValue::String("modern".to_string()));
        assert!(matches!(config.variations["layout"], VariationValue::Document(_)));
        assert!(config.track_events);
        assert!(!config.disable);
    }

    #[test]
    fn test_number_conversions() {
        assert_eq!(serde_json::to_value(VariationValue::from(5i64)).unwrap(), json!(5));
        assert_eq!(serde_json::to_value(VariationValue::from(0.5)).unwrap(), json!(0.5));
        assert_eq!(VariationValue::from(f64::NAN), VariationValue::Document(Value::Null));
    }

    #[test]
    fn test_progressive_refs() {
        let now = Utc::now();
        let rollout = Resolution::ProgressiveRollout(ProgressiveRollout {
            initial: RolloutEndpoint::new("disabled", Some(0.0), now),
            end: RolloutEndpoint::new("enabled", Some(100.0), now + chrono::Duration::days(7)),
        });
        let refs = rollout.variation_refs();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].1, "disabled");
        assert_eq!(refs[1].0, "progressiveRollout.end.variation");
    }

    #[test]
    fn test_builder() {
        let config = RolloutConfig::boolean(false)
            .with_bucketing_key("companyId")
            .with_version("2");
        assert_eq!(config.default_rule, Resolution::variation("disabled"));
        let doc = config.to_document().unwrap();
        assert_eq!(doc["bucketingKey"], json!("companyId"));
        assert!(doc.get("targeting").is_none());
    }
}
