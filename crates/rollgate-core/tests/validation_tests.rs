//! Integration tests for rollout config validation.
//!
//! Documents are written the way they are stored and proposed (JSON), then
//! pushed through `validate_document`.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use rollgate_core::{
    validate, validate_document, Resolution, RolloutConfig, TargetingRule, ValidationErrorKind,
    VariationValue, Variations,
};
use serde_json::json;

// =============================================================================
// Documented scenarios
// =============================================================================

#[test]
fn test_boolean_flag_validates() {
    let doc = json!({
        "variations": {"enabled": true, "disabled": false},
        "defaultRule": {"variation": "enabled"}
    });
    let config = validate_document(&doc).unwrap();
    assert_eq!(config.default_rule, Resolution::variation("enabled"));
    assert_eq!(config.variations["disabled"], VariationValue::Bool(false));
}

#[test]
fn test_missing_reference_is_named() {
    let doc = json!({
        "variations": {"enabled": true, "disabled": false},
        "defaultRule": {"variation": "missing"}
    });
    let err = validate_document(&doc).unwrap_err();
    assert_eq!(err.kind, ValidationErrorKind::UnknownVariation("missing".to_string()));
    assert_eq!(
        err.to_string(),
        "defaultRule.variation: variation 'missing' not found in variations"
    );
}

#[test]
fn test_progressive_rollout_ending_before_start() {
    let doc = json!({
        "variations": {"enabled": true, "disabled": false},
        "defaultRule": {"progressiveRollout": {
            "initial": {"variation": "disabled", "percentage": 0, "date": "2024-02-01T00:00:00Z"},
            "end": {"variation": "enabled", "percentage": 100, "date": "2024-01-01T00:00:00Z"}
        }}
    });
    let err = validate_document(&doc).unwrap_err();
    assert_eq!(err.field, "defaultRule.progressiveRollout.end.date");
    assert_eq!(err.kind, ValidationErrorKind::EndNotAfterStart);
}

// =============================================================================
// Check ordering
// =============================================================================

#[test]
fn test_empty_variations_reported_first() {
    let doc = json!({
        "variations": {},
        "defaultRule": {"variation": "a", "percentage": {"a": 1}}
    });
    let err = validate_document(&doc).unwrap_err();
    assert_eq!(err.field, "variations");
}

#[test]
fn test_mode_exclusivity_before_references() {
    let doc = json!({
        "variations": {"enabled": true},
        "targeting": [
            {"name": "a", "query": "beta eq true", "variation": "ghost"},
            {"name": "b", "query": "beta eq true", "variation": "enabled", "percentage": {"enabled": 1}}
        ],
        "defaultRule": {"variation": "enabled"}
    });
    let err = validate_document(&doc).unwrap_err();
    assert_eq!(err.field, "targeting[1]");
    assert!(matches!(err.kind, ValidationErrorKind::ConflictingModes(_)));
}

#[test]
fn test_query_examples_accepted() {
    let queries = [
        r#"email ew "@company.com""#,
        r#"country in ["US", "CA", "MX"]"#,
        r#"(role eq "admin" or role eq "manager") and country in ["US", "CA"] and accountAge gt 30"#,
        r#"role eq "admin" or beta eq true"#,
    ];
    let targeting: Vec<_> = queries
        .iter()
        .enumerate()
        .map(|(i, q)| json!({"name": format!("rule-{}", i), "query": q, "variation": "enabled"}))
        .collect();
    let doc = json!({
        "variations": {"enabled": true, "disabled": false},
        "targeting": targeting,
        "defaultRule": {"variation": "disabled"}
    });
    assert!(validate_document(&doc).is_ok());
}

#[test]
fn test_stored_document_round_trips_through_validation() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let config = RolloutConfig::boolean(false)
        .with_rule(TargetingRule::new(
            "ramp",
            r#"plan eq "pro""#,
            Resolution::ProgressiveRollout(rollgate_core::ProgressiveRollout {
                initial: rollgate_core::RolloutEndpoint::new("disabled", Some(0.0), start),
                end: rollgate_core::RolloutEndpoint::new(
                    "enabled",
                    Some(100.0),
                    start + Duration::days(14),
                ),
            }),
        ))
        .with_bucketing_key("teamId");
    let doc = config.to_document().unwrap();
    assert_eq!(validate_document(&doc).unwrap(), config);
}

#[test]
fn test_numeric_variations_stored_verbatim() {
    let variations = json!({
        "limit": 5,
        "big": 9007199254740993u64,
        "negative": -3,
        "ratio": 0.25
    });
    let doc = json!({
        "variations": variations,
        "defaultRule": {"variation": "limit"}
    });
    let config = validate_document(&doc).unwrap();
    let stored = config.to_document().unwrap();
    assert_eq!(stored["variations"], variations);
    assert_eq!(stored["variations"]["big"].as_u64(), Some(9007199254740993));
    assert!(stored["variations"]["limit"].is_i64());
}

#[test]
fn test_date_syntax_reported_before_references() {
    let doc = json!({
        "variations": {"enabled": true},
        "defaultRule": {"variation": "ghost"},
        "experimentation": {"start": "next week"}
    });
    let err = validate_document(&doc).unwrap_err();
    assert_eq!(err.field, "experimentation.start");
    assert!(matches!(err.kind, ValidationErrorKind::InvalidDate(_)));
}

// =============================================================================
// Properties
// =============================================================================

fn variation_set() -> impl Strategy<Value = Variations> {
    prop::collection::btree_map("[a-z]{1,6}", any::<bool>(), 1..5)
        .prop_map(|m| m.into_iter().map(|(k, v)| (k, VariationValue::Bool(v))).collect())
}

fn config_with_refs() -> impl Strategy<Value = (RolloutConfig, Vec<String>)> {
    (variation_set(), prop::collection::vec("[a-z]{1,6}", 1..4)).prop_map(|(variations, picks)| {
        let default = picks[0].clone();
        let mut config = RolloutConfig::new(variations, Resolution::variation(default));
        for (i, pick) in picks.iter().enumerate().skip(1) {
            config = config.with_rule(TargetingRule::new(
                format!("rule-{}", i),
                "beta eq true",
                Resolution::variation(pick.clone()),
            ));
        }
        (config, picks)
    })
}

proptest! {
    #[test]
    fn prop_accepted_iff_every_reference_resolves((config, picks) in config_with_refs()) {
        let all_resolve = picks.iter().all(|p| config.variations.contains_key(p));
        let result = validate(&config);
        prop_assert_eq!(result.is_ok(), all_resolve);
        if let Err(err) = result {
            match err.kind {
                ValidationErrorKind::UnknownVariation(name) => {
                    prop_assert!(!config.variations.contains_key(&name));
                }
                other => prop_assert!(false, "unexpected error: {}", other),
            }
        }
    }

    #[test]
    fn prop_validate_is_idempotent((config, _) in config_with_refs()) {
        let before = config.clone();
        let first = validate(&config);
        let second = validate(&config);
        prop_assert_eq!(first, second);
        prop_assert_eq!(config, before);
    }

    #[test]
    fn prop_split_weights_any_total(weights in prop::collection::vec(0.0f64..1000.0, 2)) {
        let config = RolloutConfig {
            default_rule: Resolution::split([("enabled", weights[0]), ("disabled", weights[1])]),
            ..RolloutConfig::boolean(true)
        };
        prop_assert!(validate(&config).is_ok());
    }
}
