//! Flag key and project name rules.

use crate::error::{ValidationError, ValidationErrorKind};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Alphanumeric start, then up to 127 of `[a-zA-Z0-9._-]`
    static ref FLAG_KEY: Regex = Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._-]{0,127}$").unwrap();

    /// Same alphabet as flag keys, 64 chars max
    static ref PROJECT_NAME: Regex = Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._-]{0,63}$").unwrap();
}

pub fn validate_flag_key(key: &str) -> Result<(), ValidationError> {
    check(key, &FLAG_KEY, "flagKey", "flag key")
}

pub fn validate_project_name(name: &str) -> Result<(), ValidationError> {
    check(name, &PROJECT_NAME, "project", "project name")
}

fn check(
    value: &str,
    pattern: &Regex,
    field: &str,
    what: &'static str,
) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::new(field, ValidationErrorKind::MissingField(what)));
    }
    if !pattern.is_match(value) {
        return Err(ValidationError::new(
            field,
            ValidationErrorKind::InvalidName {
                what,
                value: value.to_string(),
            },
        ));
    }
    Ok(())
}
