//! `@N`/`@BN` reference parsing and parameter-override application (§4.4).
//!
//! Grounded on
//! `original_source/roar/services/execution/dag_resolver.py`'s
//! `DAGReferenceResolver.resolve`/`_apply_overrides`.

use std::collections::BTreeMap;

use regex::Regex;
use roar_error::{ErrorCode, RoarError};

/// A parsed `@N` or `@BN` reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepRef {
    pub number: u32,
    pub is_build: bool,
}

/// Parse `@N` (a run step) or `@BN` (a build step). Anything else is a
/// validation error.
pub fn parse_reference(reference: &str) -> Result<StepRef, RoarError> {
    let invalid = || {
        RoarError::new(
            ErrorCode::ValidationFailed,
            format!("invalid DAG reference '{reference}'. Use @N or @BN where N is a number."),
        )
    };

    let rest = reference.strip_prefix('@').ok_or_else(invalid)?;
    let (is_build, digits) = match rest.strip_prefix(['B', 'b']) {
        Some(d) => (true, d),
        None => (false, rest),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let number = digits.parse().map_err(|_| invalid())?;
    Ok(StepRef { number, is_build })
}

/// Apply `{key: value}` overrides to a command string: an existing
/// `--key=old` or `--key old` is replaced with `--key=value`; otherwise
/// `--key=value` is appended.
pub fn apply_overrides(command: &str, overrides: &BTreeMap<String, String>) -> String {
    let mut command = command.to_string();
    for (key, value) in overrides {
        let flag = format!("--{key}");
        let flag_eq = format!("--{key}=");
        if command.contains(&flag_eq) || command.contains(&flag) {
            let pattern = format!(r"--{}[=\s]+\S+", regex::escape(key));
            // The pattern is built from a fixed prefix/suffix around an
            // escaped key, so it always compiles.
            let re = Regex::new(&pattern).expect("override pattern is always valid");
            command = re.replace_all(&command, format!("--{key}={value}")).into_owned();
        } else {
            command = format!("{command} --{key}={value}");
        }
    }
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_reference() {
        let r = parse_reference("@3").unwrap();
        assert_eq!(r, StepRef { number: 3, is_build: false });
    }

    #[test]
    fn parses_build_reference_case_insensitively() {
        assert_eq!(parse_reference("@B2").unwrap(), StepRef { number: 2, is_build: true });
        assert_eq!(parse_reference("@b2").unwrap(), StepRef { number: 2, is_build: true });
    }

    #[test]
    fn rejects_non_numeric_reference() {
        assert!(parse_reference("@abc").is_err());
        assert!(parse_reference("3").is_err());
        assert!(parse_reference("@").is_err());
        assert!(parse_reference("@B").is_err());
    }

    #[test]
    fn override_appends_when_flag_absent() {
        let mut overrides = BTreeMap::new();
        overrides.insert("epochs".to_string(), "10".to_string());
        assert_eq!(apply_overrides("python train.py", &overrides), "python train.py --epochs=10");
    }

    #[test]
    fn override_replaces_equals_form() {
        let mut overrides = BTreeMap::new();
        overrides.insert("epochs".to_string(), "10".to_string());
        assert_eq!(apply_overrides("python train.py --epochs=3", &overrides), "python train.py --epochs=10");
    }

    #[test]
    fn override_replaces_space_form() {
        let mut overrides = BTreeMap::new();
        overrides.insert("epochs".to_string(), "10".to_string());
        assert_eq!(apply_overrides("python train.py --epochs 3", &overrides), "python train.py --epochs=10");
    }

    #[test]
    fn multiple_overrides_applied_in_key_order() {
        let mut overrides = BTreeMap::new();
        overrides.insert("lr".to_string(), "0.01".to_string());
        overrides.insert("epochs".to_string(), "10".to_string());
        let result = apply_overrides("python train.py --epochs=3", &overrides);
        assert_eq!(result, "python train.py --epochs=10 --lr=0.01");
    }
}
