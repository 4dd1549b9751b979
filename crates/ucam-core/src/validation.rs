//! Input validation for UCAM.
//!
//! Everything here runs before any warehouse call. Failures are
//! [`UcamError::Validation`].

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{UcamError, UcamResult};
use crate::models::access_rule::AccessType;

/// Maximum length for identifiers and group names.
pub const MAX_IDENTIFIER_LEN: usize = 255;

/// Largest span a single `start-end` customer range may expand to.
pub const MAX_CUSTOMER_RANGE: i64 = 100_000;

/// Validate a warehouse identifier (tag name, catalog, column, ...).
///
/// Requirements:
/// - Not empty, <= 255 characters
/// - ASCII letters, digits and underscore only
/// - Does not start with a digit
pub fn validate_identifier(kind: &str, value: &str) -> UcamResult<()> {
    if value.is_empty() {
        return Err(UcamError::validation(format!("{kind} cannot be empty")));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(UcamError::validation(format!(
            "{kind} too long: {} > {MAX_IDENTIFIER_LEN} characters",
            value.len()
        )));
    }
    let mut chars = value.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(UcamError::validation(format!(
            "{kind} contains invalid characters: {value:?} (allowed: letters, digits, _; \
             must not start with a digit)"
        )));
    }
    Ok(())
}

/// Group names are matched verbatim against warehouse groups, which may
/// contain spaces and punctuation; only blank and control characters are
/// rejected.
pub fn validate_group_name(value: &str) -> UcamResult<()> {
    if value.trim().is_empty() {
        return Err(UcamError::validation("Group name is required."));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(UcamError::validation(format!(
            "Group name too long: {} > {MAX_IDENTIFIER_LEN} characters",
            value.len()
        )));
    }
    if value.chars().any(char::is_control) {
        return Err(UcamError::validation(
            "Group name contains control characters.",
        ));
    }
    Ok(())
}

/// Parse customer ids from `"1,2,3"`, `"1-10"` or `"1,2,5-8"`.
///
/// Returns a sorted, de-duplicated set. Blank input is the empty set
/// (all customers).
pub fn parse_customer_ids(input: &str) -> UcamResult<BTreeSet<i64>> {
    let mut ids = BTreeSet::new();
    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match split_range(part) {
            Some((start, end)) => {
                let start = parse_id(start)?;
                let end = parse_id(end)?;
                if end < start {
                    return Err(UcamError::validation(format!("Invalid range {part}")));
                }
                if end.checked_sub(start).is_none_or(|span| span >= MAX_CUSTOMER_RANGE) {
                    return Err(UcamError::validation(format!(
                        "Range {part} spans more than {MAX_CUSTOMER_RANGE} ids"
                    )));
                }
                ids.extend(start..=end);
            }
            None => {
                ids.insert(parse_id(part)?);
            }
        }
    }
    Ok(ids)
}

/// Split `a-b` on the first dash that is not a leading sign.
fn split_range(part: &str) -> Option<(&str, &str)> {
    let offset = usize::from(part.starts_with('-'));
    part[offset..]
        .find('-')
        .map(|i| (&part[..offset + i], &part[offset + i + 1..]))
}

fn parse_id(raw: &str) -> UcamResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|e| UcamError::validation(format!("Invalid customer ID format: {raw:?}: {e}")))
}

/// Sorted, unique customer ids.
pub fn normalize_customer_ids(values: impl IntoIterator<Item = i64>) -> BTreeSet<i64> {
    values.into_iter().collect()
}

/// The effective date may not fall after the expiration date.
pub fn validate_dates(effective: NaiveDate, expiration: Option<NaiveDate>) -> UcamResult<()> {
    match expiration {
        Some(exp) if exp < effective => Err(UcamError::validation(
            "Expiration date must not be before effective date.",
        )),
        _ => Ok(()),
    }
}

/// Reduce a workspace URL or hostname to a bare hostname.
pub fn normalize_hostname(value: &str) -> String {
    let value = value.trim();
    let without_scheme = value
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(value);
    without_scheme
        .split('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Raw rule input as entered by an administrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDraft {
    pub group_name: String,
    /// Comma separated ids and ranges, blank for all customers.
    pub customer_ids: String,
    pub access_type: String,
    pub effective_date: NaiveDate,
    pub expiration_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// A rule draft that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleInput {
    pub group_name: String,
    pub customer_ids: BTreeSet<i64>,
    pub access_type: AccessType,
    pub effective_date: NaiveDate,
    pub expiration_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl RuleDraft {
    /// Validate every field, reporting all problems at once.
    pub fn validate(self) -> UcamResult<RuleInput> {
        let mut errors = Vec::new();

        let group_name = self.group_name.trim().to_string();
        if let Err(e) = validate_group_name(&group_name) {
            errors.push(message_of(e));
        }
        let customer_ids = parse_customer_ids(&self.customer_ids)
            .map_err(|e| errors.push(message_of(e)))
            .ok();
        let access_type = self
            .access_type
            .parse::<AccessType>()
            .map_err(|e| errors.push(message_of(e)))
            .ok();
        if let Err(e) = validate_dates(self.effective_date, self.expiration_date) {
            errors.push(message_of(e));
        }

        match (customer_ids, access_type) {
            (Some(customer_ids), Some(access_type)) if errors.is_empty() => Ok(RuleInput {
                group_name,
                customer_ids,
                access_type,
                effective_date: self.effective_date,
                expiration_date: self.expiration_date,
                notes: self.notes.filter(|n| !n.trim().is_empty()),
            }),
            _ => Err(UcamError::validation(errors.join("; "))),
        }
    }
}

fn message_of(err: UcamError) -> String {
    match err {
        UcamError::Validation { message } => message,
        other => other.to_string(),
    }
}
