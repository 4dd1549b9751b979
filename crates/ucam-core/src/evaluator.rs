//! Access rule evaluation.
//!
//! Given a customer, the caller's group memberships and a set of rules,
//! decide whether the customer's rows are visible at a given date:
//!
//! - only rules of member groups that are active at `as_of` count;
//! - a group makes the customer eligible when it has no active INCLUDE
//!   rule, or one of its INCLUDE rules covers the customer;
//! - eligibility is OR-ed across groups;
//! - any active EXCLUDE rule covering the customer, from any member group,
//!   denies regardless of eligibility;
//! - no memberships, or no active rule at all, denies.
//!
//! A rule with an empty customer set covers every customer.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::access_rule::{AccessRule, AccessType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Grant,
    Deny,
}

impl Decision {
    pub fn is_granted(&self) -> bool {
        matches!(self, Decision::Grant)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    NoMemberships,
    NoActiveRules,
    /// An active EXCLUDE rule covers the customer.
    Excluded,
    /// A member group has no active INCLUDE rule restricting it.
    Unrestricted,
    /// An active INCLUDE rule covers the customer.
    Included,
    /// Every member group restricts to INCLUDE lists that miss the customer.
    NotIncluded,
}

/// Decision plus the rules that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub decision: Decision,
    pub reason: DecisionReason,
    pub deciding_rules: Vec<Uuid>,
}

impl Evaluation {
    fn deny(reason: DecisionReason, deciding_rules: Vec<Uuid>) -> Self {
        Self {
            decision: Decision::Deny,
            reason,
            deciding_rules,
        }
    }

    fn grant(reason: DecisionReason, deciding_rules: Vec<Uuid>) -> Self {
        Self {
            decision: Decision::Grant,
            reason,
            deciding_rules,
        }
    }
}

/// Decide access for `customer_id`. See the module docs for the rules.
pub fn evaluate<'a, I>(
    customer_id: i64,
    group_memberships: &BTreeSet<String>,
    rules: I,
    as_of: NaiveDate,
) -> Decision
where
    I: IntoIterator<Item = &'a AccessRule>,
{
    explain(customer_id, group_memberships, rules, as_of).decision
}

/// Same as [`evaluate`], reporting why.
pub fn explain<'a, I>(
    customer_id: i64,
    group_memberships: &BTreeSet<String>,
    rules: I,
    as_of: NaiveDate,
) -> Evaluation
where
    I: IntoIterator<Item = &'a AccessRule>,
{
    if group_memberships.is_empty() {
        return Evaluation::deny(DecisionReason::NoMemberships, Vec::new());
    }

    let mut by_group: BTreeMap<&str, Vec<&AccessRule>> = BTreeMap::new();
    for rule in rules {
        if group_memberships.contains(&rule.group_name) && rule.is_active(as_of) {
            by_group.entry(rule.group_name.as_str()).or_default().push(rule);
        }
    }

    if by_group.is_empty() {
        return Evaluation::deny(DecisionReason::NoActiveRules, Vec::new());
    }

    let excluded: Vec<Uuid> = by_group
        .values()
        .flatten()
        .filter(|r| r.access_type == AccessType::Exclude && r.matches_customer(customer_id))
        .map(|r| r.id)
        .collect();
    if !excluded.is_empty() {
        return Evaluation::deny(DecisionReason::Excluded, excluded);
    }

    let mut included = Vec::new();
    let mut unrestricted = Vec::new();
    for group_rules in by_group.values() {
        let mut includes = group_rules
            .iter()
            .filter(|r| r.access_type == AccessType::Include)
            .peekable();
        if includes.peek().is_none() {
            unrestricted.extend(group_rules.iter().map(|r| r.id));
            continue;
        }
        included.extend(
            includes
                .filter(|r| r.matches_customer(customer_id))
                .map(|r| r.id),
        );
    }

    if !included.is_empty() {
        Evaluation::grant(DecisionReason::Included, included)
    } else if !unrestricted.is_empty() {
        Evaluation::grant(DecisionReason::Unrestricted, unrestricted)
    } else {
        Evaluation::deny(DecisionReason::NotIncluded, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rule(
        group: &str,
        access_type: AccessType,
        ids: &[i64],
        effective: NaiveDate,
        expiration: Option<NaiveDate>,
    ) -> AccessRule {
        AccessRule {
            id: Uuid::new_v4(),
            group_name: group.into(),
            customer_ids: ids.iter().copied().collect(),
            access_type,
            effective_date: effective,
            expiration_date: expiration,
            notes: None,
            created_by: "admin@example.com".into(),
            created_at: Utc::now(),
            modified_by: "admin@example.com".into(),
            modified_at: Utc::now(),
            last_mutation_id: Uuid::new_v4(),
        }
    }

    fn groups(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn include_listed_customer_is_granted() {
        let r = rule("G1", AccessType::Include, &[101, 102], date(2024, 1, 1), None);
        let d = evaluate(101, &groups(&["G1"]), [&r], date(2024, 6, 1));
        assert_eq!(d, Decision::Grant);
    }

    #[test]
    fn rule_not_yet_effective_denies() {
        let r = rule("G1", AccessType::Include, &[101, 102], date(2024, 1, 1), None);
        let e = explain(101, &groups(&["G1"]), [&r], date(2023, 12, 31));
        assert_eq!(e.decision, Decision::Deny);
        assert_eq!(e.reason, DecisionReason::NoActiveRules);
    }

    #[test]
    fn exclude_in_other_group_beats_include_all() {
        let today = date(2025, 3, 10);
        let r1 = rule("G1", AccessType::Include, &[], date(2024, 1, 1), None);
        let r2 = rule("G2", AccessType::Exclude, &[101], date(2024, 1, 1), None);
        let e = explain(101, &groups(&["G1", "G2"]), [&r1, &r2], today);
        assert_eq!(e.decision, Decision::Deny);
        assert_eq!(e.reason, DecisionReason::Excluded);
        assert_eq!(e.deciding_rules, vec![r2.id]);

        // Other customers still see rows through G1.
        assert_eq!(
            evaluate(202, &groups(&["G1", "G2"]), [&r1, &r2], today),
            Decision::Grant
        );
    }

    #[test]
    fn expiration_boundary_is_exclusive() {
        let r = rule(
            "G",
            AccessType::Include,
            &[7],
            date(2024, 1, 1),
            Some(date(2024, 7, 1)),
        );
        assert_eq!(evaluate(7, &groups(&["G"]), [&r], date(2024, 6, 30)), Decision::Grant);
        assert_eq!(evaluate(7, &groups(&["G"]), [&r], date(2024, 7, 1)), Decision::Deny);
    }

    #[test]
    fn no_memberships_denies() {
        let r = rule("G1", AccessType::Include, &[], date(2024, 1, 1), None);
        let e = explain(1, &BTreeSet::new(), [&r], date(2024, 6, 1));
        assert_eq!(e.reason, DecisionReason::NoMemberships);
    }

    #[test]
    fn rules_of_other_groups_are_ignored() {
        let r = rule("G9", AccessType::Include, &[], date(2024, 1, 1), None);
        assert_eq!(evaluate(1, &groups(&["G1"]), [&r], date(2024, 6, 1)), Decision::Deny);
    }

    #[test]
    fn exclude_only_group_grants_everyone_else() {
        let r = rule("G1", AccessType::Exclude, &[5], date(2024, 1, 1), None);
        let e = explain(6, &groups(&["G1"]), [&r], date(2024, 6, 1));
        assert_eq!(e.decision, Decision::Grant);
        assert_eq!(e.reason, DecisionReason::Unrestricted);
        assert_eq!(evaluate(5, &groups(&["G1"]), [&r], date(2024, 6, 1)), Decision::Deny);
    }

    #[test]
    fn exclude_all_denies_everyone() {
        let inc = rule("G1", AccessType::Include, &[], date(2024, 1, 1), None);
        let exc = rule("G1", AccessType::Exclude, &[], date(2024, 1, 1), None);
        assert_eq!(
            evaluate(42, &groups(&["G1"]), [&inc, &exc], date(2024, 6, 1)),
            Decision::Deny
        );
    }

    #[test]
    fn include_eligibility_is_ored_across_groups() {
        let today = date(2024, 6, 1);
        let g1 = rule("G1", AccessType::Include, &[1], date(2024, 1, 1), None);
        let g2 = rule("G2", AccessType::Include, &[2], date(2024, 1, 1), None);
        let member_of_both = groups(&["G1", "G2"]);
        assert_eq!(evaluate(1, &member_of_both, [&g1, &g2], today), Decision::Grant);
        assert_eq!(evaluate(2, &member_of_both, [&g1, &g2], today), Decision::Grant);
        assert_eq!(evaluate(3, &member_of_both, [&g1, &g2], today), Decision::Deny);
    }

    #[test]
    fn restricted_group_does_not_fall_back_to_unrestricted_sibling_rules() {
        // G1 restricts to {1}; its EXCLUDE on 9 does not make G1 unrestricted.
        let today = date(2024, 6, 1);
        let inc = rule("G1", AccessType::Include, &[1], date(2024, 1, 1), None);
        let exc = rule("G1", AccessType::Exclude, &[9], date(2024, 1, 1), None);
        let e = explain(2, &groups(&["G1"]), [&inc, &exc], today);
        assert_eq!(e.reason, DecisionReason::NotIncluded);
    }

    #[test]
    fn expired_exclude_no_longer_denies() {
        let today = date(2024, 6, 1);
        let inc = rule("G1", AccessType::Include, &[], date(2024, 1, 1), None);
        let exc = rule(
            "G1",
            AccessType::Exclude,
            &[1],
            date(2024, 1, 1),
            Some(date(2024, 5, 1)),
        );
        assert_eq!(evaluate(1, &groups(&["G1"]), [&inc, &exc], today), Decision::Grant);
    }

    fn arb_rule() -> impl Strategy<Value = AccessRule> {
        (
            prop_oneof![Just("G1"), Just("G2"), Just("G3")],
            any::<bool>(),
            proptest::collection::vec(0i64..20, 0..4),
            0i64..60,
            proptest::option::of(0i64..60),
        )
            .prop_map(|(group, include, ids, start, len)| {
                let base = date(2024, 1, 1);
                let effective = base + chrono::Duration::days(start);
                let expiration = len.map(|l| effective + chrono::Duration::days(l));
                let access_type = if include {
                    AccessType::Include
                } else {
                    AccessType::Exclude
                };
                rule(group, access_type, &ids, effective, expiration)
            })
    }

    proptest! {
        #[test]
        fn matching_active_exclude_always_denies(
            rules in proptest::collection::vec(arb_rule(), 0..8),
            customer in 0i64..20,
            day in 0i64..120,
        ) {
            let as_of = date(2024, 1, 1) + chrono::Duration::days(day);
            let members = groups(&["G1", "G2"]);
            let blocked = rules.iter().any(|r| {
                members.contains(&r.group_name)
                    && r.is_active(as_of)
                    && r.access_type == AccessType::Exclude
                    && r.matches_customer(customer)
            });
            if blocked {
                prop_assert_eq!(evaluate(customer, &members, &rules, as_of), Decision::Deny);
            }
        }

        #[test]
        fn no_active_member_rule_means_deny(
            rules in proptest::collection::vec(arb_rule(), 0..8),
            customer in 0i64..20,
            day in 0i64..120,
        ) {
            let as_of = date(2024, 1, 1) + chrono::Duration::days(day);
            let members = groups(&["G2"]);
            let any_active = rules
                .iter()
                .any(|r| members.contains(&r.group_name) && r.is_active(as_of));
            if !any_active {
                prop_assert_eq!(evaluate(customer, &members, &rules, as_of), Decision::Deny);
            }
        }

        #[test]
        fn evaluation_is_deterministic(
            rules in proptest::collection::vec(arb_rule(), 0..8),
            customer in 0i64..20,
            day in 0i64..120,
        ) {
            let as_of = date(2024, 1, 1) + chrono::Duration::days(day);
            let members = groups(&["G1", "G3"]);
            let first = explain(customer, &members, &rules, as_of);
            let second = explain(customer, &members, &rules, as_of);
            prop_assert_eq!(first, second);
        }
    }
}
