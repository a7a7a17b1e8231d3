//! Output caps
//!
//! The engine refuses a ruleset over its static rule quota, and keeps separate
//! quotas for unsafe (redirect and header modifying) rules and for regex
//! rules. Rules over a cap are dropped together with their source map entries
//! and bound errors; each cap that bit is reported as a [`LimitationError`].
//!
//! The rule cap is positional: a rule survives iff its index in the input is
//! below the cap, so an unsafe rule dropped early does not free a slot for a
//! later one.

use std::collections::{HashMap, HashSet};

use dnr_core::DeclarativeRule;

use crate::error::{ConversionError, LimitationError, SourceMapEntry};
use crate::options::ConverterOptions;

/// Rules, sources and errors after the caps were applied.
#[derive(Debug, Default)]
pub struct LimitedRules {
    pub declarative_rules: Vec<DeclarativeRule>,
    pub source_map: Vec<SourceMapEntry>,
    pub errors: Vec<ConversionError>,
    pub limitations: Vec<LimitationError>,
}

/// Per-id bookkeeping for the rules under consideration.
struct RuleIndex {
    sources: HashMap<u32, Vec<SourceMapEntry>>,
    errors: HashMap<u32, Vec<ConversionError>>,
}

impl RuleIndex {
    /// Forget a dropped rule; returns its source lines.
    fn purge(&mut self, id: u32) -> Vec<SourceMapEntry> {
        self.errors.remove(&id);
        self.sources.remove(&id).unwrap_or_default()
    }
}

pub fn apply_limitations(
    options: &ConverterOptions,
    rules: Vec<DeclarativeRule>,
    source_map: Vec<SourceMapEntry>,
    errors: Vec<ConversionError>,
) -> LimitedRules {
    let rule_ids: HashSet<u32> = rules.iter().map(|rule| rule.id).collect();

    let mut index = RuleIndex {
        sources: HashMap::new(),
        errors: HashMap::new(),
    };
    for entry in source_map {
        index
            .sources
            .entry(entry.declarative_rule_id)
            .or_default()
            .push(entry);
    }

    let mut other_errors = Vec::new();
    for error in errors {
        match error.declarative_rule_id().filter(|id| rule_ids.contains(id)) {
            Some(id) => index.errors.entry(id).or_default().push(error),
            None => other_errors.push(error),
        }
    }

    let mut limitations = Vec::new();
    let mut rules = rules;

    if let Some(max_rules) = options.max_number_of_rules {
        if !rules.is_empty() {
            rules = limit_rule_count(
                rules,
                max_rules,
                options.max_number_of_unsafe_rules,
                &mut index,
                &mut limitations,
            );
        }
    }

    if let Some(max_regexp) = options.max_number_of_regexp_rules {
        rules = limit_regexp_rules(rules, max_regexp, &mut index, &mut limitations);
    }

    let mut limited = LimitedRules {
        limitations,
        ..Default::default()
    };
    for rule in &rules {
        if let Some(entries) = index.sources.remove(&rule.id) {
            limited.source_map.extend(entries);
        }
        if let Some(errors) = index.errors.remove(&rule.id) {
            limited.errors.extend(errors);
        }
    }
    limited.errors.extend(other_errors);
    limited.declarative_rules = rules;

    limited
}

fn limit_rule_count(
    rules: Vec<DeclarativeRule>,
    max_rules: usize,
    max_unsafe: Option<usize>,
    index: &mut RuleIndex,
    limitations: &mut Vec<LimitationError>,
) -> Vec<DeclarativeRule> {
    let total = rules.len();
    let mut kept = Vec::with_capacity(total.min(max_rules));
    let mut excluded = Vec::new();
    let mut excluded_unsafe = Vec::new();
    let mut unsafe_count = 0usize;

    for (position, rule) in rules.into_iter().enumerate() {
        if rule.is_unsafe() {
            unsafe_count += 1;
            if max_unsafe.is_some_and(|max| unsafe_count > max) {
                excluded_unsafe.extend(index.purge(rule.id));
                continue;
            }
        }

        if position < max_rules {
            kept.push(rule);
        } else {
            excluded.extend(index.purge(rule.id));
        }
    }

    if let Some(max_unsafe) = max_unsafe.filter(|max| unsafe_count > *max) {
        log::warn!("{unsafe_count} unsafe rules exceed the limit of {max_unsafe}");
        limitations.push(LimitationError::TooManyUnsafeRules {
            excluded: excluded_unsafe,
            limit: max_unsafe,
            total: unsafe_count,
        });
    }

    if total > max_rules {
        log::warn!("{total} rules exceed the limit of {max_rules}");
        limitations.push(LimitationError::TooManyRules {
            excluded,
            limit: max_rules,
            total,
        });
    }

    kept
}

fn limit_regexp_rules(
    rules: Vec<DeclarativeRule>,
    max_regexp: usize,
    index: &mut RuleIndex,
    limitations: &mut Vec<LimitationError>,
) -> Vec<DeclarativeRule> {
    let mut kept = Vec::with_capacity(rules.len());
    let mut excluded = Vec::new();
    let mut regexp_count = 0usize;

    for rule in rules {
        if rule.is_regex() {
            regexp_count += 1;
            if regexp_count > max_regexp {
                excluded.extend(index.purge(rule.id));
                continue;
            }
        }
        kept.push(rule);
    }

    if regexp_count > max_regexp {
        log::warn!("{regexp_count} regex rules exceed the limit of {max_regexp}");
        limitations.push(LimitationError::TooManyRegexpRules {
            excluded,
            limit: max_regexp,
            total: regexp_count,
        });
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use dnr_core::{ModifyHeaderInfo, RuleAction, RuleCondition};

    fn rule(id: u32, unsafe_action: bool, regex: bool) -> DeclarativeRule {
        let action = if unsafe_action {
            RuleAction::ModifyHeaders {
                request_headers: None,
                response_headers: Some(vec![ModifyHeaderInfo::remove("refresh")]),
            }
        } else {
            RuleAction::Block
        };
        let condition = if regex {
            RuleCondition {
                regex_filter: Some("^https://ads\\.".to_string()),
                ..Default::default()
            }
        } else {
            RuleCondition {
                url_filter: Some(format!("||ads{id}.example^")),
                ..Default::default()
            }
        };
        DeclarativeRule {
            id,
            priority: 1,
            action,
            condition,
        }
    }

    fn entry(id: u32) -> SourceMapEntry {
        SourceMapEntry {
            declarative_rule_id: id,
            unit_id: 0,
            source_index: id as usize * 100,
        }
    }

    fn ids(rules: &[DeclarativeRule]) -> Vec<u32> {
        rules.iter().map(|rule| rule.id).collect()
    }

    #[test]
    fn no_caps_keeps_everything() {
        let rules = vec![rule(10, false, false), rule(11, true, true)];
        let limited = apply_limitations(
            &ConverterOptions::default(),
            rules,
            vec![entry(10), entry(11)],
            Vec::new(),
        );
        assert_eq!(ids(&limited.declarative_rules), [10, 11]);
        assert_eq!(limited.source_map.len(), 2);
        assert!(limited.limitations.is_empty());
    }

    #[test]
    fn rule_cap_is_positional_and_unsafe_drops_do_not_free_slots() {
        // positions 1 and 3 are unsafe
        let rules = vec![
            rule(10, false, false),
            rule(11, true, false),
            rule(12, false, false),
            rule(13, true, false),
            rule(14, false, false),
        ];
        let source_map = rules.iter().map(|r| entry(r.id)).collect();
        let options = ConverterOptions {
            max_number_of_rules: Some(3),
            max_number_of_unsafe_rules: Some(1),
            ..Default::default()
        };

        let limited = apply_limitations(&options, rules, source_map, Vec::new());

        assert_eq!(ids(&limited.declarative_rules), [10, 11, 12]);
        let mapped: Vec<_> = limited
            .source_map
            .iter()
            .map(|e| e.declarative_rule_id)
            .collect();
        assert_eq!(mapped, [10, 11, 12]);

        assert_eq!(
            limited.limitations,
            vec![
                LimitationError::TooManyUnsafeRules {
                    excluded: vec![entry(13)],
                    limit: 1,
                    total: 2,
                },
                LimitationError::TooManyRules {
                    excluded: vec![entry(14)],
                    limit: 3,
                    total: 5,
                },
            ]
        );
    }

    #[test]
    fn unsafe_drop_before_the_cap_leaves_the_slot_empty() {
        let rules = vec![
            rule(10, true, false),
            rule(11, true, false),
            rule(12, false, false),
            rule(13, false, false),
        ];
        let source_map = rules.iter().map(|r| entry(r.id)).collect();
        let options = ConverterOptions {
            max_number_of_rules: Some(3),
            max_number_of_unsafe_rules: Some(1),
            ..Default::default()
        };

        let limited = apply_limitations(&options, rules, source_map, Vec::new());

        // 11 goes over the unsafe cap, 13 sits at position 3
        assert_eq!(ids(&limited.declarative_rules), [10, 12]);
    }

    #[test]
    fn regexp_cap_uses_running_count() {
        let rules = vec![
            rule(10, false, false),
            rule(11, false, true),
            rule(12, false, true),
            rule(13, false, false),
        ];
        let source_map = rules.iter().map(|r| entry(r.id)).collect();
        let options = ConverterOptions {
            max_number_of_regexp_rules: Some(1),
            ..Default::default()
        };

        let limited = apply_limitations(&options, rules, source_map, Vec::new());

        assert_eq!(ids(&limited.declarative_rules), [10, 11, 13]);
        assert_eq!(
            limited.limitations,
            vec![LimitationError::TooManyRegexpRules {
                excluded: vec![entry(12)],
                limit: 1,
                total: 2,
            }]
        );
    }

    #[test]
    fn unsafe_cap_without_rule_cap_is_not_applied() {
        let rules = vec![rule(10, true, false), rule(11, true, false)];
        let options = ConverterOptions {
            max_number_of_unsafe_rules: Some(1),
            ..Default::default()
        };
        let limited = apply_limitations(&options, rules, vec![entry(10), entry(11)], Vec::new());
        assert_eq!(ids(&limited.declarative_rules), [10, 11]);
        assert!(limited.limitations.is_empty());
    }

    #[test]
    fn unbound_errors_are_kept() {
        let errors = vec![ConversionError::MaxScannedRules {
            unit_id: 0,
            line: 9,
        }];
        let options = ConverterOptions {
            max_number_of_rules: Some(1),
            ..Default::default()
        };
        let limited = apply_limitations(
            &options,
            vec![rule(10, false, false), rule(11, false, false)],
            vec![entry(10), entry(11)],
            errors,
        );
        assert_eq!(ids(&limited.declarative_rules), [10]);
        assert_eq!(limited.errors.len(), 1);
        assert!(matches!(
            limited.errors[0],
            ConversionError::MaxScannedRules { line: 9, .. }
        ));
    }
}
