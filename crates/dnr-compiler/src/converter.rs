//! Conversion orchestration
//!
//! Drives scanned units through negation, grouping, synthesis and merging,
//! then applies the output caps and checks the final id invariants.
//!
//! # Usage
//!
//! ```rust,ignore
//! let unit = scan_unit(0, &list_text, &ScanOptions::default(), None);
//! let converted = RulesConverter::new().convert(vec![unit], &options)?;
//! ```

use std::collections::HashSet;

use dnr_core::{DeclarativeRule, MAX_RULE_ID, MIN_RULE_ID};

use crate::error::{ConversionError, ConvertError, LimitationError, SourceMapEntry};
use crate::grouper::{GroupedRules, RulesGroup};
use crate::ids::IdAllocator;
use crate::limitations::apply_limitations;
use crate::merger::{merge_rules, MergeStrategy};
use crate::network_rule::NetworkRule;
use crate::options::ConverterOptions;
use crate::redirects::{BuiltinRedirects, RedirectResolver};
use crate::regex::{Re2RegexValidator, RegexValidator};
use crate::scanner::ScannedUnit;
use crate::synthesizer::{convert_rule, ConversionContext};

/// Result of a conversion run.
#[derive(Debug, Default)]
pub struct ConvertedRules {
    pub declarative_rules: Vec<DeclarativeRule>,
    pub source_map_values: Vec<SourceMapEntry>,
    pub errors: Vec<ConversionError>,
    pub limitations: Vec<LimitationError>,
}

/// Rules, sources and errors produced by one group or unit.
#[derive(Debug, Default)]
struct GroupOutput {
    declarative_rules: Vec<DeclarativeRule>,
    source_map: Vec<SourceMapEntry>,
    errors: Vec<ConversionError>,
}

impl GroupOutput {
    fn append(&mut self, other: GroupOutput) {
        self.declarative_rules.extend(other.declarative_rules);
        self.source_map.extend(other.source_map);
        self.errors.extend(other.errors);
    }
}

pub struct RulesConverter {
    regex_validator: Box<dyn RegexValidator>,
    redirects: Box<dyn RedirectResolver>,
}

impl Default for RulesConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl RulesConverter {
    pub fn new() -> Self {
        Self {
            regex_validator: Box::new(Re2RegexValidator),
            redirects: Box::new(BuiltinRedirects),
        }
    }

    pub fn with_regex_validator(mut self, validator: impl RegexValidator + 'static) -> Self {
        self.regex_validator = Box::new(validator);
        self
    }

    pub fn with_redirect_resolver(mut self, resolver: impl RedirectResolver + 'static) -> Self {
        self.redirects = Box::new(resolver);
        self
    }

    /// Convert `units` with a fresh id space.
    pub fn convert(
        &self,
        units: Vec<ScannedUnit>,
        options: &ConverterOptions,
    ) -> Result<ConvertedRules, ConvertError> {
        self.convert_with_ids(units, options, &IdAllocator::new())
    }

    /// Convert `units`, allocating ids from a shared allocator.
    ///
    /// Units are handled in order. Reusing one allocator across builds keeps
    /// ids of unchanged rules stable and free of cross-unit collisions.
    pub fn convert_with_ids(
        &self,
        units: Vec<ScannedUnit>,
        options: &ConverterOptions,
        ids: &IdAllocator,
    ) -> Result<ConvertedRules, ConvertError> {
        options.validate()?;

        let ctx = ConversionContext {
            options,
            ids,
            regex_validator: self.regex_validator.as_ref(),
            redirects: self.redirects.as_ref(),
        };

        let negations: Vec<NetworkRule> = units
            .iter()
            .flat_map(|unit| unit.negation_rules.iter().cloned())
            .collect();

        let mut output = GroupOutput::default();
        for unit in units {
            let unit_id = unit.unit_id;
            output.errors.extend(unit.errors);

            let mut grouped = GroupedRules::new(unit.rules);
            let negated = grouped.apply_negations(&negations);
            if negated > 0 {
                log::debug!("unit {unit_id}: {negated} rules cancelled by $badfilter");
            }

            for group in RulesGroup::ALL {
                output.append(convert_group(&ctx, group, grouped.group(group))?);
            }
        }

        let limited = apply_limitations(
            options,
            output.declarative_rules,
            output.source_map,
            output.errors,
        );

        validate_rule_ids(&limited.declarative_rules)?;

        log::info!(
            "converted {} declarative rules, {} errors, {} limitations",
            limited.declarative_rules.len(),
            limited.errors.len(),
            limited.limitations.len()
        );

        Ok(ConvertedRules {
            declarative_rules: limited.declarative_rules,
            source_map_values: limited.source_map,
            errors: limited.errors,
            limitations: limited.limitations,
        })
    }
}

fn convert_group(
    ctx: &ConversionContext<'_>,
    group: RulesGroup,
    rules: &[NetworkRule],
) -> Result<GroupOutput, ConvertError> {
    let strategy = match group {
        RulesGroup::BadFilter => return Ok(GroupOutput::default()),
        RulesGroup::Regular => return Ok(convert_rules(ctx, rules)),
        RulesGroup::RemoveParam => MergeStrategy::RemoveParam,
        RulesGroup::RemoveHeader => MergeStrategy::RemoveHeader,
        RulesGroup::Csp => MergeStrategy::Csp,
    };

    let converted = convert_rules(ctx, rules);
    let (declarative_rules, source_map) =
        merge_rules(strategy, converted.declarative_rules, converted.source_map)?;

    Ok(GroupOutput {
        declarative_rules,
        source_map,
        errors: converted.errors,
    })
}

fn convert_rules(ctx: &ConversionContext<'_>, rules: &[NetworkRule]) -> GroupOutput {
    let mut output = GroupOutput::default();

    for rule in rules {
        match convert_rule(ctx, rule) {
            Ok(declarative) => {
                output.source_map.push(SourceMapEntry {
                    declarative_rule_id: declarative.id,
                    unit_id: rule.unit_id(),
                    source_index: rule.source_index(),
                });
                output.declarative_rules.push(declarative);
            }
            Err(err) => output.errors.push(err),
        }
    }

    output
}

/// Every id unique and within the engine's range.
pub fn validate_rule_ids(rules: &[DeclarativeRule]) -> Result<(), ConvertError> {
    let mut seen = HashSet::with_capacity(rules.len());

    for rule in rules {
        if !(MIN_RULE_ID..=MAX_RULE_ID).contains(&rule.id) {
            return Err(ConvertError::IdOutOfRange(rule.id));
        }
        if !seen.insert(rule.id) {
            return Err(ConvertError::DuplicateId(rule.id));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{scan_unit, ScanOptions};
    use dnr_core::RuleAction;

    fn scan(unit_id: usize, text: &str) -> ScannedUnit {
        scan_unit(unit_id, text, &ScanOptions::default(), None)
    }

    fn convert(units: Vec<ScannedUnit>, options: &ConverterOptions) -> ConvertedRules {
        RulesConverter::new()
            .convert(units, options)
            .expect("conversion should succeed")
    }

    fn url_filters(converted: &ConvertedRules) -> Vec<&str> {
        converted
            .declarative_rules
            .iter()
            .filter_map(|rule| rule.condition.url_filter.as_deref())
            .collect()
    }

    #[test]
    fn converts_a_unit() {
        let converted = convert(
            vec![scan(0, "||ads.example^\n@@||ads.example/ok.js\n||bad^$bogus\n")],
            &ConverterOptions::default(),
        );

        assert_eq!(url_filters(&converted), ["||ads.example^", "||ads.example/ok.js"]);
        assert_eq!(converted.source_map_values.len(), 2);
        assert_eq!(converted.errors.len(), 1);
        assert!(converted.limitations.is_empty());
    }

    #[test]
    fn ids_are_unique_and_covered_by_the_source_map() {
        let text = "||a.example^\n||a.example^\n||b.example^$script\n\
                    ||c.example^$csp=script-src 'none'\n/ads[0-9]+/\n";
        let converted = convert(vec![scan(0, text), scan(1, text)], &ConverterOptions::default());

        assert_eq!(converted.declarative_rules.len(), 10);
        assert!(validate_rule_ids(&converted.declarative_rules).is_ok());
        for rule in &converted.declarative_rules {
            assert!(converted
                .source_map_values
                .iter()
                .any(|entry| entry.declarative_rule_id == rule.id));
        }
    }

    #[test]
    fn same_input_gives_same_ids() {
        let text = "||a.example^\n||b.example^$removeparam=utm_source\n@@||c.example^$document\n";
        let first = convert(vec![scan(0, text)], &ConverterOptions::default());
        let second = convert(vec![scan(0, text)], &ConverterOptions::default());
        assert_eq!(first.declarative_rules, second.declarative_rules);
    }

    #[test]
    fn badfilter_applies_across_units() {
        let converted = convert(
            vec![
                scan(0, "||a.example^\n||b.example^\n||a.example^$csp=script-src 'none'\n"),
                scan(1, "||a.example^$badfilter\n||a.example^\n"),
            ],
            &ConverterOptions::default(),
        );

        // Only the CSP rule for a.example survives the negation
        assert_eq!(url_filters(&converted), ["||b.example^", "||a.example^"]);
        assert!(matches!(
            converted.declarative_rules[1].action,
            RuleAction::ModifyHeaders { .. }
        ));
    }

    #[test]
    fn csp_rules_merge_within_a_unit() {
        let converted = convert(
            vec![scan(
                0,
                "||a.example^$csp=script-src 'self'\n||a.example^$csp=style-src 'unsafe-inline'\n",
            )],
            &ConverterOptions::default(),
        );

        assert_eq!(converted.declarative_rules.len(), 1);
        let id = converted.declarative_rules[0].id;
        let sources: Vec<_> = converted
            .source_map_values
            .iter()
            .map(|entry| (entry.declarative_rule_id, entry.source_index))
            .collect();
        let second_line = "||a.example^$csp=script-src 'self'\n".len();
        assert_eq!(sources, [(id, 0), (id, second_line)]);
    }

    #[test]
    fn caps_are_reported() {
        let converted = convert(
            vec![scan(0, "||a.example^\n||b.example^\n||c.example^\n")],
            &ConverterOptions {
                max_number_of_rules: Some(2),
                ..Default::default()
            },
        );
        assert_eq!(url_filters(&converted), ["||a.example^", "||b.example^"]);
        assert!(matches!(
            converted.limitations.as_slice(),
            [LimitationError::TooManyRules { limit: 2, total: 3, .. }]
        ));
    }

    #[test]
    fn rule_errors_do_not_stop_the_run() {
        let converted = convert(
            vec![scan(0, "||a.example^$domain=*.b.com\n/ads(?=x)/\n||c.example^\n")],
            &ConverterOptions::default(),
        );
        assert_eq!(url_filters(&converted), ["||c.example^"]);
        assert!(matches!(converted.errors[0], ConversionError::EmptyDomains { .. }));
        assert!(matches!(
            converted.errors[1],
            ConversionError::UnsupportedRegexp { .. }
        ));
    }

    #[test]
    fn invalid_options_abort_the_run() {
        let result = RulesConverter::new().convert(
            vec![scan(0, "||a.example^\n")],
            &ConverterOptions {
                max_number_of_rules: Some(0),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(ConvertError::Options(_))));
    }

    #[test]
    fn shared_allocator_keeps_units_apart() {
        let ids = IdAllocator::new();
        let converter = RulesConverter::new();
        let first = converter
            .convert_with_ids(vec![scan(0, "||a.example^\n")], &ConverterOptions::default(), &ids)
            .expect("first unit");
        let second = converter
            .convert_with_ids(vec![scan(1, "||a.example^\n")], &ConverterOptions::default(), &ids)
            .expect("second unit");

        assert_ne!(first.declarative_rules[0].id, second.declarative_rules[0].id);
    }

    #[test]
    fn custom_regex_validator_is_used() {
        struct RejectAll;
        impl RegexValidator for RejectAll {
            fn is_supported(&self, _pattern: &str, _case_sensitive: bool) -> Result<(), String> {
                Err("regex rules disabled".to_string())
            }
        }

        let converted = RulesConverter::new()
            .with_regex_validator(RejectAll)
            .convert(vec![scan(0, "/ads[0-9]+/\n")], &ConverterOptions::default())
            .expect("conversion should succeed");
        assert!(converted.declarative_rules.is_empty());
        match &converted.errors[0] {
            ConversionError::UnsupportedRegexp { reason, .. } => {
                assert_eq!(reason, "regex rules disabled")
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn rejects_duplicate_and_out_of_range_ids() {
        let rule = |id| DeclarativeRule {
            id,
            priority: 1,
            action: RuleAction::Block,
            condition: Default::default(),
        };
        assert!(matches!(
            validate_rule_ids(&[rule(5), rule(5)]),
            Err(ConvertError::DuplicateId(5))
        ));
        assert!(matches!(
            validate_rule_ids(&[rule(1)]),
            Err(ConvertError::IdOutOfRange(1))
        ));
    }
}
