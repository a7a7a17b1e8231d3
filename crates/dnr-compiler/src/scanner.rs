//! Filter list scanning
//!
//! Turns one unit's text into [`NetworkRule`]s. Cosmetic rules, comments and
//! blank lines are skipped silently; lines the parser rejects become
//! diagnostics and never stop the scan.

use std::ops::ControlFlow;

use dnr_core::types::NetworkRuleOption;

use crate::error::ConversionError;
use crate::network_rule::NetworkRule;
use crate::parser::{parse_filter_list, NodeKind, RuleNode};

/// Optional per-rule predicate; rules it rejects are not counted or kept.
pub type RuleFilter<'a> = &'a dyn Fn(&NetworkRule) -> bool;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// Stop once this many rules have been accepted from one unit.
    pub max_number_of_scanned_rules: Option<usize>,
}

/// Everything scanned from one unit.
#[derive(Debug, Default)]
pub struct ScannedUnit {
    pub unit_id: usize,
    pub rules: Vec<NetworkRule>,
    /// `$badfilter` rules, also present in `rules`
    pub negation_rules: Vec<NetworkRule>,
    pub errors: Vec<ConversionError>,
}

/// Scan one unit.
pub fn scan_unit(
    unit_id: usize,
    text: &str,
    options: &ScanOptions,
    filter: Option<RuleFilter<'_>>,
) -> ScannedUnit {
    let list = parse_filter_list(text);
    let mut unit = ScannedUnit {
        unit_id,
        ..Default::default()
    };

    for node in &list.children {
        if scan_node(&mut unit, node, options, filter).is_break() {
            break;
        }
    }

    log::debug!(
        "unit {unit_id}: {} rules, {} negations, {} errors",
        unit.rules.len(),
        unit.negation_rules.len(),
        unit.errors.len()
    );

    unit
}

/// Breaks once the accepted count reaches the scan cap.
fn scan_node(
    unit: &mut ScannedUnit,
    node: &RuleNode,
    options: &ScanOptions,
    filter: Option<RuleFilter<'_>>,
) -> ControlFlow<()> {
    let network = match &node.kind {
        NodeKind::Network(network) => network,
        NodeKind::Invalid { message } => {
            unit.errors.push(invalid_rule(unit.unit_id, node, message.clone()));
            return ControlFlow::Continue(());
        }
        _ => return ControlFlow::Continue(()),
    };

    for converted in network.convert() {
        let rule = match NetworkRule::new(&converted, unit.unit_id, node.start, node.line) {
            Ok(rule) => rule,
            Err(message) => {
                unit.errors.push(invalid_rule(unit.unit_id, node, message));
                continue;
            }
        };

        if filter.is_some_and(|keep| !keep(&rule)) {
            continue;
        }

        if rule.is_option_enabled(NetworkRuleOption::BADFILTER) {
            unit.negation_rules.push(rule.clone());
        }
        unit.rules.push(rule);

        if let Some(max) = options
            .max_number_of_scanned_rules
            .filter(|max| unit.rules.len() >= *max)
        {
            log::warn!(
                "unit {}: scanned rule limit of {max} reached at line {}",
                unit.unit_id,
                node.line
            );
            unit.errors.push(ConversionError::MaxScannedRules {
                unit_id: unit.unit_id,
                line: node.line,
            });
            return ControlFlow::Break(());
        }
    }

    ControlFlow::Continue(())
}

fn invalid_rule(unit_id: usize, node: &RuleNode, message: String) -> ConversionError {
    ConversionError::InvalidRule {
        unit_id,
        line: node.line,
        text: node.raw.clone(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = "! Title: test\n\
                        ||ads.example^\n\
                        example.org##.banner\n\
                        ||bad.example^$bogus\n\
                        ||tracker.example^$badfilter\n\
                        ||cdn.example^$script\n";

    #[test]
    fn scans_network_rules_and_reports_invalid_lines() {
        let unit = scan_unit(4, LIST, &ScanOptions::default(), None);

        let texts: Vec<_> = unit.rules.iter().map(NetworkRule::text).collect();
        assert_eq!(
            texts,
            ["||ads.example^", "||tracker.example^$badfilter", "||cdn.example^$script"]
        );
        assert_eq!(unit.negation_rules.len(), 1);
        assert_eq!(unit.negation_rules[0].text(), "||tracker.example^$badfilter");

        assert_eq!(unit.errors.len(), 1);
        assert!(matches!(
            &unit.errors[0],
            ConversionError::InvalidRule { unit_id: 4, line: 3, .. }
        ));
    }

    #[test]
    fn records_line_and_byte_offset() {
        let unit = scan_unit(0, LIST, &ScanOptions::default(), None);
        let rule = &unit.rules[0];
        assert_eq!(rule.unit_id(), 0);
        assert_eq!(rule.line(), 1);
        assert_eq!(rule.source_index(), "! Title: test\n".len());
    }

    #[test]
    fn stops_at_scan_limit() {
        let options = ScanOptions {
            max_number_of_scanned_rules: Some(1),
        };
        let unit = scan_unit(0, LIST, &options, None);

        assert_eq!(unit.rules.len(), 1);
        assert_eq!(unit.errors.len(), 1);
        assert!(matches!(
            unit.errors[0],
            ConversionError::MaxScannedRules { unit_id: 0, line: 1 }
        ));
    }

    #[test]
    fn limit_diagnostic_when_list_ends_at_the_cap() {
        let options = ScanOptions {
            max_number_of_scanned_rules: Some(2),
        };
        let unit = scan_unit(0, "||a.example^\n||b.example^\n! done\n", &options, None);
        assert_eq!(unit.rules.len(), 2);
        assert!(matches!(
            unit.errors[..],
            [ConversionError::MaxScannedRules { unit_id: 0, line: 1 }]
        ));
    }

    #[test]
    fn fanned_out_line_stops_at_the_cap() {
        let options = ScanOptions {
            max_number_of_scanned_rules: Some(1),
        };
        let unit = scan_unit(0, "||popups.example^$all\n||b.example^\n", &options, None);

        assert_eq!(unit.rules.len(), 1);
        assert_eq!(unit.rules[0].line(), 0);
        assert!(matches!(
            unit.errors[..],
            [ConversionError::MaxScannedRules { unit_id: 0, line: 0 }]
        ));
    }

    #[test]
    fn filter_predicate_skips_rules_without_counting_them() {
        let options = ScanOptions {
            max_number_of_scanned_rules: Some(1),
        };
        let only_scripts = |rule: &NetworkRule| rule.text().ends_with("$script");
        let unit = scan_unit(0, LIST, &options, Some(&only_scripts));

        let texts: Vec<_> = unit.rules.iter().map(NetworkRule::text).collect();
        assert_eq!(texts, ["||cdn.example^$script"]);
        // the invalid line 3 is reported, then the cap hits at line 5
        assert!(matches!(
            unit.errors[..],
            [
                ConversionError::InvalidRule { line: 3, .. },
                ConversionError::MaxScannedRules { line: 5, .. }
            ]
        ));
    }

    #[test]
    fn fan_out_keeps_the_source_position() {
        let unit = scan_unit(2, "||popups.example^$all\n", &ScanOptions::default(), None);
        assert_eq!(unit.rules.len(), 3);
        assert!(unit
            .rules
            .iter()
            .all(|rule| rule.source_index() == 0 && rule.unit_id() == 2));
    }
}
