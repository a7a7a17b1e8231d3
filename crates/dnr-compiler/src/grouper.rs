//! Rule grouping by conversion strategy

use dnr_core::types::NetworkRuleOption;

use crate::network_rule::NetworkRule;

/// Conversion strategy of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RulesGroup {
    Regular,
    RemoveParam,
    RemoveHeader,
    Csp,
    BadFilter,
}

impl RulesGroup {
    pub const ALL: [RulesGroup; 5] = [
        Self::Regular,
        Self::RemoveParam,
        Self::RemoveHeader,
        Self::Csp,
        Self::BadFilter,
    ];
}

/// First matching modifier wins, in this order.
const PRECEDENCE: [(NetworkRuleOption, RulesGroup); 4] = [
    (NetworkRuleOption::REMOVEPARAM, RulesGroup::RemoveParam),
    (NetworkRuleOption::REMOVEHEADER, RulesGroup::RemoveHeader),
    (NetworkRuleOption::CSP, RulesGroup::Csp),
    (NetworkRuleOption::BADFILTER, RulesGroup::BadFilter),
];

pub fn group_of(rule: &NetworkRule) -> RulesGroup {
    PRECEDENCE
        .iter()
        .find(|(option, _)| rule.is_option_enabled(*option))
        .map_or(RulesGroup::Regular, |(_, group)| *group)
}

/// One unit's rules partitioned by group. Input order is kept within a group.
#[derive(Debug, Clone, Default)]
pub struct GroupedRules {
    regular: Vec<NetworkRule>,
    remove_param: Vec<NetworkRule>,
    remove_header: Vec<NetworkRule>,
    csp: Vec<NetworkRule>,
    bad_filter: Vec<NetworkRule>,
}

impl GroupedRules {
    pub fn new(rules: impl IntoIterator<Item = NetworkRule>) -> Self {
        let mut grouped = Self::default();
        for rule in rules {
            let group = group_of(&rule);
            grouped.group_mut(group).push(rule);
        }
        grouped
    }

    pub fn group(&self, group: RulesGroup) -> &[NetworkRule] {
        match group {
            RulesGroup::Regular => &self.regular,
            RulesGroup::RemoveParam => &self.remove_param,
            RulesGroup::RemoveHeader => &self.remove_header,
            RulesGroup::Csp => &self.csp,
            RulesGroup::BadFilter => &self.bad_filter,
        }
    }

    fn group_mut(&mut self, group: RulesGroup) -> &mut Vec<NetworkRule> {
        match group {
            RulesGroup::Regular => &mut self.regular,
            RulesGroup::RemoveParam => &mut self.remove_param,
            RulesGroup::RemoveHeader => &mut self.remove_header,
            RulesGroup::Csp => &mut self.csp,
            RulesGroup::BadFilter => &mut self.bad_filter,
        }
    }

    /// Drop every rule some negation rule cancels, then clear the badfilter
    /// group. Returns how many rules were dropped.
    pub fn apply_negations(&mut self, negations: &[NetworkRule]) -> usize {
        let mut dropped = 0;

        for group in [
            RulesGroup::Regular,
            RulesGroup::RemoveParam,
            RulesGroup::RemoveHeader,
            RulesGroup::Csp,
        ] {
            let rules = self.group_mut(group);
            let before = rules.len();
            rules.retain(|rule| !negations.iter().any(|negation| negation.negates(rule)));
            dropped += before - rules.len();
        }

        self.bad_filter.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        RulesGroup::ALL.iter().map(|group| self.group(*group).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
