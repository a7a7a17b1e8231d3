//! Network rule to declarative rule conversion
//!
//! One [`NetworkRule`] becomes one [`DeclarativeRule`]: the action comes from
//! the rule's modifiers, the condition from its pattern and facet lists.
//! A finished record is checked against what the engine accepts before it is
//! handed back.

use percent_encoding::percent_decode_str;

use dnr_core::types::{DomainType, NetworkRuleOption, ResourceType};
use dnr_core::url::{has_wildcard, is_regex_pattern, strip_regex_delimiters, to_ascii};
use dnr_core::{
    DeclarativeRule, ModifyHeaderInfo, QueryTransform, Redirect, RuleAction, RuleCondition,
    UrlTransform,
};

use crate::error::ConversionError;
use crate::ids::IdAllocator;
use crate::network_rule::NetworkRule;
use crate::options::ConverterOptions;
use crate::redirects::{resource_path, RedirectResolver};
use crate::regex::RegexValidator;

const CSP_HEADER: &str = "Content-Security-Policy";
const PERMISSIONS_HEADER: &str = "Permissions-Policy";
const COOKIE_HEADER: &str = "Cookie";
const SET_COOKIE_HEADER: &str = "Set-Cookie";

/// `||*` cannot be expressed; `*` matches the same URLs.
const DOMAIN_ANCHOR_WILDCARD: &str = "||*";

/// Modifiers that build a non-blocking action, tried in this order.
const ACTION_MODIFIERS: [NetworkRuleOption; 6] = [
    NetworkRuleOption::REDIRECT,
    NetworkRuleOption::REMOVEPARAM,
    NetworkRuleOption::REMOVEHEADER,
    NetworkRuleOption::CSP,
    NetworkRuleOption::PERMISSIONS,
    NetworkRuleOption::COOKIE,
];

/// Without explicit types these modifiers apply to every request.
const ALL_TYPES_MODIFIERS: NetworkRuleOption = NetworkRuleOption::REMOVEHEADER
    .union(NetworkRuleOption::CSP)
    .union(NetworkRuleOption::COOKIE)
    .union(NetworkRuleOption::TO)
    .union(NetworkRuleOption::METHOD);

/// Without explicit types these modifiers apply to documents only.
const DOCUMENT_TYPES_MODIFIERS: NetworkRuleOption =
    NetworkRuleOption::REMOVEPARAM.union(NetworkRuleOption::PERMISSIONS);

/// Collaborators shared by every rule conversion of a run.
pub struct ConversionContext<'a> {
    pub options: &'a ConverterOptions,
    pub ids: &'a IdAllocator,
    pub regex_validator: &'a dyn RegexValidator,
    pub redirects: &'a dyn RedirectResolver,
}

/// Convert one rule. Failures reject this rule only.
pub fn convert_rule(
    ctx: &ConversionContext<'_>,
    rule: &NetworkRule,
) -> Result<DeclarativeRule, ConversionError> {
    check_supported(rule)?;

    let action = derive_action(ctx, rule)?;
    let condition = derive_condition(rule);

    let declarative = DeclarativeRule {
        id: ctx.ids.allocate(rule.text()),
        priority: rule.priority(),
        action,
        condition,
    };

    check_rule_application(ctx, rule, declarative)
}

fn check_supported(rule: &NetworkRule) -> Result<(), ConversionError> {
    let unsupported = |modifier: &str| ConversionError::UnsupportedModifier {
        rule: Box::new(rule.clone()),
        modifier: modifier.to_string(),
    };

    let enabled = rule.enabled_options();
    if let Some(name) = enabled
        .intersection(NetworkRuleOption::UNSUPPORTED)
        .modifier_names()
        .next()
    {
        return Err(unsupported(name));
    }

    if rule.is_exception() {
        if let Some(name) = enabled
            .intersection(NetworkRuleOption::BLOCKING_ONLY)
            .modifier_names()
            .next()
        {
            return Err(unsupported(name));
        }
    }

    // Removing a single named cookie needs response inspection
    if enabled.contains(NetworkRuleOption::COOKIE)
        && rule.advanced_value().is_some_and(|value| !value.is_empty())
    {
        return Err(unsupported("cookie"));
    }

    if enabled.contains(NetworkRuleOption::REMOVEPARAM)
        && rule.advanced_value().is_some_and(is_regex_pattern)
    {
        return Err(unsupported("removeparam"));
    }

    Ok(())
}

// =============================================================================
// Action
// =============================================================================

fn derive_action(
    ctx: &ConversionContext<'_>,
    rule: &NetworkRule,
) -> Result<RuleAction, ConversionError> {
    if rule.is_exception() {
        let document_only = rule
            .permitted_resource_types()
            .iter()
            .all(|ty| ResourceType::DOCUMENT.contains(ty));
        return Ok(if rule.is_filtering_disabled() && document_only {
            RuleAction::AllowAllRequests
        } else {
            RuleAction::Allow
        });
    }

    for option in ACTION_MODIFIERS {
        if !rule.is_option_enabled(option) {
            continue;
        }

        let action = if option == NetworkRuleOption::REDIRECT {
            redirect_action(ctx, rule)?
        } else if option == NetworkRuleOption::REMOVEPARAM {
            remove_param_action(rule)?
        } else if option == NetworkRuleOption::REMOVEHEADER {
            remove_header_action(rule)
        } else if option == NetworkRuleOption::CSP {
            append_header_action(rule, CSP_HEADER)
        } else if option == NetworkRuleOption::PERMISSIONS {
            append_header_action(rule, PERMISSIONS_HEADER)
        } else {
            Some(cookie_action())
        };

        if let Some(action) = action {
            return Ok(action);
        }
    }

    Ok(RuleAction::Block)
}

fn redirect_action(
    ctx: &ConversionContext<'_>,
    rule: &NetworkRule,
) -> Result<Option<RuleAction>, ConversionError> {
    let Some(name) = rule.advanced_value().filter(|value| !value.is_empty()) else {
        return Ok(None);
    };

    let resources_path = ctx
        .options
        .resources_path
        .as_deref()
        .filter(|path| !path.is_empty())
        .ok_or_else(|| ConversionError::ResourcesPath {
            rule: Box::new(rule.clone()),
        })?;

    let file = ctx
        .redirects
        .resolve(name)
        .map_err(|err| ConversionError::wrap(rule, err))?;

    Ok(Some(RuleAction::Redirect {
        redirect: Redirect {
            extension_path: Some(resource_path(resources_path, &file)),
            ..Default::default()
        },
    }))
}

fn remove_param_action(rule: &NetworkRule) -> Result<Option<RuleAction>, ConversionError> {
    let transform = match rule.advanced_value() {
        None => return Ok(None),
        Some("") => UrlTransform {
            query: Some(String::new()),
            query_transform: None,
        },
        Some(value) => {
            let param = percent_decode_str(value)
                .decode_utf8()
                .map_err(|err| ConversionError::wrap(rule, err))?;
            UrlTransform {
                query: None,
                query_transform: Some(QueryTransform {
                    remove_params: Some(vec![param.into_owned()]),
                }),
            }
        }
    };

    Ok(Some(RuleAction::Redirect {
        redirect: Redirect {
            transform: Some(transform),
            ..Default::default()
        },
    }))
}

fn remove_header_action(rule: &NetworkRule) -> Option<RuleAction> {
    if let Some(header) = rule.applicable_header_name(true) {
        return Some(RuleAction::ModifyHeaders {
            request_headers: Some(vec![ModifyHeaderInfo::remove(header)]),
            response_headers: None,
        });
    }

    rule.applicable_header_name(false)
        .map(|header| RuleAction::ModifyHeaders {
            request_headers: None,
            response_headers: Some(vec![ModifyHeaderInfo::remove(header)]),
        })
}

fn append_header_action(rule: &NetworkRule, header: &str) -> Option<RuleAction> {
    rule.advanced_value()
        .filter(|value| !value.is_empty())
        .map(|value| RuleAction::ModifyHeaders {
            request_headers: None,
            response_headers: Some(vec![ModifyHeaderInfo::append(header, value)]),
        })
}

fn cookie_action() -> RuleAction {
    RuleAction::ModifyHeaders {
        request_headers: Some(vec![ModifyHeaderInfo::remove(COOKIE_HEADER)]),
        response_headers: Some(vec![ModifyHeaderInfo::remove(SET_COOKIE_HEADER)]),
    }
}

// =============================================================================
// Condition
// =============================================================================

fn derive_condition(rule: &NetworkRule) -> RuleCondition {
    let mut condition = RuleCondition::default();

    let pattern = rule.pattern();
    if is_regex_pattern(pattern) {
        condition.regex_filter = Some(to_ascii(strip_regex_delimiters(pattern)).into_owned());
    } else if !pattern.is_empty() {
        let pattern = match pattern.strip_prefix(DOMAIN_ANCHOR_WILDCARD) {
            Some(rest) => format!("*{rest}"),
            None => pattern.to_string(),
        };
        condition.url_filter = Some(to_ascii(&pattern).into_owned());
    }

    if rule.is_option_enabled(NetworkRuleOption::THIRD_PARTY) {
        condition.domain_type = Some(DomainType::ThirdParty);
    } else if rule.is_option_disabled(NetworkRuleOption::THIRD_PARTY) {
        condition.domain_type = Some(DomainType::FirstParty);
    }

    let initiators: Vec<String> = rule
        .permitted_domains()
        .iter()
        .filter(|domain| !has_wildcard(domain) && !is_regex_pattern(domain))
        .map(|domain| ascii_domain(domain))
        .collect();
    condition.initiator_domains = non_empty(initiators);
    condition.excluded_initiator_domains = non_empty(ascii_domains(rule.restricted_domains()));

    condition.request_domains = non_empty(ascii_domains(rule.permitted_to_domains()));
    condition.excluded_request_domains = if rule.denyallow_domains().is_empty() {
        non_empty(ascii_domains(rule.restricted_to_domains()))
    } else {
        non_empty(ascii_domains(rule.denyallow_domains()))
    };

    let restricted_types = rule.restricted_resource_types();
    let permitted_types = rule.permitted_resource_types();
    if !restricted_types.is_empty() {
        let mut excluded = restricted_types.to_vec();
        if !excluded.contains(&ResourceType::MainFrame) {
            excluded.push(ResourceType::MainFrame);
        }
        condition.excluded_resource_types = Some(excluded);
    } else if !permitted_types.is_empty() {
        condition.resource_types = Some(permitted_types.to_vec());
    }

    if condition.resource_types.is_none() && condition.excluded_resource_types.is_none() {
        let enabled = rule.enabled_options();
        if enabled.intersects(ALL_TYPES_MODIFIERS) {
            condition.resource_types = Some(ResourceType::ALL.to_vec());
        } else if enabled.intersects(DOCUMENT_TYPES_MODIFIERS) {
            condition.resource_types = Some(ResourceType::DOCUMENT.to_vec());
        }
    }

    condition.request_methods = non_empty(rule.permitted_methods().to_vec());
    condition.excluded_request_methods = non_empty(rule.restricted_methods().to_vec());

    if rule.is_option_enabled(NetworkRuleOption::MATCH_CASE) {
        condition.is_url_filter_case_sensitive = Some(true);
    }

    if rule.is_option_enabled(NetworkRuleOption::POPUP) {
        let types = condition.resource_types.get_or_insert_with(Vec::new);
        if !types.contains(&ResourceType::MainFrame) {
            types.push(ResourceType::MainFrame);
        }
    }

    condition
}

fn ascii_domain(domain: &str) -> String {
    to_ascii(domain).into_owned()
}

fn ascii_domains(domains: &[String]) -> Vec<String> {
    domains.iter().map(|domain| ascii_domain(domain)).collect()
}

fn non_empty<T>(values: Vec<T>) -> Option<Vec<T>> {
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Reject records the engine would refuse or that would match more than the
/// source rule did.
pub fn check_rule_application(
    ctx: &ConversionContext<'_>,
    rule: &NetworkRule,
    declarative: DeclarativeRule,
) -> Result<DeclarativeRule, ConversionError> {
    let condition = &declarative.condition;

    if condition
        .resource_types
        .as_ref()
        .is_some_and(|types| types.is_empty())
    {
        return Err(ConversionError::EmptyResources {
            rule: Box::new(rule.clone()),
            declarative_rule: Box::new(declarative),
        });
    }

    // Every permitted domain was a wildcard or regex: dropping them all would widen the rule
    if !rule.permitted_domains().is_empty()
        && condition
            .initiator_domains
            .as_ref()
            .map_or(true, |domains| domains.is_empty())
    {
        return Err(ConversionError::EmptyDomains {
            rule: Box::new(rule.clone()),
            declarative_rule: Box::new(declarative),
        });
    }

    if let Some(regex) = &condition.regex_filter {
        let case_sensitive = condition.is_url_filter_case_sensitive == Some(true);
        if let Err(reason) = ctx.regex_validator.is_supported(regex, case_sensitive) {
            return Err(ConversionError::UnsupportedRegexp {
                rule: Box::new(rule.clone()),
                declarative_rule: Box::new(declarative),
                reason,
            });
        }
    }

    Ok(declarative)
}
