//! Network rule facets
//!
//! A [`NetworkRule`] is the normalized, read-only view of one parsed network
//! rule: its pattern plus everything its modifiers say. Downstream stages only
//! ever read it.

use dnr_core::hash::hash_pattern;
use dnr_core::types::{NetworkRuleOption, RequestMethod, ResourceType};
use dnr_core::DEFAULT_PRIORITY;

use crate::parser::{Modifier, NetworkNode};

const DOMAIN_SEPARATOR: char = '|';
const REQUEST_HEADER_PREFIX: &str = "request:";

/// Headers a `$removeheader` rule may never strip from responses.
const FORBIDDEN_RESPONSE_HEADERS: &[&str] = &[
    "access-control-allow-origin",
    "access-control-allow-credentials",
    "access-control-allow-headers",
    "access-control-allow-methods",
    "access-control-expose-headers",
    "access-control-max-age",
    "access-control-request-headers",
    "access-control-request-method",
    "origin",
    "timing-allow-origin",
    "allow",
    "cross-origin-embedder-policy",
    "cross-origin-opener-policy",
    "cross-origin-resource-policy",
    "content-security-policy",
    "content-security-policy-report-only",
    "expect-ct",
    "feature-policy",
    "origin-isolation",
    "strict-transport-security",
    "upgrade-insecure-requests",
    "x-content-type-options",
    "x-download-options",
    "x-frame-options",
    "x-permitted-cross-domain-policies",
    "x-powered-by",
    "x-xss-protection",
    "public-key-pins",
    "public-key-pins-report-only",
    "sec-websocket-key",
    "sec-websocket-extensions",
    "sec-websocket-accept",
    "sec-websocket-protocol",
    "sec-websocket-version",
    "p3p",
    "sec-fetch-mode",
    "sec-fetch-dest",
    "sec-fetch-site",
    "sec-fetch-user",
    "referrer-policy",
    "content-type",
    "content-length",
    "accept",
    "accept-encoding",
    "host",
    "connection",
    "transfer-encoding",
    "upgrade",
];

/// Headers a `$removeheader=request:` rule may never strip from requests.
const FORBIDDEN_REQUEST_HEADERS: &[&str] = &[
    "access-control-request-headers",
    "access-control-request-method",
    "origin",
    "referer",
    "cookie",
    "content-type",
    "content-length",
    "accept",
    "accept-encoding",
    "host",
    "connection",
    "transfer-encoding",
    "upgrade",
    "sec-fetch-mode",
    "sec-fetch-dest",
    "sec-fetch-site",
    "sec-fetch-user",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveHeader {
    pub name: String,
    pub is_request: bool,
}

/// One normalized input rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRule {
    unit_id: usize,
    source_index: usize,
    line: usize,
    text: String,
    pattern: String,
    exception: bool,
    pattern_hash: u32,
    priority: u32,
    enabled: NetworkRuleOption,
    disabled: NetworkRuleOption,
    advanced_value: Option<String>,
    permitted_domains: Vec<String>,
    restricted_domains: Vec<String>,
    permitted_to_domains: Vec<String>,
    restricted_to_domains: Vec<String>,
    permitted_types: Vec<ResourceType>,
    restricted_types: Vec<ResourceType>,
    permitted_methods: Vec<RequestMethod>,
    restricted_methods: Vec<RequestMethod>,
    denyallow_domains: Vec<String>,
    remove_header: Option<RemoveHeader>,
}

impl NetworkRule {
    /// Build facets from a converted network node.
    ///
    /// `source_index` is the byte offset of the source line in its unit.
    pub fn new(
        node: &NetworkNode,
        unit_id: usize,
        source_index: usize,
        line: usize,
    ) -> Result<Self, String> {
        let mut rule = Self {
            unit_id,
            source_index,
            line,
            text: node.to_string(),
            pattern: node.pattern.clone(),
            exception: node.exception,
            pattern_hash: hash_pattern(&node.pattern),
            priority: DEFAULT_PRIORITY,
            enabled: NetworkRuleOption::empty(),
            disabled: NetworkRuleOption::empty(),
            advanced_value: None,
            permitted_domains: Vec::new(),
            restricted_domains: Vec::new(),
            permitted_to_domains: Vec::new(),
            restricted_to_domains: Vec::new(),
            permitted_types: Vec::new(),
            restricted_types: Vec::new(),
            permitted_methods: Vec::new(),
            restricted_methods: Vec::new(),
            denyallow_domains: Vec::new(),
            remove_header: None,
        };

        for modifier in &node.modifiers {
            rule.apply_modifier(modifier)?;
        }

        Ok(rule)
    }

    fn apply_modifier(&mut self, modifier: &Modifier) -> Result<(), String> {
        let name = modifier.name.as_str();
        let value = modifier.value.as_deref();

        if name == "domain" {
            let (permitted, restricted) = parse_domain_list(require_value(name, value)?)?;
            self.permitted_domains.extend(permitted);
            self.restricted_domains.extend(restricted);
            return Ok(());
        }

        if name == "document" && self.exception && !modifier.negated {
            self.enabled |= NetworkRuleOption::DOCUMENT;
        }

        if let Some(ty) = ResourceType::from_modifier(name) {
            let target = if modifier.negated {
                &mut self.restricted_types
            } else {
                &mut self.permitted_types
            };
            if !target.contains(&ty) {
                target.push(ty);
            }
            return Ok(());
        }

        let option = NetworkRuleOption::from_modifier(name)
            .ok_or_else(|| format!("unknown modifier: {name}"))?;

        if modifier.negated {
            if !negatable(option) {
                return Err(format!("modifier `{name}` cannot be negated"));
            }
            self.disabled |= option;
            return Ok(());
        }
        self.enabled |= option;

        if option == NetworkRuleOption::TO {
            let (permitted, restricted) = parse_domain_list(require_value(name, value)?)?;
            self.permitted_to_domains.extend(permitted);
            self.restricted_to_domains.extend(restricted);
        } else if option == NetworkRuleOption::DENYALLOW {
            let (permitted, restricted) = parse_domain_list(require_value(name, value)?)?;
            if !restricted.is_empty() {
                return Err("`denyallow` does not accept negated domains".to_string());
            }
            if permitted.iter().any(|d| d.contains('*')) {
                return Err("`denyallow` does not accept wildcard domains".to_string());
            }
            self.denyallow_domains.extend(permitted);
        } else if option == NetworkRuleOption::METHOD {
            for raw in require_value(name, value)?.split(DOMAIN_SEPARATOR) {
                let raw = raw.trim();
                let (negated, method) = match raw.strip_prefix('~') {
                    Some(rest) => (true, rest),
                    None => (false, raw),
                };
                let method = RequestMethod::parse(method)
                    .ok_or_else(|| format!("unknown request method: {method}"))?;
                if negated {
                    self.restricted_methods.push(method);
                } else {
                    self.permitted_methods.push(method);
                }
            }
        } else if option == NetworkRuleOption::REMOVEHEADER {
            self.advanced_value = value.map(str::to_string);
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                self.remove_header = Some(parse_remove_header(value)?);
            }
        } else if NetworkRuleOption::BLOCKING_ONLY.contains(option) {
            self.advanced_value = value.map(str::to_string);
        }

        Ok(())
    }

    pub fn unit_id(&self) -> usize {
        self.unit_id
    }

    /// Byte offset of the source line within its unit.
    pub fn source_index(&self) -> usize {
        self.source_index
    }

    pub fn line(&self) -> usize {
        self.line
    }

    /// Canonical rule text.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_exception(&self) -> bool {
        self.exception
    }

    pub fn pattern_hash(&self) -> u32 {
        self.pattern_hash
    }

    // TODO: derive priority from enabled modifiers once the engine-side weighting is settled.
    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn is_option_enabled(&self, option: NetworkRuleOption) -> bool {
        self.enabled.contains(option)
    }

    pub fn is_option_disabled(&self, option: NetworkRuleOption) -> bool {
        self.disabled.contains(option)
    }

    pub fn enabled_options(&self) -> NetworkRuleOption {
        self.enabled
    }

    pub fn advanced_value(&self) -> Option<&str> {
        self.advanced_value.as_deref()
    }

    pub fn permitted_domains(&self) -> &[String] {
        &self.permitted_domains
    }

    pub fn restricted_domains(&self) -> &[String] {
        &self.restricted_domains
    }

    pub fn permitted_to_domains(&self) -> &[String] {
        &self.permitted_to_domains
    }

    pub fn restricted_to_domains(&self) -> &[String] {
        &self.restricted_to_domains
    }

    pub fn denyallow_domains(&self) -> &[String] {
        &self.denyallow_domains
    }

    pub fn permitted_resource_types(&self) -> &[ResourceType] {
        &self.permitted_types
    }

    pub fn restricted_resource_types(&self) -> &[ResourceType] {
        &self.restricted_types
    }

    pub fn permitted_methods(&self) -> &[RequestMethod] {
        &self.permitted_methods
    }

    pub fn restricted_methods(&self) -> &[RequestMethod] {
        &self.restricted_methods
    }

    /// Header this rule removes on the given side, if any.
    pub fn applicable_header_name(&self, is_request: bool) -> Option<&str> {
        self.remove_header
            .as_ref()
            .filter(|header| header.is_request == is_request)
            .map(|header| header.name.as_str())
    }

    /// `@@...$document`: every kind of filtering is off for the page.
    pub fn is_filtering_disabled(&self) -> bool {
        self.enabled.contains(NetworkRuleOption::DOCUMENT)
    }

    /// Whether this badfilter rule cancels `other`.
    pub fn negates(&self, other: &NetworkRule) -> bool {
        if !self.is_option_enabled(NetworkRuleOption::BADFILTER)
            || other.is_option_enabled(NetworkRuleOption::BADFILTER)
        {
            return false;
        }

        self.pattern_hash == other.pattern_hash
            && self.pattern == other.pattern
            && self.exception == other.exception
            && self.enabled.difference(NetworkRuleOption::BADFILTER) == other.enabled
            && self.disabled == other.disabled
            && self.advanced_value == other.advanced_value
            && same_set(&self.permitted_domains, &other.permitted_domains)
            && same_set(&self.restricted_domains, &other.restricted_domains)
            && same_set(&self.permitted_to_domains, &other.permitted_to_domains)
            && same_set(&self.restricted_to_domains, &other.restricted_to_domains)
            && same_set(&self.denyallow_domains, &other.denyallow_domains)
            && same_set(&self.permitted_types, &other.permitted_types)
            && same_set(&self.restricted_types, &other.restricted_types)
            && same_set(&self.permitted_methods, &other.permitted_methods)
            && same_set(&self.restricted_methods, &other.restricted_methods)
    }
}

fn negatable(option: NetworkRuleOption) -> bool {
    NetworkRuleOption::THIRD_PARTY
        .union(NetworkRuleOption::MATCH_CASE)
        .union(NetworkRuleOption::POPUP)
        .contains(option)
}

fn require_value<'a>(name: &str, value: Option<&'a str>) -> Result<&'a str, String> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(format!("modifier `{name}` requires a value")),
    }
}

/// Split a `a.com|~b.com` list into permitted and restricted entries.
fn parse_domain_list(value: &str) -> Result<(Vec<String>, Vec<String>), String> {
    let mut permitted = Vec::new();
    let mut restricted = Vec::new();

    for raw in value.split(DOMAIN_SEPARATOR) {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let (negated, domain) = match raw.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        if domain.is_empty() {
            return Err(format!("empty domain in list: {value}"));
        }

        // Regex entries keep their case
        let domain = if domain.starts_with('/') {
            domain.to_string()
        } else {
            domain.to_lowercase()
        };

        if negated {
            restricted.push(domain);
        } else {
            permitted.push(domain);
        }
    }

    if permitted.is_empty() && restricted.is_empty() {
        return Err(format!("empty domain list: {value}"));
    }

    Ok((permitted, restricted))
}

fn parse_remove_header(value: &str) -> Result<RemoveHeader, String> {
    let (is_request, name) = match value.strip_prefix(REQUEST_HEADER_PREFIX) {
        Some(rest) => (true, rest),
        None => (false, value),
    };

    let name = name.trim().to_ascii_lowercase();
    if name.is_empty() {
        return Err("`removeheader` requires a header name".to_string());
    }

    let forbidden = if is_request {
        FORBIDDEN_REQUEST_HEADERS
    } else {
        FORBIDDEN_RESPONSE_HEADERS
    };
    if forbidden.contains(&name.as_str()) {
        return Err(format!("header `{name}` cannot be removed"));
    }

    Ok(RemoveHeader { name, is_request })
}

fn same_set<T: Ord + Clone>(a: &[T], b: &[T]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    b.sort();
    a == b
}
