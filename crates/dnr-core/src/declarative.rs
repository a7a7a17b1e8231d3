//! Declarative rule records
//!
//! These map one-to-one onto the JSON the browser's declarative rule engine
//! loads. Optional fields are omitted from the output when unset.

use serde::{Deserialize, Serialize};

use crate::types::{DomainType, RequestMethod, ResourceType};

/// Id 1 is reserved by the engine; allocated ids start at 2.
pub const MIN_RULE_ID: u32 = 2;
pub const MAX_RULE_ID: u32 = i32::MAX as u32;

/// Priority given to every converted rule until weighting lands.
pub const DEFAULT_PRIORITY: u32 = 1;

/// One compiled output record: a condition plus the action to take on match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeclarativeRule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl DeclarativeRule {
    /// Redirect and header-modifying rules count against the unsafe quota.
    pub fn is_unsafe(&self) -> bool {
        self.action.is_unsafe()
    }

    pub fn is_regex(&self) -> bool {
        self.condition.regex_filter.is_some()
    }
}

// =============================================================================
// Actions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RuleAction {
    Block,
    Allow,
    AllowAllRequests,
    UpgradeScheme,
    Redirect {
        redirect: Redirect,
    },
    ModifyHeaders {
        #[serde(rename = "requestHeaders", default, skip_serializing_if = "Option::is_none")]
        request_headers: Option<Vec<ModifyHeaderInfo>>,
        #[serde(rename = "responseHeaders", default, skip_serializing_if = "Option::is_none")]
        response_headers: Option<Vec<ModifyHeaderInfo>>,
    },
}

impl RuleAction {
    pub fn is_unsafe(&self) -> bool {
        !matches!(
            self,
            Self::Block | Self::Allow | Self::AllowAllRequests | Self::UpgradeScheme
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<UrlTransform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex_substitution: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlTransform {
    /// Replacement query string; `""` drops the whole query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_transform: Option<QueryTransform>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryTransform {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_params: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderOperation {
    Append,
    Set,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModifyHeaderInfo {
    pub header: String,
    pub operation: HeaderOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ModifyHeaderInfo {
    pub fn remove(header: &str) -> Self {
        Self {
            header: header.to_string(),
            operation: HeaderOperation::Remove,
            value: None,
        }
    }

    pub fn append(header: &str, value: &str) -> Self {
        Self {
            header: header.to_string(),
            operation: HeaderOperation::Append,
            value: Some(value.to_string()),
        }
    }
}

// =============================================================================
// Condition
// =============================================================================

/// Match condition. `url_filter` and `regex_filter` are mutually exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_url_filter_case_sensitive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_type: Option<DomainType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiator_domains: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_initiator_domains: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_domains: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_request_domains: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_types: Option<Vec<ResourceType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_resource_types: Option<Vec<ResourceType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_methods: Option<Vec<RequestMethod>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_request_methods: Option<Vec<RequestMethod>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn block_rule_serializes_minimal_shape() {
        let rule = DeclarativeRule {
            id: 2,
            priority: DEFAULT_PRIORITY,
            action: RuleAction::Block,
            condition: RuleCondition {
                url_filter: Some("||example.com^".to_string()),
                ..Default::default()
            },
        };

        let value = serde_json::to_value(&rule).expect("serialize");
        assert_eq!(
            value,
            json!({
                "id": 2,
                "priority": 1,
                "action": { "type": "block" },
                "condition": { "urlFilter": "||example.com^" }
            })
        );
    }

    #[test]
    fn modify_headers_omits_missing_side() {
        let action = RuleAction::ModifyHeaders {
            request_headers: None,
            response_headers: Some(vec![ModifyHeaderInfo::append(
                "Content-Security-Policy",
                "script-src 'self'",
            )]),
        };

        let value = serde_json::to_value(&action).expect("serialize");
        assert_eq!(
            value,
            json!({
                "type": "modifyHeaders",
                "responseHeaders": [{
                    "header": "Content-Security-Policy",
                    "operation": "append",
                    "value": "script-src 'self'"
                }]
            })
        );
    }

    #[test]
    fn redirect_transform_serializes_nested() {
        let action = RuleAction::Redirect {
            redirect: Redirect {
                transform: Some(UrlTransform {
                    query_transform: Some(QueryTransform {
                        remove_params: Some(vec!["utm_source".to_string()]),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
        };

        let value = serde_json::to_value(&action).expect("serialize");
        assert_eq!(
            value,
            json!({
                "type": "redirect",
                "redirect": { "transform": { "queryTransform": { "removeParams": ["utm_source"] } } }
            })
        );
    }

    #[test]
    fn unsafe_actions() {
        assert!(!RuleAction::Block.is_unsafe());
        assert!(!RuleAction::AllowAllRequests.is_unsafe());
        assert!(!RuleAction::UpgradeScheme.is_unsafe());
        assert!(RuleAction::Redirect {
            redirect: Redirect::default()
        }
        .is_unsafe());
        assert!(RuleAction::ModifyHeaders {
            request_headers: None,
            response_headers: None
        }
        .is_unsafe());
    }

    #[test]
    fn action_deserializes_from_engine_json() {
        let action: RuleAction =
            serde_json::from_value(json!({ "type": "allowAllRequests" })).expect("deserialize");
        assert_eq!(action, RuleAction::AllowAllRequests);
    }
}
