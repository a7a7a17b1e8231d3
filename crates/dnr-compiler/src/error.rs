//! Error types for conversion
//!
//! Three layers:
//! - [`ConversionError`]: one rule could not be converted; the batch goes on.
//! - [`LimitationError`]: output caps dropped rules; reported, never thrown.
//! - [`ConvertError`]: the whole run is unusable (bad options or a broken
//!   id/source-map invariant).

use std::error::Error as StdError;

use serde::Serialize;

use dnr_core::DeclarativeRule;

use crate::network_rule::NetworkRule;

type BoxedCause = Box<dyn StdError + Send + Sync + 'static>;

/// Links one output rule back to the source line it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMapEntry {
    pub declarative_rule_id: u32,
    pub unit_id: usize,
    /// Byte offset of the source line within its unit
    pub source_index: usize,
}

/// A single rule that did not make it into the output.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("rule `{}` matches no resource types", .rule.text())]
    EmptyResources {
        rule: Box<NetworkRule>,
        declarative_rule: Box<DeclarativeRule>,
    },

    #[error("rule `{}` has no usable initiator domains", .rule.text())]
    EmptyDomains {
        rule: Box<NetworkRule>,
        declarative_rule: Box<DeclarativeRule>,
    },

    #[error("regex of rule `{}` is not supported: {reason}", .rule.text())]
    UnsupportedRegexp {
        rule: Box<NetworkRule>,
        declarative_rule: Box<DeclarativeRule>,
        reason: String,
    },

    #[error("rule `{}` uses unsupported modifier `{modifier}`", .rule.text())]
    UnsupportedModifier {
        rule: Box<NetworkRule>,
        modifier: String,
    },

    #[error("rule `{}` needs a resources path to build its redirect", .rule.text())]
    ResourcesPath { rule: Box<NetworkRule> },

    #[error("unit {unit_id}, line {line}: invalid rule `{text}`: {message}")]
    InvalidRule {
        unit_id: usize,
        line: usize,
        text: String,
        message: String,
    },

    #[error("unit {unit_id}: scanning stopped at line {line}, rule limit reached")]
    MaxScannedRules { unit_id: usize, line: usize },

    #[error("unit {unit_id}, index {source_index}: cannot convert rule `{text}`: {message}")]
    Uncategorized {
        unit_id: usize,
        source_index: usize,
        text: String,
        message: String,
        #[source]
        cause: Option<BoxedCause>,
    },
}

impl ConversionError {
    /// Wrap an unexpected failure while converting `rule`, keeping the cause.
    pub fn wrap<E>(rule: &NetworkRule, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Uncategorized {
            unit_id: rule.unit_id(),
            source_index: rule.source_index(),
            text: rule.text().to_string(),
            message: cause.to_string(),
            cause: Some(Box::new(cause)),
        }
    }

    /// Source rule the error is about, when there is one.
    pub fn rule(&self) -> Option<&NetworkRule> {
        match self {
            Self::EmptyResources { rule, .. }
            | Self::EmptyDomains { rule, .. }
            | Self::UnsupportedRegexp { rule, .. }
            | Self::UnsupportedModifier { rule, .. }
            | Self::ResourcesPath { rule } => Some(&**rule),
            Self::InvalidRule { .. } | Self::MaxScannedRules { .. } | Self::Uncategorized { .. } => {
                None
            }
        }
    }

    pub fn declarative_rule(&self) -> Option<&DeclarativeRule> {
        match self {
            Self::EmptyResources {
                declarative_rule, ..
            }
            | Self::EmptyDomains {
                declarative_rule, ..
            }
            | Self::UnsupportedRegexp {
                declarative_rule, ..
            } => Some(&**declarative_rule),
            _ => None,
        }
    }

    /// Id of the declarative rule this error is bound to.
    pub fn declarative_rule_id(&self) -> Option<u32> {
        self.declarative_rule().map(|rule| rule.id)
    }
}

/// Rejected converter configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConverterOptionsError {
    #[error("maximum number of rules must be greater than zero")]
    ZeroRuleLimit,
    #[error("resources path `{0}` must start with `/` and must not end with `/`")]
    MalformedResourcesPath(String),
}

/// Rules dropped because the output went over a cap.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitationError {
    #[error("{total} rules exceed the limit of {limit}; {} excluded", .excluded.len())]
    TooManyRules {
        excluded: Vec<SourceMapEntry>,
        limit: usize,
        total: usize,
    },

    #[error("{total} unsafe rules exceed the limit of {limit}; {} excluded", .excluded.len())]
    TooManyUnsafeRules {
        excluded: Vec<SourceMapEntry>,
        limit: usize,
        total: usize,
    },

    #[error("{total} regex rules exceed the limit of {limit}; {} excluded", .excluded.len())]
    TooManyRegexpRules {
        excluded: Vec<SourceMapEntry>,
        limit: usize,
        total: usize,
    },
}

impl LimitationError {
    /// Source lines whose rules were dropped.
    pub fn excluded(&self) -> &[SourceMapEntry] {
        match self {
            Self::TooManyRules { excluded, .. }
            | Self::TooManyUnsafeRules { excluded, .. }
            | Self::TooManyRegexpRules { excluded, .. } => excluded,
        }
    }
}

/// Fatal failure of a whole conversion run.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error(transparent)]
    Options(#[from] ConverterOptionsError),

    #[error("declarative rule id {0} is used more than once")]
    DuplicateId(u32),

    #[error("declarative rule id {0} is outside the allowed range")]
    IdOutOfRange(u32),

    #[error("declarative rule {0} has no source map entry")]
    MissingSourceMap(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn wrapping_keeps_the_cause() {
        let node = match crate::parser::parse_line("||ads.example^") {
            crate::parser::NodeKind::Network(node) => node,
            other => panic!("unexpected node {other:?}"),
        };
        let rule = NetworkRule::new(&node, 3, 42, 7).expect("rule");

        let err = ConversionError::wrap(&rule, Boom);
        assert!(err.to_string().contains("unit 3, index 42"));
        let source = err.source().expect("cause should be kept");
        assert_eq!(source.to_string(), "boom");
        assert!(err.rule().is_none());
        assert!(err.declarative_rule_id().is_none());
    }

    #[test]
    fn limitation_reports_excluded_sources() {
        let entry = SourceMapEntry {
            declarative_rule_id: 9,
            unit_id: 0,
            source_index: 12,
        };
        let err = LimitationError::TooManyRules {
            excluded: vec![entry],
            limit: 1,
            total: 2,
        };
        assert_eq!(err.excluded(), [entry]);
        assert_eq!(err.to_string(), "2 rules exceed the limit of 1; 1 excluded");
    }
}
