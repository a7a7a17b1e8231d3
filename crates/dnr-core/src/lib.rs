//! DNR Converter Core Library
//!
//! Shared types for compiling filter rules into the browser's declarative
//! rule format.
//!
//! # Modules
//!
//! - `declarative`: Output records (condition + action) in the engine's JSON shape
//! - `hash`: Murmur3 hashing for rule ids and pattern comparison
//! - `types`: Resource types, request methods, modifier bit sets
//! - `url`: Regex literal detection and punycode normalization of patterns

pub mod declarative;
pub mod hash;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use declarative::{
    DeclarativeRule, HeaderOperation, ModifyHeaderInfo, QueryTransform, Redirect, RuleAction,
    RuleCondition, UrlTransform, DEFAULT_PRIORITY, MAX_RULE_ID, MIN_RULE_ID,
};
pub use hash::{hash_pattern, hash_text, murmur3_32};
pub use types::{DomainType, NetworkRuleOption, RequestMethod, ResourceType};
