//! DNR Filter List Compiler
//!
//! This crate compiles ABP/uBO/AdGuard network filter rules into the
//! browser's declarative rule format.
//!
//! The pipeline runs scanner → grouper → synthesizer → merger per unit, then
//! the converter applies output caps across all units.

pub mod converter;
pub mod error;
pub mod grouper;
pub mod ids;
pub mod limitations;
pub mod merger;
pub mod network_rule;
pub mod options;
pub mod parser;
pub mod redirects;
pub mod regex;
pub mod scanner;
pub mod synthesizer;

pub use converter::{validate_rule_ids, ConvertedRules, RulesConverter};
pub use error::{
    ConversionError, ConvertError, ConverterOptionsError, LimitationError, SourceMapEntry,
};
pub use grouper::{group_of, GroupedRules, RulesGroup};
pub use ids::IdAllocator;
pub use network_rule::NetworkRule;
pub use options::ConverterOptions;
pub use parser::parse_filter_list;
pub use redirects::{BuiltinRedirects, RedirectResolver, UnknownRedirect};
pub use regex::{Re2RegexValidator, RegexValidator};
pub use scanner::{scan_unit, ScanOptions, ScannedUnit};
