//! Core type definitions shared by the compiler and its output
//!
//! The enumerations here serialize to the exact string values the browser's
//! declarative rule engine expects.

use serde::{Deserialize, Serialize};

// =============================================================================
// Resource Types
// =============================================================================

/// Resource type of a request, as understood by the declarative engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
    SubFrame,
    Stylesheet,
    Script,
    Image,
    Font,
    Object,
    Xmlhttprequest,
    Ping,
    CspReport,
    Media,
    Websocket,
    Webtransport,
    Webbundle,
    Other,
}

impl ResourceType {
    /// Every resource type, in declaration order.
    pub const ALL: [ResourceType; 15] = [
        Self::MainFrame,
        Self::SubFrame,
        Self::Stylesheet,
        Self::Script,
        Self::Image,
        Self::Font,
        Self::Object,
        Self::Xmlhttprequest,
        Self::Ping,
        Self::CspReport,
        Self::Media,
        Self::Websocket,
        Self::Webtransport,
        Self::Webbundle,
        Self::Other,
    ];

    /// Document types (main_frame + sub_frame)
    pub const DOCUMENT: [ResourceType; 2] = [Self::MainFrame, Self::SubFrame];

    /// Parse a filter-syntax content type modifier name.
    pub fn from_modifier(name: &str) -> Option<Self> {
        match name {
            "document" => Some(Self::MainFrame),
            "subdocument" => Some(Self::SubFrame),
            "stylesheet" => Some(Self::Stylesheet),
            "script" => Some(Self::Script),
            "image" => Some(Self::Image),
            "font" => Some(Self::Font),
            "object" => Some(Self::Object),
            "xmlhttprequest" => Some(Self::Xmlhttprequest),
            "ping" => Some(Self::Ping),
            "csp_report" => Some(Self::CspReport),
            "media" => Some(Self::Media),
            "websocket" => Some(Self::Websocket),
            "webtransport" => Some(Self::Webtransport),
            "webbundle" => Some(Self::Webbundle),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Filter-syntax name of this type.
    pub fn modifier_name(self) -> &'static str {
        match self {
            Self::MainFrame => "document",
            Self::SubFrame => "subdocument",
            Self::Stylesheet => "stylesheet",
            Self::Script => "script",
            Self::Image => "image",
            Self::Font => "font",
            Self::Object => "object",
            Self::Xmlhttprequest => "xmlhttprequest",
            Self::Ping => "ping",
            Self::CspReport => "csp_report",
            Self::Media => "media",
            Self::Websocket => "websocket",
            Self::Webtransport => "webtransport",
            Self::Webbundle => "webbundle",
            Self::Other => "other",
        }
    }
}

// =============================================================================
// Request Methods
// =============================================================================

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestMethod {
    Connect,
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    Other,
}

impl RequestMethod {
    /// Parse a `$method` value, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "connect" => Some(Self::Connect),
            "delete" => Some(Self::Delete),
            "get" => Some(Self::Get),
            "head" => Some(Self::Head),
            "options" => Some(Self::Options),
            "patch" => Some(Self::Patch),
            "post" => Some(Self::Post),
            "put" => Some(Self::Put),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Delete => "delete",
            Self::Get => "get",
            Self::Head => "head",
            Self::Options => "options",
            Self::Patch => "patch",
            Self::Post => "post",
            Self::Put => "put",
            Self::Other => "other",
        }
    }
}

// =============================================================================
// Domain Type
// =============================================================================

/// Party relation between the request and its initiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DomainType {
    FirstParty,
    ThirdParty,
}

// =============================================================================
// Network Rule Options (bit flags for enabled/disabled modifiers)
// =============================================================================

bitflags::bitflags! {
    /// Modifiers a network rule can carry. A rule keeps one set for
    /// enabled modifiers and one for explicitly disabled (`~name`) ones.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NetworkRuleOption: u32 {
        const THIRD_PARTY = 1 << 0;
        const MATCH_CASE = 1 << 1;
        const IMPORTANT = 1 << 2;
        const BADFILTER = 1 << 3;
        const POPUP = 1 << 4;

        // Allowlist-only modifiers
        const ELEMHIDE = 1 << 5;
        const GENERICHIDE = 1 << 6;
        const SPECIFICHIDE = 1 << 7;
        const GENERICBLOCK = 1 << 8;
        const JSINJECT = 1 << 9;
        const URLBLOCK = 1 << 10;
        const CONTENT = 1 << 11;

        // Modifiers with an advanced value
        const REDIRECT = 1 << 12;
        const REMOVEPARAM = 1 << 13;
        const REMOVEHEADER = 1 << 14;
        const CSP = 1 << 15;
        const PERMISSIONS = 1 << 16;
        const COOKIE = 1 << 17;

        // Modifiers with a list value
        const TO = 1 << 18;
        const METHOD = 1 << 19;
        const DENYALLOW = 1 << 20;

        // Recognized but not expressible as a declarative rule
        const REPLACE = 1 << 21;
        const HLS = 1 << 22;
        const JSONPRUNE = 1 << 23;
        const XMLPRUNE = 1 << 24;
        const NETWORK = 1 << 25;
        const APP = 1 << 26;
        const STEALTH = 1 << 27;
        const HEADER = 1 << 28;
        const URLTRANSFORM = 1 << 29;
        const REDIRECT_RULE = 1 << 30;
        const REFERRERPOLICY = 1 << 31;

        /// Everything a `@@...$document` exception turns off
        const DOCUMENT = Self::ELEMHIDE.bits()
            | Self::CONTENT.bits()
            | Self::URLBLOCK.bits()
            | Self::JSINJECT.bits();

        const UNSUPPORTED = Self::REPLACE.bits()
            | Self::HLS.bits()
            | Self::JSONPRUNE.bits()
            | Self::XMLPRUNE.bits()
            | Self::NETWORK.bits()
            | Self::APP.bits()
            | Self::STEALTH.bits()
            | Self::HEADER.bits()
            | Self::URLTRANSFORM.bits()
            | Self::REDIRECT_RULE.bits()
            | Self::REFERRERPOLICY.bits();

        /// Modifiers that cannot be combined with an exception rule
        const BLOCKING_ONLY = Self::REDIRECT.bits()
            | Self::REMOVEPARAM.bits()
            | Self::REMOVEHEADER.bits()
            | Self::CSP.bits()
            | Self::PERMISSIONS.bits()
            | Self::COOKIE.bits();
    }
}

/// Canonical modifier name of every single-bit option.
const OPTION_NAMES: &[(&str, NetworkRuleOption)] = &[
    ("third-party", NetworkRuleOption::THIRD_PARTY),
    ("match-case", NetworkRuleOption::MATCH_CASE),
    ("important", NetworkRuleOption::IMPORTANT),
    ("badfilter", NetworkRuleOption::BADFILTER),
    ("popup", NetworkRuleOption::POPUP),
    ("elemhide", NetworkRuleOption::ELEMHIDE),
    ("generichide", NetworkRuleOption::GENERICHIDE),
    ("specifichide", NetworkRuleOption::SPECIFICHIDE),
    ("genericblock", NetworkRuleOption::GENERICBLOCK),
    ("jsinject", NetworkRuleOption::JSINJECT),
    ("urlblock", NetworkRuleOption::URLBLOCK),
    ("content", NetworkRuleOption::CONTENT),
    ("redirect", NetworkRuleOption::REDIRECT),
    ("removeparam", NetworkRuleOption::REMOVEPARAM),
    ("removeheader", NetworkRuleOption::REMOVEHEADER),
    ("csp", NetworkRuleOption::CSP),
    ("permissions", NetworkRuleOption::PERMISSIONS),
    ("cookie", NetworkRuleOption::COOKIE),
    ("to", NetworkRuleOption::TO),
    ("method", NetworkRuleOption::METHOD),
    ("denyallow", NetworkRuleOption::DENYALLOW),
    ("replace", NetworkRuleOption::REPLACE),
    ("hls", NetworkRuleOption::HLS),
    ("jsonprune", NetworkRuleOption::JSONPRUNE),
    ("xmlprune", NetworkRuleOption::XMLPRUNE),
    ("network", NetworkRuleOption::NETWORK),
    ("app", NetworkRuleOption::APP),
    ("stealth", NetworkRuleOption::STEALTH),
    ("header", NetworkRuleOption::HEADER),
    ("urltransform", NetworkRuleOption::URLTRANSFORM),
    ("redirect-rule", NetworkRuleOption::REDIRECT_RULE),
    ("referrerpolicy", NetworkRuleOption::REFERRERPOLICY),
];

impl NetworkRuleOption {
    /// Resolve a canonical modifier name (aliases already applied).
    pub fn from_modifier(name: &str) -> Option<Self> {
        OPTION_NAMES
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, option)| *option)
    }

    /// Modifier names of every option in the set, in bit order.
    pub fn modifier_names(self) -> impl Iterator<Item = &'static str> {
        OPTION_NAMES
            .iter()
            .filter(move |(_, option)| self.contains(*option))
            .map(|(name, _)| *name)
    }
}
