//! Tolerant filter list parser
//!
//! Turns raw filter list text into one node per line. Malformed input never
//! fails the parse: it becomes an `Invalid` node carrying a message.
//! The `Display` impl of [`NetworkNode`] is the canonical rule text used
//! for id hashing and diagnostics.

use std::fmt;
use std::net::IpAddr;

use dnr_core::types::{NetworkRuleOption, ResourceType};

const EXCEPTION_MARKER: &str = "@@";
const OPTIONS_DELIMITER: u8 = b'$';
const ESCAPE: u8 = b'\\';

const COSMETIC_MARKERS: &[&str] = &[
    "##", "#@#", "#?#", "#@?#", "#$#", "#@$#", "#$?#", "#@$?#", "#%#", "#@%#", "$$", "$@$",
];

const HOSTS_BOILERPLATE: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "local",
    "broadcasthost",
    "ip6-localhost",
    "ip6-loopback",
    "0.0.0.0",
];

const INLINE_SCRIPT_CSP: &str =
    "script-src 'self' 'unsafe-eval' http: https: data: blob: mediastream: filesystem:";
const INLINE_FONT_CSP: &str =
    "font-src 'self' 'unsafe-eval' http: https: data: blob: mediastream: filesystem:";

/// Result of parsing one filter list.
#[derive(Debug, Clone, Default)]
pub struct FilterList {
    pub children: Vec<RuleNode>,
}

/// One line of a filter list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleNode {
    pub kind: NodeKind,
    /// Zero-based line index
    pub line: usize,
    /// Byte offset of the line start within the list text
    pub start: usize,
    /// Byte offset one past the last byte of the line (terminator excluded)
    pub end: usize,
    pub raw: String,
}

impl RuleNode {
    pub fn category(&self) -> RuleCategory {
        match self.kind {
            NodeKind::Empty => RuleCategory::Empty,
            NodeKind::Comment => RuleCategory::Comment,
            NodeKind::Cosmetic => RuleCategory::Cosmetic,
            NodeKind::Network(_) => RuleCategory::Network,
            NodeKind::Invalid { .. } => RuleCategory::Invalid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCategory {
    Empty,
    Comment,
    Cosmetic,
    Network,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Empty,
    Comment,
    Cosmetic,
    Network(NetworkNode),
    Invalid { message: String },
}

/// A parsed network rule: `[@@]pattern[$modifiers]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkNode {
    pub exception: bool,
    pub pattern: String,
    pub modifiers: Vec<Modifier>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modifier {
    /// Lowercased name as written (aliases not yet resolved)
    pub name: String,
    pub value: Option<String>,
    pub negated: bool,
}

impl Modifier {
    pub fn new(name: &str, value: Option<&str>, negated: bool) -> Self {
        Self {
            name: name.to_string(),
            value: value.map(str::to_string),
            negated,
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            f.write_str("~")?;
        }
        f.write_str(&self.name)?;
        if let Some(value) = &self.value {
            write!(f, "={}", value.replace(',', "\\,"))?;
        }
        Ok(())
    }
}

impl fmt::Display for NetworkNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exception {
            f.write_str(EXCEPTION_MARKER)?;
        }
        f.write_str(&self.pattern)?;
        for (i, modifier) in self.modifiers.iter().enumerate() {
            f.write_str(if i == 0 { "$" } else { "," })?;
            write!(f, "{modifier}")?;
        }
        Ok(())
    }
}

/// Parse a whole filter list. Never fails.
pub fn parse_filter_list(text: &str) -> FilterList {
    let mut children = Vec::new();
    let mut offset = 0usize;

    for (line, chunk) in text.split_inclusive('\n').enumerate() {
        let start = offset;
        offset += chunk.len();

        let raw = chunk.trim_end_matches(['\n', '\r']);
        let end = start + raw.len();

        children.push(RuleNode {
            kind: parse_line(raw),
            line,
            start,
            end,
            raw: raw.to_string(),
        });
    }

    FilterList { children }
}

/// Parse a single rule line.
pub fn parse_line(raw_line: &str) -> NodeKind {
    let line = raw_line.trim();
    if line.is_empty() {
        return NodeKind::Empty;
    }

    if COSMETIC_MARKERS.iter().any(|marker| line.contains(marker)) {
        return NodeKind::Cosmetic;
    }

    if is_comment_line(line) {
        return NodeKind::Comment;
    }

    if let Some(kind) = parse_hosts_line(line) {
        return kind;
    }

    match parse_network_rule(line) {
        Ok(node) => NodeKind::Network(node),
        Err(message) => NodeKind::Invalid { message },
    }
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with('!')
        || (line.starts_with('[') && line.ends_with(']'))
        || line == "#"
        || line.starts_with("# ")
}

/// `0.0.0.0 domain` lines block the domain. Loopback boilerplate entries
/// are treated as comments.
fn parse_hosts_line(line: &str) -> Option<NodeKind> {
    let mut parts = line.split_whitespace();
    let first = parts.next()?;
    let second = parts.next()?;

    if first.parse::<IpAddr>().is_err() {
        return None;
    }

    let domain = second.trim_matches('.').to_ascii_lowercase();
    if domain.is_empty()
        || HOSTS_BOILERPLATE.contains(&domain.as_str())
        || !domain
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
    {
        return Some(NodeKind::Comment);
    }

    Some(NodeKind::Network(NetworkNode {
        exception: false,
        pattern: format!("||{domain}^"),
        modifiers: Vec::new(),
    }))
}

fn parse_network_rule(line: &str) -> Result<NetworkNode, String> {
    let (exception, body) = match line.strip_prefix(EXCEPTION_MARKER) {
        Some(rest) => (true, rest),
        None => (false, line),
    };

    let (pattern, options_text) = split_rule_options(body);
    let modifiers = match options_text {
        Some(text) => parse_modifiers(text)?,
        None => Vec::new(),
    };

    if pattern.is_empty() && modifiers.is_empty() {
        return Err("rule has an empty pattern and no modifiers".to_string());
    }

    Ok(NetworkNode {
        exception,
        pattern: pattern.to_string(),
        modifiers,
    })
}

/// Split `pattern$options` at the last unescaped `$` that is not a regex
/// end anchor (`$/`). For patterns that look like a regex literal, a `$`
/// right after the closing `/` wins, and a `$` before the last `/` never
/// splits.
fn split_rule_options(line: &str) -> (&str, Option<&str>) {
    let bytes = line.as_bytes();
    let regex_end = line.starts_with('/').then(|| line.rfind('/')).flatten();
    let candidates = (0..bytes.len()).rev().filter(|&pos| {
        bytes[pos] == OPTIONS_DELIMITER
            && (pos == 0 || bytes[pos - 1] != ESCAPE)
            && bytes.get(pos + 1) != Some(&b'/')
    });

    let mut fallback = None;
    for pos in candidates {
        if !line.starts_with('/') || (pos > 1 && bytes[pos - 1] == b'/') {
            return (&line[..pos], Some(&line[pos + 1..]));
        }
        if regex_end.map_or(true, |end| pos > end) {
            fallback.get_or_insert(pos);
        }
    }

    match fallback {
        Some(pos) => (&line[..pos], Some(&line[pos + 1..])),
        None => (line, None),
    }
}

fn parse_modifiers(text: &str) -> Result<Vec<Modifier>, String> {
    let mut modifiers = Vec::new();

    for raw in split_unescaped(text, ',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let (negated, rest) = match raw.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        let (name, value) = match rest.split_once('=') {
            Some((name, value)) => (name.trim().to_ascii_lowercase(), Some(value.trim().to_string())),
            None => (rest.trim().to_ascii_lowercase(), None),
        };

        if !is_known_modifier(&name) {
            return Err(format!("unknown modifier: {name}"));
        }

        modifiers.push(Modifier {
            name,
            value,
            negated,
        });
    }

    Ok(modifiers)
}

/// Split on `sep` unless it is preceded by a backslash; `\sep` is unescaped.
fn split_unescaped(text: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;

    for ch in text.chars() {
        if escaped {
            if ch != sep {
                current.push('\\');
            }
            current.push(ch);
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
            continue;
        }
        if ch == sep {
            parts.push(std::mem::take(&mut current));
            continue;
        }
        current.push(ch);
    }

    if escaped {
        current.push('\\');
    }
    parts.push(current);
    parts
}

fn is_known_modifier(name: &str) -> bool {
    matches!(
        name,
        "domain" | "all" | "inline-script" | "inline-font" | "empty" | "mp4"
    ) || {
        let (canonical, _) = canonical_name(name);
        canonical == "domain"
            || ResourceType::from_modifier(canonical).is_some()
            || NetworkRuleOption::from_modifier(canonical).is_some()
    }
}

/// Resolve an alias to its canonical modifier name. The flag tells whether
/// the alias inverts the modifier (`1p` is `~third-party`).
fn canonical_name(name: &str) -> (&str, bool) {
    match name {
        "1p" | "first-party" => ("third-party", true),
        "3p" => ("third-party", false),
        "xhr" => ("xmlhttprequest", false),
        "css" => ("stylesheet", false),
        "frame" => ("subdocument", false),
        "doc" => ("document", false),
        "queryprune" => ("removeparam", false),
        "from" => ("domain", false),
        "ehide" => ("elemhide", false),
        "ghide" => ("generichide", false),
        "shide" => ("specifichide", false),
        "match_case" => ("match-case", false),
        other => (other, false),
    }
}

impl NetworkNode {
    /// Rewrite foreign-syntax aliases into canonical modifiers.
    ///
    /// Most rules convert to exactly one node. `$all` on a blocking rule
    /// fans out into three: a document+popup rule and two CSP rules that
    /// stand in for the inline-script and inline-font restrictions.
    pub fn convert(&self) -> Vec<NetworkNode> {
        let mut base = Vec::with_capacity(self.modifiers.len());
        let mut has_all = false;

        for modifier in &self.modifiers {
            match modifier.name.as_str() {
                "all" => has_all = true,
                "inline-script" => base.push(Modifier::new("csp", Some(INLINE_SCRIPT_CSP), false)),
                "inline-font" => base.push(Modifier::new("csp", Some(INLINE_FONT_CSP), false)),
                "empty" => base.push(Modifier::new("redirect", Some("nooptext"), false)),
                "mp4" => {
                    base.push(Modifier::new("media", None, false));
                    base.push(Modifier::new("redirect", Some("noopmp4-1s"), false));
                }
                name => {
                    let (canonical, inverts) = canonical_name(name);
                    base.push(Modifier {
                        name: canonical.to_string(),
                        value: modifier.value.clone(),
                        negated: modifier.negated != inverts,
                    });
                }
            }
        }

        if !has_all {
            return vec![self.with_modifiers(base)];
        }

        if self.exception {
            base.push(Modifier::new("document", None, false));
            return vec![self.with_modifiers(base)];
        }

        let mut document = base.clone();
        document.push(Modifier::new("document", None, false));
        document.push(Modifier::new("popup", None, false));

        let mut inline_script = base.clone();
        inline_script.push(Modifier::new("csp", Some(INLINE_SCRIPT_CSP), false));

        let mut inline_font = base;
        inline_font.push(Modifier::new("csp", Some(INLINE_FONT_CSP), false));

        vec![
            self.with_modifiers(document),
            self.with_modifiers(inline_script),
            self.with_modifiers(inline_font),
        ]
    }

    fn with_modifiers(&self, modifiers: Vec<Modifier>) -> NetworkNode {
        NetworkNode {
            exception: self.exception,
            pattern: self.pattern.clone(),
            modifiers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(line: &str) -> NetworkNode {
        match parse_line(line) {
            NodeKind::Network(node) => node,
            other => panic!("expected network node for {line:?}, got {other:?}"),
        }
    }

    #[test]
    fn categorizes_lines() {
        let list = parse_filter_list(
            "! comment\n\n[Adblock Plus 2.0]\nexample.org##.ad\n||ads.example^\n||x^$bogus\n",
        );
        let categories: Vec<_> = list.children.iter().map(RuleNode::category).collect();
        assert_eq!(
            categories,
            vec![
                RuleCategory::Comment,
                RuleCategory::Empty,
                RuleCategory::Comment,
                RuleCategory::Cosmetic,
                RuleCategory::Network,
                RuleCategory::Invalid,
            ]
        );
    }

    #[test]
    fn tracks_byte_offsets() {
        let text = "! a\r\n||ads.example^\n";
        let list = parse_filter_list(text);
        let node = &list.children[1];
        assert_eq!(node.line, 1);
        assert_eq!(&text[node.start..node.end], "||ads.example^");
        assert_eq!(node.raw, "||ads.example^");
    }

    #[test]
    fn parses_exception_and_modifiers() {
        let node = network("@@||example.com^$script,~third-party,domain=a.com|~b.com");
        assert!(node.exception);
        assert_eq!(node.pattern, "||example.com^");
        assert_eq!(node.modifiers.len(), 3);
        assert!(node.modifiers[1].negated);
        assert_eq!(node.modifiers[2].value.as_deref(), Some("a.com|~b.com"));
    }

    #[test]
    fn regex_end_anchor_is_not_an_options_delimiter() {
        let node = network("/ads$/");
        assert_eq!(node.pattern, "/ads$/");
        assert!(node.modifiers.is_empty());

        let node = network("/banner\\d+$/$script");
        assert_eq!(node.pattern, "/banner\\d+$/");
        assert_eq!(node.modifiers[0].name, "script");

        let node = network("/ads/banner.js$script");
        assert_eq!(node.pattern, "/ads/banner.js");
        assert_eq!(node.modifiers[0].name, "script");
    }

    #[test]
    fn dollar_inside_regex_body_does_not_split() {
        let node = network("/ad$x/");
        assert_eq!(node.pattern, "/ad$x/");
        assert!(node.modifiers.is_empty());

        let node = network("/ad$x/$image");
        assert_eq!(node.pattern, "/ad$x/");
        assert_eq!(node.modifiers[0].name, "image");
    }

    #[test]
    fn escaped_commas_stay_in_values() {
        let node = network("||example.com^$csp=script-src 'self'\\, 'unsafe-eval'");
        assert_eq!(
            node.modifiers[0].value.as_deref(),
            Some("script-src 'self', 'unsafe-eval'")
        );
        assert_eq!(
            node.to_string(),
            "||example.com^$csp=script-src 'self'\\, 'unsafe-eval'"
        );
    }

    #[test]
    fn hosts_lines_become_domain_rules() {
        let node = network("0.0.0.0 Tracker.Example");
        assert_eq!(node.pattern, "||tracker.example^");
        assert_eq!(parse_line("127.0.0.1 localhost"), NodeKind::Comment);
    }

    #[test]
    fn empty_rule_is_invalid() {
        assert!(matches!(parse_line("@@"), NodeKind::Invalid { .. }));
    }

    #[test]
    fn generator_renders_canonical_text() {
        let node = network("@@||example.com^$~third-party,removeparam=utm_source");
        assert_eq!(node.to_string(), "@@||example.com^$~third-party,removeparam=utm_source");
    }

    #[test]
    fn resolves_aliases() {
        let node = network("||example.com^$1p,xhr,queryprune=ref");
        let converted = node.convert();
        assert_eq!(converted.len(), 1);
        assert_eq!(
            converted[0].to_string(),
            "||example.com^$~third-party,xmlhttprequest,removeparam=ref"
        );
    }

    #[test]
    fn all_modifier_fans_out() {
        let converted = network("||example.com^$all").convert();
        assert_eq!(converted.len(), 3);
        assert_eq!(converted[0].to_string(), "||example.com^$document,popup");
        assert!(converted[1].to_string().contains("csp=script-src"));
        assert!(converted[2].to_string().contains("csp=font-src"));
    }
}
