//! Redirect resource names
//!
//! `$redirect=NAME` refers to a resource bundled with the extension. The
//! resolver turns the name into the file that ships under the configured
//! resources path.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown redirect resource `{0}`")]
pub struct UnknownRedirect(pub String);

pub trait RedirectResolver: Send + Sync {
    /// File name (relative to the resources path) for a redirect value.
    fn resolve(&self, name: &str) -> Result<String, UnknownRedirect>;
}

/// (file, accepted names)
const RESOURCES: &[(&str, &[&str])] = &[
    ("noop.js", &["noopjs", "noop.js"]),
    ("noop.css", &["noopcss", "noop.css"]),
    ("noop.html", &["noopframe", "noop.html"]),
    ("noop.txt", &["nooptext", "noop.txt"]),
    ("noop.json", &["noopjson", "noop.json"]),
    ("noop-0.1s.mp3", &["noopmp3-0.1s", "noop-0.1s.mp3"]),
    ("noop-0.5s.mp3", &["noopmp3-0.5s", "noop-0.5s.mp3"]),
    ("noop-1s.mp4", &["noopmp4-1s", "noop-1s.mp4"]),
    ("noop-vast2.xml", &["noopvast-2.0", "noop-vast2.xml"]),
    ("noop-vast3.xml", &["noopvast-3.0", "noop-vast3.xml"]),
    ("noop-vast4.xml", &["noopvast-4.0", "noop-vast4.xml"]),
    ("noop-vmap1.xml", &["noopvmap-1.0", "noop-vmap1.xml"]),
    ("1x1-transparent.gif", &["1x1-transparent.gif", "1x1.gif"]),
    ("2x2-transparent.png", &["2x2-transparent.png", "2x2.png"]),
    ("3x2-transparent.png", &["3x2-transparent.png", "3x2.png"]),
    ("32x32-transparent.png", &["32x32-transparent.png", "32x32.png"]),
    ("click2load.html", &["click2load.html"]),
    ("empty", &["empty"]),
    (
        "google-analytics.js",
        &["google-analytics", "google-analytics_analytics.js", "google-analytics.com/analytics.js"],
    ),
    (
        "google-analytics-ga.js",
        &["google-analytics-ga", "google-analytics_ga.js", "google-analytics.com/ga.js"],
    ),
    (
        "googlesyndication-adsbygoogle.js",
        &[
            "googlesyndication-adsbygoogle",
            "googlesyndication_adsbygoogle.js",
            "googlesyndication.com/adsbygoogle.js",
        ],
    ),
    (
        "googletagservices-gpt.js",
        &["googletagservices-gpt", "googletagservices_gpt.js", "googletagservices.com/gpt.js"],
    ),
    (
        "googletagmanager-gtm.js",
        &["googletagmanager-gtm", "googletagmanager_gtm.js", "googletagmanager.com/gtm.js"],
    ),
    ("scorecardresearch-beacon.js", &["scorecardresearch-beacon", "scorecardresearch_beacon.js"]),
    ("prevent-fab-3.2.0.js", &["prevent-fab-3.2.0", "nofab.js", "fuckadblock.js-3.2.0"]),
    ("prevent-popads-net.js", &["prevent-popads-net", "popads.net.js", "popads.js"]),
    ("noeval.js", &["noeval", "noeval.js", "silent-noeval.js"]),
    ("prebid-ads.js", &["prebid-ads", "prebid-ads.js"]),
];

/// Resolver over the built-in resource table.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinRedirects;

impl RedirectResolver for BuiltinRedirects {
    fn resolve(&self, name: &str) -> Result<String, UnknownRedirect> {
        // `name:priority` is a uBO extension; the priority part is not used here
        let name = name.split(':').next().unwrap_or(name).trim();

        RESOURCES
            .iter()
            .find(|(_, names)| names.contains(&name))
            .map(|(file, _)| (*file).to_string())
            .ok_or_else(|| UnknownRedirect(name.to_string()))
    }
}

/// Join a resources directory and a resolved file name.
pub fn resource_path(resources_path: &str, file: &str) -> String {
    format!("{}/{}", resources_path, file.trim_start_matches('/'))
}
