//! Message scanning against the mirrored domain set
//!
//! Splits free text into tokens, reduces every token that looks like a URL
//! or a bare host name to its host, and checks the host and its parent
//! domains against the [`DomainSet`].

use crate::config::DetectionOptions;
use crate::domains::DomainSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;
use url::Url;

/// Where a phishing domain was detected from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhishingSource {
    /// Found in the mirrored gateway feed
    Gateway,
    /// Found by following a shortener link (not implemented)
    Shortener,
    /// Found by the aggregate second-opinion API (not implemented)
    AggregateApi,
}

/// Outcome of scanning one message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Whether any phishing domain was found
    pub is_phishing: bool,
    /// Matched domains and where each was found
    pub detected_domains: BTreeMap<String, PhishingSource>,
}

/// Scans text for known phishing domains
#[derive(Debug, Clone)]
pub struct PhishingDetector {
    domains: DomainSet,
    options: DetectionOptions,
}

impl PhishingDetector {
    /// Create a detector reading from `domains`
    pub fn new(domains: DomainSet) -> Self {
        Self {
            domains,
            options: DetectionOptions::default(),
        }
    }

    /// Create a detector, warning about options that have no implementation
    pub fn with_options(domains: DomainSet, options: DetectionOptions) -> Self {
        if options.follow_shorteners {
            warn!("Shortener following is not supported and will be ignored");
        }
        if options.use_second_opinion {
            warn!("Second-opinion scanning is not supported and will be ignored");
        }
        Self { domains, options }
    }

    /// Options this detector was configured with
    pub fn options(&self) -> DetectionOptions {
        self.options
    }

    /// Scan `text` for known phishing domains
    ///
    /// A host matches when it, or any parent domain with at least two labels,
    /// is in the set. The matched set entry is reported, not the full host.
    pub fn detect(&self, text: &str) -> DetectionResult {
        let mut detected_domains = BTreeMap::new();

        for host in text.split_whitespace().filter_map(extract_host) {
            if let Some(hit) = self.match_host(&host) {
                detected_domains.insert(hit, PhishingSource::Gateway);
            }
        }

        DetectionResult {
            is_phishing: !detected_domains.is_empty(),
            detected_domains,
        }
    }

    fn match_host(&self, host: &str) -> Option<String> {
        let mut candidate = host;
        loop {
            if self.domains.contains(candidate) {
                return Some(candidate.to_string());
            }
            let (_, parent) = candidate.split_once('.')?;
            if !parent.contains('.') {
                return None;
            }
            candidate = parent;
        }
    }
}

/// Host of a token, if it looks like a URL or a bare domain
fn extract_host(token: &str) -> Option<String> {
    let token = token.trim_matches(|c: char| {
        matches!(c, '<' | '>' | '(' | ')' | '[' | ']' | '"' | '\'' | ',' | ';' | '!' | '?')
    });
    let token = token.trim_end_matches('.');

    if token.contains("://") {
        let url = Url::parse(token).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        return url.host_str().map(|host| host.trim_end_matches('.').to_string());
    }

    // Bare host, possibly followed by a path: evil.example/login
    let host = token.split(['/', '?', '#']).next()?;
    let host = host.split(':').next()?;
    let looks_like_host = host.contains('.')
        && !host.starts_with('.')
        && !host.ends_with('.')
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');

    looks_like_host.then(|| host.to_ascii_lowercase())
}
