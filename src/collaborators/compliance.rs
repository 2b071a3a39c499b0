//! Opt-out evaluation from captured HTTP headers.
//!
//! A page is disallowed when it carries
//! - `X-Robots-Tag` with `noai`, `noimageai` or `none` (globally or for our
//!   agent), or
//! - `tdm-reservation: 1` (TDM Reservation Protocol).

use crate::collaborators::ComplianceChecker;
use crate::models::HttpHeaders;

const DISALLOWED_ROBOTS_VALUES: [&str; 3] = ["noai", "noimageai", "none"];

/// Directives written as `name: value`, which are not agent scopes.
const VALUED_DIRECTIVES: [&str; 4] = [
    "unavailable_after",
    "max-snippet",
    "max-image-preview",
    "max-video-preview",
];

/// Header based [`ComplianceChecker`].
#[derive(Debug, Clone, Default)]
pub struct HeaderOptOut {
    /// Agent name matched against `agent: directive` entries, lowercase.
    user_agent: Option<String>,
}

impl HeaderOptOut {
    pub fn for_agent(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: Some(user_agent.into().to_ascii_lowercase()),
        }
    }

    fn robots_tag_allows(&self, value: &str) -> bool {
        // Entries look like "noai", "noindex, nofollow" or "somebot: noai".
        let mut scope: Option<String> = None;
        for raw in value.split(',') {
            let mut directive = raw.trim().to_ascii_lowercase();
            if let Some((agent, rest)) = directive.clone().split_once(':') {
                let agent = agent.trim();
                if !agent.contains(char::is_whitespace) && !VALUED_DIRECTIVES.contains(&agent) {
                    scope = Some(agent.to_string());
                    directive = rest.trim().to_string();
                }
            }

            let applies = match &scope {
                None => true,
                Some(agent) => agent == "*" || self.user_agent.as_deref() == Some(agent.as_str()),
            };
            if applies && DISALLOWED_ROBOTS_VALUES.contains(&directive.as_str()) {
                return false;
            }
        }
        true
    }
}

impl ComplianceChecker for HeaderOptOut {
    fn is_allowed(&self, headers: &HttpHeaders) -> bool {
        if headers
            .get_all("X-Robots-Tag")
            .any(|value| !self.robots_tag_allows(value))
        {
            return false;
        }
        !headers
            .get_all("tdm-reservation")
            .any(|value| value.trim() == "1")
    }
}
