//! `*`-wildcard key patterns, matched the way Redis `KEYS` matches them.

use regex::Regex;
use storefront_core::{InsightsError, InsightsResult};

#[derive(Debug, Clone)]
pub struct GlobPattern {
    regex: Regex,
}

impl GlobPattern {
    pub fn new(glob: &str) -> InsightsResult<Self> {
        let body = glob
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{body}$"))
            .map_err(|e| InsightsError::Validation(format!("invalid key pattern '{glob}': {e}")))?;
        Ok(Self { regex })
    }

    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }
}
