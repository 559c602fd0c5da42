use regex::Regex;
use tracing::warn;

use leadsignal_common::{normalize_whitespace, FluffPattern};

/// Upper bound on removal passes. One pattern's removal can expose a new
/// match for another, so cleaning loops until the text stops changing.
const MAX_PASSES: usize = 8;

struct CompiledFluff {
    regex: Regex,
    description: String,
}

/// Strips boilerplate (nav rows, footers, cookie banners, legal lines) from
/// raw content before signal detection. Patterns are tenant-extendable data;
/// a malformed pattern disables only itself.
pub struct FluffFilter {
    patterns: Vec<CompiledFluff>,
}

impl FluffFilter {
    /// Compile a pattern set. Invalid patterns are skipped with a warning;
    /// one bad tenant pattern must not take down the whole filter.
    pub fn compile(patterns: &[FluffPattern]) -> Self {
        let mut compiled = Vec::with_capacity(patterns.len());
        for p in patterns {
            match Regex::new(&p.pattern) {
                Ok(regex) => compiled.push(CompiledFluff {
                    regex,
                    description: p.description.clone(),
                }),
                Err(e) => {
                    warn!(
                        pattern = p.pattern.as_str(),
                        description = p.description.as_str(),
                        error = %e,
                        "Fluff pattern failed to compile, skipping"
                    );
                }
            }
        }
        Self { patterns: compiled }
    }

    /// The built-in boilerplate set.
    pub fn with_defaults() -> Self {
        Self::compile(&default_fluff_patterns())
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Remove every pattern match, then normalize whitespace. Applied to a
    /// fixpoint so `clean(clean(x)) == clean(x)`.
    pub fn clean(&self, raw: &str) -> String {
        let mut text = normalize_whitespace(raw);
        for _ in 0..MAX_PASSES {
            let mut pass = text.clone();
            for p in &self.patterns {
                pass = p.regex.replace_all(&pass, "").into_owned();
            }
            let pass = normalize_whitespace(&pass);
            if pass == text {
                break;
            }
            text = pass;
        }
        text
    }

    /// Descriptions of the active (successfully compiled) patterns.
    pub fn active_descriptions(&self) -> Vec<&str> {
        self.patterns.iter().map(|p| p.description.as_str()).collect()
    }
}

/// Boilerplate patterns that show up on most company pages even after
/// readability extraction. Tenants extend this set with their own.
pub fn default_fluff_patterns() -> Vec<FluffPattern> {
    let patterns: &[(&str, &str)] = &[
        (
            r"(?im)^.*\b(we use cookies|accept all cookies|cookie (policy|settings|preferences|consent))\b.*$",
            "cookie banners",
        ),
        (
            r"(?im)^.*\ball rights reserved\b.*$",
            "copyright footers",
        ),
        (
            r"(?im)^.*©\s*\d{4}.*$",
            "copyright symbol lines",
        ),
        (
            r"(?im)^\s*(privacy policy|terms of (service|use)|legal notice|imprint)\s*$",
            "legal link lines",
        ),
        (
            r"(?im)^.*\b(subscribe to our newsletter|sign up for (our )?updates)\b.*$",
            "newsletter prompts",
        ),
        (
            r"(?im)^.*\bfollow us on\b.*$",
            "social follow prompts",
        ),
        (
            r"(?im)^\s*[\w &/-]+(\s*\|\s*[\w &/-]+){2,}\s*$",
            "pipe-separated nav rows",
        ),
        (
            r"(?im)^\s*(skip to (main )?content|back to top|menu|navigation)\s*$",
            "navigation chrome",
        ),
    ];

    patterns
        .iter()
        .map(|(pattern, description)| FluffPattern {
            pattern: pattern.to_string(),
            description: description.to_string(),
        })
        .collect()
}
