use std::collections::HashSet;

use regex::{Regex, RegexBuilder};
use tracing::warn;

use leadsignal_common::{Platform, PriorityClass, SignalAction, SignalDefinition};

/// Compiled-size ceiling for tenant-supplied regexes. Definitions are data,
/// not code, so a pathological pattern must fail closed.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// A definition that matched the cleaned text, before scoring.
#[derive(Debug, Clone)]
pub struct CandidateMatch {
    pub definition_id: String,
    pub label: String,
    pub priority_class: PriorityClass,
    pub score_contribution: i32,
    pub action: SignalAction,
    /// Distinct keywords that matched. Zero when only the regex hit.
    pub matched_keywords: u32,
    /// Byte offset of the earliest match in the cleaned text.
    pub first_match_offset: usize,
}

struct CompiledDefinition {
    definition: SignalDefinition,
    keywords: Vec<Regex>,
    regex: Option<Regex>,
}

/// Scans cleaned text against the active signal definitions. Keywords match
/// as case-insensitive substrings; the optional regex is compiled once with
/// a size limit and disabled (keyword matching kept) if it fails.
pub struct SignalDetector {
    definitions: Vec<CompiledDefinition>,
}

impl SignalDetector {
    pub fn new(definitions: Vec<SignalDefinition>) -> Self {
        let compiled = definitions
            .into_iter()
            .map(|definition| {
                let keywords = definition
                    .keywords
                    .iter()
                    .filter(|kw| !kw.trim().is_empty())
                    .map(|kw| keyword_regex(kw))
                    .collect();
                let regex = definition.regex_pattern.as_deref().and_then(|pattern| {
                    match compile_definition_regex(pattern) {
                        Ok(re) => Some(re),
                        Err(e) => {
                            warn!(
                                definition_id = definition.id.as_str(),
                                pattern,
                                error = %e,
                                "Definition regex failed to compile, falling back to keywords only"
                            );
                            None
                        }
                    }
                });
                CompiledDefinition {
                    definition,
                    keywords,
                    regex,
                }
            })
            .collect();
        Self {
            definitions: compiled,
        }
    }

    pub fn definition_count(&self) -> usize {
        self.definitions.len()
    }

    /// Run every applicable definition against the cleaned text. A definition
    /// is a candidate when at least one keyword or its regex matches.
    pub fn detect(&self, text: &str, platform: Platform) -> Vec<CandidateMatch> {
        let mut candidates = Vec::new();
        for compiled in &self.definitions {
            let def = &compiled.definition;
            if let Some(filter) = def.platform_filter {
                if filter != platform {
                    continue;
                }
            }

            let mut matched_keywords = 0u32;
            let mut first_offset: Option<usize> = None;
            for keyword in &compiled.keywords {
                if let Some(m) = keyword.find(text) {
                    matched_keywords += 1;
                    first_offset = Some(match first_offset {
                        Some(o) => o.min(m.start()),
                        None => m.start(),
                    });
                }
            }

            let mut regex_matched = false;
            if let Some(re) = &compiled.regex {
                if let Some(m) = re.find(text) {
                    regex_matched = true;
                    first_offset = Some(match first_offset {
                        Some(o) => o.min(m.start()),
                        None => m.start(),
                    });
                }
            }

            if matched_keywords == 0 && !regex_matched {
                continue;
            }

            candidates.push(CandidateMatch {
                definition_id: def.id.clone(),
                label: def.label.clone(),
                priority_class: def.priority_class,
                score_contribution: def.score_contribution,
                action: def.action,
                matched_keywords,
                first_match_offset: first_offset.unwrap_or(0),
            });
        }
        candidates
    }
}

fn keyword_regex(keyword: &str) -> Regex {
    // Escaped literal, so this can only fail on pathological length.
    RegexBuilder::new(&regex::escape(keyword.trim()))
        .case_insensitive(true)
        .build()
        .unwrap_or_else(|_| Regex::new(r"\z.\A").unwrap())
}

fn compile_definition_regex(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
}

/// Pre-flight checks on a definition set. Returns human-readable findings;
/// an empty vec means the set is clean. Nothing here is fatal; detection
/// degrades per definition at compile time regardless.
pub fn lint_definitions(definitions: &[SignalDefinition]) -> Vec<String> {
    let mut findings = Vec::new();
    let mut seen_ids: HashSet<&str> = HashSet::new();

    for def in definitions {
        if !seen_ids.insert(def.id.as_str()) {
            findings.push(format!("duplicate definition id {:?}", def.id));
        }

        let usable_keywords = def.keywords.iter().filter(|kw| !kw.trim().is_empty()).count();
        if def.keywords.len() > usable_keywords {
            findings.push(format!("definition {:?} contains an empty keyword", def.id));
        }

        let regex_ok = match def.regex_pattern.as_deref() {
            Some(pattern) => match compile_definition_regex(pattern) {
                Ok(_) => true,
                Err(e) => {
                    findings.push(format!(
                        "definition {:?} regex does not compile: {e}",
                        def.id
                    ));
                    false
                }
            },
            None => false,
        };

        if usable_keywords == 0 && !regex_ok {
            findings.push(format!(
                "definition {:?} has no usable keywords and no working regex, it can never match",
                def.id
            ));
        }

        if def.action == SignalAction::IncreaseScore && def.score_contribution == 0 {
            findings.push(format!(
                "definition {:?} increases score by nothing",
                def.id
            ));
        }
    }

    findings
}
