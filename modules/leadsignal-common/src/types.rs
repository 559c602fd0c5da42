use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Platform ---

/// Where a target's content lives. Definitions can restrict themselves to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Website,
    Social,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Website => write!(f, "website"),
            Platform::Social => write!(f, "social"),
        }
    }
}

impl Platform {
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "social" => Self::Social,
            _ => Self::Website,
        }
    }

    /// Infer the platform from a URL based on known social hosts.
    pub fn from_url(url: &str) -> Self {
        const SOCIAL_HOSTS: &[&str] = &[
            "instagram.com",
            "facebook.com",
            "twitter.com",
            "x.com",
            "linkedin.com",
            "tiktok.com",
            "youtube.com",
            "reddit.com",
            "threads.net",
            "bsky.app",
        ];
        if SOCIAL_HOSTS.iter().any(|h| url.contains(h)) {
            Self::Social
        } else {
            Self::Website
        }
    }
}

// --- Signal definitions (tenant-supplied, read-only here) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    Critical,
    High,
    Medium,
    Low,
}

impl PriorityClass {
    /// Base confidence a single keyword match earns for this class.
    pub fn base_confidence(&self) -> u8 {
        match self {
            PriorityClass::Critical => 90,
            PriorityClass::High => 75,
            PriorityClass::Medium => 60,
            PriorityClass::Low => 45,
        }
    }
}

impl std::fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriorityClass::Critical => write!(f, "critical"),
            PriorityClass::High => write!(f, "high"),
            PriorityClass::Medium => write!(f, "medium"),
            PriorityClass::Low => write!(f, "low"),
        }
    }
}

/// What the downstream workflow should do with a detected signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    IncreaseScore,
    FlagForReview,
    TriggerDownstream,
}

impl std::fmt::Display for SignalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalAction::IncreaseScore => write!(f, "increase_score"),
            SignalAction::FlagForReview => write!(f, "flag_for_review"),
            SignalAction::TriggerDownstream => write!(f, "trigger_downstream"),
        }
    }
}

impl SignalAction {
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "flag_for_review" => Self::FlagForReview,
            "trigger_downstream" => Self::TriggerDownstream,
            _ => Self::IncreaseScore,
        }
    }
}

/// A tenant-supplied keyword/regex template describing one signal worth
/// detecting. Treated as immutable input for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalDefinition {
    /// Tenant-scoped slug, e.g. "actively-hiring".
    pub id: String,
    pub label: String,
    /// Case-insensitive; set semantics (duplicates are ignored).
    pub keywords: Vec<String>,
    #[serde(default)]
    pub regex_pattern: Option<String>,
    pub priority_class: PriorityClass,
    /// When set, the definition only applies to content from that platform.
    #[serde(default)]
    pub platform_filter: Option<Platform>,
    pub score_contribution: i32,
    pub action: SignalAction,
}

/// A boilerplate-removal pattern applied before signal detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FluffPattern {
    pub pattern: String,
    pub description: String,
}

// --- Raw scrapes (temporary tier) ---

/// One cached fetch result. Rows live in the expiring tier: created on cache
/// miss, read-only afterwards, removed only by the retention sweeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawScrape {
    pub id: Uuid,
    /// Normalized URL this content was fetched from.
    pub target_url: String,
    /// SHA-256 hex of the normalized content; dedup key together with the URL.
    pub content_hash: String,
    pub raw_content: String,
    pub platform: Platform,
    pub fetched_at: DateTime<Utc>,
    /// Set once at creation (`fetched_at + ttl`), never extended.
    pub expires_at: DateTime<Utc>,
}

impl RawScrape {
    /// Expired at the boundary: an entry whose expiry equals `now` is dead.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// --- Extracted signals (permanent tier) ---

/// A detected, scored, evidence-backed indicator. Small and durable: the raw
/// content it came from is disposable, referenced only weakly by scrape id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedSignal {
    pub id: Uuid,
    pub target_id: Uuid,
    pub definition_id: String,
    pub label: String,
    /// 45..=99; base by priority class plus per-keyword boost.
    pub confidence: u8,
    /// Bounded context window around the first match. Never the full content.
    pub evidence_snippet: String,
    pub score_contribution: i32,
    pub action: SignalAction,
    /// Weak reference: the scrape may be reaped while this signal lives on.
    pub source_scrape_id: Uuid,
    pub detected_at: DateTime<Utc>,
}

// --- Distillation results ---

/// Raw-versus-distilled size accounting for one scrape.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StorageReduction {
    pub raw_bytes: u64,
    pub signal_bytes: u64,
    pub percent: f64,
}

impl StorageReduction {
    pub fn from_sizes(raw_bytes: u64, signal_bytes: u64) -> Self {
        let percent = if raw_bytes == 0 {
            0.0
        } else {
            ((raw_bytes.saturating_sub(signal_bytes)) as f64 / raw_bytes as f64) * 100.0
        };
        Self {
            raw_bytes,
            signal_bytes,
            percent,
        }
    }
}

/// What one pass of the distillation pipeline produced. Transient: returned
/// to the caller, never persisted as its own record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistillationResult {
    pub signals: Vec<ExtractedSignal>,
    pub scrape_id: Uuid,
    pub is_new_scrape: bool,
    pub reduction: StorageReduction,
}

// --- External interfaces ---

/// One entity eligible for research, supplied by the CRM's target feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchTarget {
    pub target_id: Uuid,
    pub url: String,
    #[serde(default)]
    pub platform_hint: Option<Platform>,
}

/// Emitted whenever a target's aggregated score changes value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreChangeEvent {
    pub target_id: Uuid,
    pub previous_score: u32,
    pub new_score: u32,
    pub triggering_signal_ids: Vec<Uuid>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnomalyKind {
    /// Entry count stayed above threshold after a sweep; expiry isn't firing.
    CacheNotShrinking,
    /// Average entry size above threshold; non-text content is being cached.
    OversizedEntries,
    /// Entries older than twice the TTL survived, confirming expiry failure.
    StaleEntries,
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnomalyKind::CacheNotShrinking => write!(f, "cache-not-shrinking"),
            AnomalyKind::OversizedEntries => write!(f, "oversized-entries"),
            AnomalyKind::StaleEntries => write!(f, "stale-entries"),
        }
    }
}

/// Operational alert from the retention sweeper. Advisory, never fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyAlert {
    pub kind: AnomalyKind,
    pub observed: u64,
    pub threshold: u64,
    pub timestamp: DateTime<Utc>,
}
