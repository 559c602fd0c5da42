use serde::Serialize;

/// Counters for one research run, logged as a banner at the end and embedded
/// in the saved run log.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunStats {
    pub targets_selected: u32,
    pub targets_completed: u32,
    pub targets_failed: u32,
    pub targets_deferred: u32,
    pub cache_hits: u32,
    pub cache_misses: u32,
    pub jobs_timed_out: u32,
    pub signals_detected: u32,
    pub signals_stored: u32,
    pub score_events: u32,
    pub bytes_raw: u64,
    pub bytes_distilled: u64,
}

impl RunStats {
    /// Raw-versus-distilled storage saving across the whole run.
    pub fn reduction_percent(&self) -> f64 {
        if self.bytes_raw == 0 {
            return 0.0;
        }
        (self.bytes_raw.saturating_sub(self.bytes_distilled)) as f64 / self.bytes_raw as f64
            * 100.0
    }
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Research Run Complete ===")?;
        writeln!(f, "Targets selected:  {}", self.targets_selected)?;
        writeln!(f, "Targets completed: {}", self.targets_completed)?;
        writeln!(
            f,
            "Targets failed:    {} ({} timed out)",
            self.targets_failed, self.jobs_timed_out
        )?;
        writeln!(f, "Targets deferred:  {}", self.targets_deferred)?;
        writeln!(f, "Cache hits:        {}", self.cache_hits)?;
        writeln!(f, "Cache misses:      {}", self.cache_misses)?;
        writeln!(f, "Signals detected:  {}", self.signals_detected)?;
        writeln!(f, "Signals stored:    {}", self.signals_stored)?;
        writeln!(f, "Score events:      {}", self.score_events)?;
        writeln!(
            f,
            "Storage:           {} B raw -> {} B distilled ({:.1}% reduction)",
            self.bytes_raw,
            self.bytes_distilled,
            self.reduction_percent()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduction_percent_handles_empty_run() {
        let stats = RunStats::default();
        assert_eq!(stats.reduction_percent(), 0.0);
    }

    #[test]
    fn reduction_percent_from_counters() {
        let stats = RunStats {
            bytes_raw: 10_000,
            bytes_distilled: 500,
            ..Default::default()
        };
        assert!((stats.reduction_percent() - 95.0).abs() < 0.01);
    }

    #[test]
    fn display_banner_includes_counts() {
        let stats = RunStats {
            targets_selected: 5,
            targets_completed: 4,
            targets_failed: 1,
            signals_stored: 3,
            ..Default::default()
        };
        let banner = stats.to_string();
        assert!(banner.contains("=== Research Run Complete ==="));
        assert!(banner.contains("Targets selected:  5"));
        assert!(banner.contains("Signals stored:    3"));
    }
}
