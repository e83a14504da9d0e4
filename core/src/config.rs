use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Three-tier transaction amount thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionThresholds {
    pub low: Decimal,
    pub medium: Decimal,
    pub high: Decimal,
}

impl Default for TransactionThresholds {
    fn default() -> Self {
        Self {
            low: Decimal::new(10_000, 0),
            medium: Decimal::new(50_000, 0),
            high: Decimal::new(100_000, 0),
        }
    }
}

/// Tiers for the frequency factor. Counts are transactions by the same
/// customer inside the trailing window ending at the transaction timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyConfig {
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,
    #[serde(default = "default_elevated_count")]
    pub elevated_count: usize,
    #[serde(default = "default_high_count")]
    pub high_count: usize,
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            elevated_count: default_elevated_count(),
            high_count: default_high_count(),
        }
    }
}

impl FrequencyConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.window_hours)
    }
}

/// Engine configuration. Supplied once at orchestrator construction
/// and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmlConfig {
    #[serde(default = "enabled")]
    pub sanctions_check_enabled: bool,
    #[serde(default = "enabled")]
    pub transaction_monitoring_enabled: bool,
    #[serde(default = "enabled")]
    pub document_verification_enabled: bool,
    #[serde(default = "default_high_risk_countries")]
    pub high_risk_countries: Vec<String>,
    #[serde(default)]
    pub transaction_thresholds: TransactionThresholds,
    /// Scores at or above this go to review.
    #[serde(default = "default_auto_approval_threshold")]
    pub auto_approval_threshold: u8,
    /// Scores at or above this are rejected outright.
    #[serde(default = "default_auto_rejection_threshold")]
    pub auto_rejection_threshold: u8,
    #[serde(default)]
    pub frequency: FrequencyConfig,
}

fn enabled() -> bool {
    true
}

fn default_high_risk_countries() -> Vec<String> {
    vec!["KP".into(), "IR".into(), "SY".into()]
}

fn default_auto_approval_threshold() -> u8 {
    30
}

fn default_auto_rejection_threshold() -> u8 {
    80
}

fn default_window_hours() -> i64 {
    24
}

fn default_elevated_count() -> usize {
    5
}

fn default_high_count() -> usize {
    10
}

impl Default for AmlConfig {
    fn default() -> Self {
        Self {
            sanctions_check_enabled: true,
            transaction_monitoring_enabled: true,
            document_verification_enabled: true,
            high_risk_countries: default_high_risk_countries(),
            transaction_thresholds: TransactionThresholds::default(),
            auto_approval_threshold: default_auto_approval_threshold(),
            auto_rejection_threshold: default_auto_rejection_threshold(),
            frequency: FrequencyConfig::default(),
        }
    }
}

impl AmlConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    /// In tests, use AmlConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: AmlConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let t = &self.transaction_thresholds;
        if !(t.low <= t.medium && t.medium <= t.high) {
            anyhow::bail!(
                "transaction thresholds must be ascending (low {} / medium {} / high {})",
                t.low, t.medium, t.high
            );
        }
        if self.auto_approval_threshold > self.auto_rejection_threshold {
            anyhow::bail!(
                "auto_approval_threshold {} exceeds auto_rejection_threshold {}",
                self.auto_approval_threshold, self.auto_rejection_threshold
            );
        }
        if self.auto_rejection_threshold > 100 {
            anyhow::bail!("auto_rejection_threshold must be within 0..=100");
        }
        if self.frequency.window_hours <= 0 {
            anyhow::bail!("frequency.window_hours must be positive");
        }
        Ok(())
    }

    pub fn is_high_risk_country(&self, country: &str) -> bool {
        self.high_risk_countries.iter().any(|c| c.eq_ignore_ascii_case(country))
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        Self {
            high_risk_countries: vec![
                "XX".into(), "YY".into(), "ZZ".into(),
                "KP".into(), "IR".into(), "SY".into(),
            ],
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = AmlConfig::default();
        assert!(c.sanctions_check_enabled);
        assert!(c.transaction_monitoring_enabled);
        assert_eq!(c.high_risk_countries, vec!["KP", "IR", "SY"]);
        assert_eq!(c.transaction_thresholds.low, Decimal::new(10_000, 0));
        assert_eq!(c.transaction_thresholds.medium, Decimal::new(50_000, 0));
        assert_eq!(c.transaction_thresholds.high, Decimal::new(100_000, 0));
        assert_eq!(c.auto_approval_threshold, 30);
        assert_eq!(c.auto_rejection_threshold, 80);
        assert_eq!(c.frequency.window(), chrono::Duration::hours(24));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{ "sanctions_check_enabled": false, "auto_rejection_threshold": 90 }"#;
        let c: AmlConfig = serde_json::from_str(json).unwrap();
        assert!(!c.sanctions_check_enabled);
        assert!(c.transaction_monitoring_enabled);
        assert_eq!(c.auto_rejection_threshold, 90);
        assert_eq!(c.auto_approval_threshold, 30);
        assert_eq!(c.frequency.high_count, 10);
    }

    #[test]
    fn inverted_thresholds_rejected() {
        let mut c = AmlConfig::default();
        c.transaction_thresholds.low = Decimal::new(60_000, 0);
        assert!(c.validate().is_err());

        let mut c = AmlConfig::default();
        c.auto_approval_threshold = 90;
        assert!(c.validate().is_err());
    }

    #[test]
    fn load_reads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aml.json");
        std::fs::write(&path, r#"{ "high_risk_countries": ["AF"] }"#).unwrap();

        let c = AmlConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(c.high_risk_countries, vec!["AF"]);
        assert!(c.is_high_risk_country("af"));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = AmlConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("Cannot read"));
    }
}
