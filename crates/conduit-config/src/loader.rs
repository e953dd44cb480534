use std::path::Path;

use crate::Config;

/// Tolerance for the combination weights summing to one
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a placeholder cannot be
    /// expanded, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::parse(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let expanded = crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error describing the first inconsistency found
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_providers()?;
        self.validate_resilience()?;
        self.validate_health()?;
        self.validate_scoring()?;
        self.validate_retraining()?;
        self.validate_rate_limit()?;
        Ok(())
    }

    fn validate_providers(&self) -> anyhow::Result<()> {
        if self.providers.is_empty() {
            anyhow::bail!("at least one provider must be configured");
        }

        for (name, provider) in &self.providers {
            if provider.timeout_ms == 0 {
                anyhow::bail!("provider '{name}': timeout_ms must be greater than 0");
            }
            if !provider.cost_per_1k_tokens.is_finite() || provider.cost_per_1k_tokens < 0.0 {
                anyhow::bail!("provider '{name}': cost_per_1k_tokens must be a non-negative number");
            }
        }

        Ok(())
    }

    fn validate_resilience(&self) -> anyhow::Result<()> {
        let breaker = &self.circuit_breaker;
        if !(breaker.error_threshold_percent > 0.0 && breaker.error_threshold_percent <= 100.0) {
            anyhow::bail!("circuit_breaker.error_threshold_percent must be in (0, 100]");
        }
        if breaker.window_ms == 0 || breaker.reset_timeout_ms == 0 {
            anyhow::bail!("circuit_breaker.window_ms and reset_timeout_ms must be greater than 0");
        }
        if !breaker.backoff_multiplier.is_finite() || breaker.backoff_multiplier < 1.0 {
            anyhow::bail!("circuit_breaker.backoff_multiplier must be at least 1.0");
        }
        if breaker.max_reset_timeout_ms < breaker.reset_timeout_ms {
            anyhow::bail!("circuit_breaker.max_reset_timeout_ms must not be below reset_timeout_ms");
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if !self.retry.factor.is_finite() || self.retry.factor < 1.0 {
            anyhow::bail!("retry.factor must be at least 1.0");
        }

        Ok(())
    }

    fn validate_health(&self) -> anyhow::Result<()> {
        let health = &self.health;
        for (field, value) in [
            ("degraded_error_rate", health.degraded_error_rate),
            ("unhealthy_error_rate", health.unhealthy_error_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("health.{field} must be within [0, 1]");
            }
        }
        if health.degraded_error_rate > health.unhealthy_error_rate {
            anyhow::bail!("health.degraded_error_rate must not exceed health.unhealthy_error_rate");
        }
        if health.probe_interval_secs == 0 || health.observation_window == 0 {
            anyhow::bail!("health.probe_interval_secs and observation_window must be greater than 0");
        }

        Ok(())
    }

    fn validate_scoring(&self) -> anyhow::Result<()> {
        let scoring = &self.scoring;
        let weights = &scoring.weights;

        let components = [
            weights.content,
            weights.modality,
            weights.historical,
            weights.user_preference,
            weights.system_health,
        ];
        if components.iter().any(|w| !is_weight(*w)) {
            anyhow::bail!("scoring.weights must be finite and non-negative");
        }
        if (weights.total() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            anyhow::bail!("scoring.weights must sum to 1.0, got {}", weights.total());
        }

        let content = &scoring.content_weights;
        if [
            content.code_snippets,
            content.error_messages,
            content.json_data,
            content.stack_traces,
            content.content_length,
        ]
        .iter()
        .any(|w| !is_weight(*w))
        {
            anyhow::bail!("scoring.content_weights must be finite and non-negative");
        }

        for (name, family) in &scoring.families {
            let m = &family.multipliers;
            let a = &family.affinity;
            let values = [
                m.code_snippets,
                m.error_messages,
                m.json_data,
                m.stack_traces,
                m.content_length,
                a.text,
                a.code,
                a.structured,
                a.errors,
            ];
            if values.iter().any(|v| !is_weight(*v)) {
                anyhow::bail!("scoring.families.{name}: multipliers and affinities must be finite and non-negative");
            }
        }

        if scoring.sample_limit == 0 {
            anyhow::bail!("scoring.sample_limit must be greater than 0");
        }

        Ok(())
    }

    fn validate_retraining(&self) -> anyhow::Result<()> {
        let retraining = &self.retraining;
        if !(0.0..1.0).contains(&retraining.smoothing) {
            anyhow::bail!("retraining.smoothing must be within [0, 1)");
        }
        if retraining.enabled && retraining.interval_secs == 0 {
            anyhow::bail!("retraining.interval_secs must be greater than 0");
        }

        Ok(())
    }

    fn validate_rate_limit(&self) -> anyhow::Result<()> {
        let Some(ref rate_limit) = self.server.rate_limit else {
            return Ok(());
        };

        for (scope, limit) in [("global", &rate_limit.global), ("per_ip", &rate_limit.per_ip)] {
            let Some(limit) = limit else {
                continue;
            };
            if limit.requests == 0 {
                anyhow::bail!("server.rate_limit.{scope}.requests must be greater than 0");
            }
            let window = duration_str::parse(&limit.window)
                .map_err(|e| anyhow::anyhow!("server.rate_limit.{scope}.window is invalid: {e}"))?;
            if window.is_zero() {
                anyhow::bail!("server.rate_limit.{scope}.window must be greater than 0");
            }
        }

        Ok(())
    }
}

fn is_weight(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}
