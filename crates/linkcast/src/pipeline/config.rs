use std::time::Duration;

use crate::automation::RetryConfig;
use crate::config::Config;
use crate::jobs::ARTIFACT_TTL_DAYS;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Pause after the source is attached so the service can index it.
    pub indexing_delay: Duration,
    /// How long public artifact links stay valid.
    pub link_ttl: Duration,
    pub retry: RetryConfig,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            indexing_delay: config.automation.indexing_delay(),
            link_ttl: Duration::from_secs(ARTIFACT_TTL_DAYS as u64 * 24 * 60 * 60),
            retry: config.automation.retry.clone(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.automation.indexing_delay_secs = 3;

        let pipeline = PipelineConfig::from_config(&config);
        assert_eq!(pipeline.indexing_delay, Duration::from_secs(3));
        assert_eq!(pipeline.link_ttl, Duration::from_secs(604_800));
        assert_eq!(pipeline.retry, RetryConfig::default());
    }
}
