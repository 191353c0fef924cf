//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Maximum in-flight Vision Service calls per job
    pub max_classify_parallel: usize,
    /// Bound on one classification call
    pub classify_timeout: Duration,
    /// Bound on the synthesis call, retries included. Raised to the speech
    /// client's own budget when that is larger.
    pub synthesis_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Work directory for temporary files
    pub work_dir: PathBuf,
    /// How often the worker should scan for orphaned pending messages
    pub claim_interval: Duration,
    /// Minimum idle time before a pending message can be claimed
    pub claim_min_idle: Duration,
    /// How often a running job stamps its heartbeat
    pub job_heartbeat_interval: Duration,
    /// Heartbeat age after which a `processing` job counts as abandoned
    pub job_stale_after: Duration,
    /// Optional JSON object overlaying the built-in lexicon
    pub lexicon_path: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            max_classify_parallel: 4,
            classify_timeout: Duration::from_secs(30),
            synthesis_timeout: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(30),
            work_dir: PathBuf::from("/tmp/navsight"),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300),
            job_heartbeat_interval: Duration::from_secs(30),
            job_stale_after: Duration::from_secs(120),
            lexicon_path: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl WorkerConfig {
    /// Synthesis bound that leaves room for every attempt the speech
    /// client may make.
    pub fn synthesis_timeout_for(&self, speech_budget: Duration) -> Duration {
        self.synthesis_timeout.max(speech_budget)
    }

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: env_parse("WORKER_MAX_JOBS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            max_classify_parallel: env_parse("WORKER_MAX_CLASSIFY_PARALLEL")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_classify_parallel),
            classify_timeout: env_parse("WORKER_CLASSIFY_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.classify_timeout),
            synthesis_timeout: env_parse("WORKER_SYNTHESIS_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.synthesis_timeout),
            shutdown_timeout: env_parse("WORKER_SHUTDOWN_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            claim_interval: env_parse("WORKER_CLAIM_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_interval),
            claim_min_idle: env_parse("WORKER_CLAIM_MIN_IDLE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_min_idle),
            job_heartbeat_interval: env_parse("WORKER_HEARTBEAT_INTERVAL_SECS")
                .filter(|n: &u64| *n > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_heartbeat_interval),
            job_stale_after: env_parse("WORKER_JOB_STALE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_stale_after),
            lexicon_path: std::env::var("LEXICON_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_overrides_and_rejects_zero() {
        std::env::set_var("WORKER_MAX_CLASSIFY_PARALLEL", "8");
        std::env::set_var("WORKER_MAX_JOBS", "0");
        std::env::set_var("WORKER_SYNTHESIS_TIMEOUT_SECS", "15");
        let config = WorkerConfig::from_env();
        std::env::remove_var("WORKER_MAX_CLASSIFY_PARALLEL");
        std::env::remove_var("WORKER_MAX_JOBS");
        std::env::remove_var("WORKER_SYNTHESIS_TIMEOUT_SECS");

        assert_eq!(config.max_classify_parallel, 8);
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.synthesis_timeout, Duration::from_secs(15));
        assert_eq!(config.classify_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_synthesis_timeout_covers_client_retries() {
        let config = WorkerConfig::default();
        assert_eq!(
            config.synthesis_timeout_for(Duration::from_millis(120_500)),
            Duration::from_millis(120_500)
        );
        assert_eq!(
            config.synthesis_timeout_for(Duration::from_secs(10)),
            config.synthesis_timeout
        );
    }
}
