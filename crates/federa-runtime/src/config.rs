//! Runtime configuration.

use std::time::Duration;

use federa_codec::{CodecConfig, ObjectIdGenerator};
use federa_transport::{FrameConfig, ProcessType};

use crate::error::{Result, RuntimeError};

pub const ENV_PROCESS_ID: &str = "FEDERA_PROCESS_ID";
pub const ENV_PROCESS_TYPE: &str = "FEDERA_PROCESS_TYPE";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "FEDERA_REQUEST_TIMEOUT_MS";

const MAX_PROCESS_ID_LEN: usize = 128;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed, bounded retry for service pings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

/// Identity and tuning for a [`Runtime`](crate::Runtime).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Identifier announced in the handshake.
    pub process_id: String,
    pub process_type: ProcessType,
    /// Codec settings for connections the runtime creates.
    pub codec: CodecConfig,
    /// Framing limits for stream connections the runtime creates.
    pub frame: FrameConfig,
    /// Default timeout for blocking service requests.
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            process_id: ObjectIdGenerator::new().generate().to_hex(),
            process_type: ProcessType::default(),
            codec: CodecConfig::default(),
            frame: FrameConfig::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by `FEDERA_PROCESS_ID`, `FEDERA_PROCESS_TYPE` and
    /// `FEDERA_REQUEST_TIMEOUT_MS` when set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(id) = lookup(ENV_PROCESS_ID) {
            config.process_id = id;
        }
        if let Some(kind) = lookup(ENV_PROCESS_TYPE) {
            config.process_type = kind.parse().map_err(|_| {
                RuntimeError::InvalidConfig(format!("{ENV_PROCESS_TYPE}: unknown process type '{kind}'"))
            })?;
        }
        if let Some(ms) = lookup(ENV_REQUEST_TIMEOUT_MS) {
            let ms: u64 = ms.trim().parse().map_err(|_| {
                RuntimeError::InvalidConfig(format!("{ENV_REQUEST_TIMEOUT_MS}: expected milliseconds, got '{ms}'"))
            })?;
            config.request_timeout = Duration::from_millis(ms);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_process_id(mut self, process_id: impl Into<String>) -> Self {
        self.process_id = process_id.into();
        self
    }

    pub fn with_process_type(mut self, process_type: ProcessType) -> Self {
        self.process_type = process_type;
        self
    }

    pub fn with_codec(mut self, codec: CodecConfig) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_frame(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Check the values a runtime relies on.
    pub fn validate(&self) -> Result<()> {
        validate_process_id(&self.process_id)?;
        if self.request_timeout.is_zero() {
            return Err(RuntimeError::InvalidConfig("request timeout must be non-zero".into()));
        }
        if self.codec.max_depth == 0 {
            return Err(RuntimeError::InvalidConfig("codec depth must be non-zero".into()));
        }
        if self.frame.max_payload_size == 0 {
            return Err(RuntimeError::InvalidConfig("frame payload limit must be non-zero".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(RuntimeError::InvalidConfig("retry needs at least one attempt".into()));
        }
        Ok(())
    }
}

fn validate_process_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(RuntimeError::InvalidConfig("process id must not be empty".into()));
    }
    if id.len() > MAX_PROCESS_ID_LEN {
        return Err(RuntimeError::InvalidConfig(format!(
            "process id exceeds {MAX_PROCESS_ID_LEN} bytes"
        )));
    }
    if id.contains('\0') {
        return Err(RuntimeError::InvalidConfig("process id contains NUL".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = RuntimeConfig::default();
        assert_eq!(config.process_id.len(), 24);
        assert_eq!(config.process_type, ProcessType::Agent);
        assert_eq!(config.retry, RetryPolicy::new(10, Duration::from_millis(100)));
        config.validate().unwrap();
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            (ENV_PROCESS_ID, "tab-7"),
            (ENV_PROCESS_TYPE, "player"),
            (ENV_REQUEST_TIMEOUT_MS, "250"),
        ]))
        .unwrap();
        assert_eq!(config.process_id, "tab-7");
        assert_eq!(config.process_type, ProcessType::Player);
        assert_eq!(config.request_timeout, Duration::from_millis(250));
    }

    #[test]
    fn numeric_process_type_is_accepted() {
        let config = RuntimeConfig::from_lookup(lookup(&[(ENV_PROCESS_TYPE, "6")])).unwrap();
        assert_eq!(config.process_type, ProcessType::Launcher);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for vars in [
            [(ENV_PROCESS_TYPE, "toaster")],
            [(ENV_REQUEST_TIMEOUT_MS, "soon")],
            [(ENV_REQUEST_TIMEOUT_MS, "0")],
            [(ENV_PROCESS_ID, "")],
        ] {
            let err = RuntimeConfig::from_lookup(lookup(&vars)).unwrap_err();
            assert!(matches!(err, RuntimeError::InvalidConfig(_)), "{vars:?}: {err}");
        }
    }

    #[test]
    fn zero_codec_and_frame_limits_are_rejected() {
        let shallow = CodecConfig {
            max_depth: 0,
            ..CodecConfig::default()
        };
        assert!(RuntimeConfig::default().with_codec(shallow).validate().is_err());

        let tiny = FrameConfig::default().with_max_payload_size(0);
        assert!(RuntimeConfig::default().with_frame(tiny).validate().is_err());
    }

    #[test]
    fn oversized_process_id_is_rejected() {
        let config = RuntimeConfig::default().with_process_id("x".repeat(MAX_PROCESS_ID_LEN + 1));
        assert!(config.validate().is_err());
    }
}
