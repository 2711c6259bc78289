//! Settings assembly: `config`-crate defaults layered with environment
//! overrides, then CLI flags layered on top in `commands::serve::run`.
//!
//! `host`/`port`/`debug` are sourced under the `CONDUCTOR_SERVER__` prefix.
//! Secrets and tuning knobs are read as bare environment variables under
//! their own names instead, since they're provisioned independently of
//! the rest of the configuration.

use std::net::SocketAddr;

use serde::Deserialize;

const ENV_PREFIX: &str = "CONDUCTOR_SERVER";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub debug: bool,

    #[serde(skip)]
    pub secrets: Secrets,
    #[serde(skip)]
    pub research: ResearchSettings,
    #[serde(skip)]
    pub autonomic: AutonomicSettings,
}

#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub anthropic_api_key: Option<String>,
    pub tavily_api_key: Option<String>,
    pub store_url: Option<String>,
    pub store_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResearchSettings {
    pub max_iterations: u32,
    pub confidence_threshold: f64,
    pub confidence_delta_threshold: f64,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            confidence_threshold: 0.85,
            confidence_delta_threshold: 0.05,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AutonomicSettings {
    pub heartbeat_interval_secs: u64,
    pub health_interval_secs: u64,
}

impl Default for AutonomicSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 60,
            health_interval_secs: 30,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Settings {
    pub fn new() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .set_default("host", default_host())?
            .set_default("port", default_port() as i64)?
            .set_default("debug", false)?
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut settings: Settings = config.try_deserialize()?;

        settings.secrets = Secrets {
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            tavily_api_key: std::env::var("TAVILY_API_KEY").ok(),
            store_url: std::env::var("STORE_URL").ok(),
            store_key: std::env::var("STORE_KEY").ok(),
        };

        settings.research = ResearchSettings {
            max_iterations: env_parsed("RESEARCH_MAX_ITERATIONS")
                .unwrap_or(ResearchSettings::default().max_iterations),
            confidence_threshold: env_parsed("RESEARCH_CONFIDENCE_THRESHOLD")
                .unwrap_or(ResearchSettings::default().confidence_threshold),
            confidence_delta_threshold: env_parsed("RESEARCH_CONFIDENCE_DELTA_THRESHOLD")
                .unwrap_or(ResearchSettings::default().confidence_delta_threshold),
        };

        settings.autonomic = AutonomicSettings {
            heartbeat_interval_secs: env_parsed("AUTONOMIC_HEARTBEAT_INTERVAL")
                .unwrap_or(AutonomicSettings::default().heartbeat_interval_secs),
            health_interval_secs: env_parsed("AUTONOMIC_HEALTH_INTERVAL")
                .unwrap_or(AutonomicSettings::default().health_interval_secs),
        };

        Ok(settings)
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bind_to_localhost_8080() {
        let settings = Settings {
            host: default_host(),
            port: default_port(),
            debug: false,
            secrets: Secrets::default(),
            research: ResearchSettings::default(),
            autonomic: AutonomicSettings::default(),
        };
        assert_eq!(settings.socket_addr().unwrap().port(), 8080);
    }
}
