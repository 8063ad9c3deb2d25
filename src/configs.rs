// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Worker Configuration
//!
//! Everything is read from the process environment:
//!
//! | Variable | Default |
//! |---|---|
//! | `AMQP_HOST` | `rabbitmq` |
//! | `DISPATCH_ERROR_PERCENT` | `0`, clamped to `[0, 100]`, unparsable values count as `0` |
//! | `NEW_RELIC_APP_NAME` | `dispatch-service` |
//! | `NEW_RELIC_LICENSE_KEY` | required |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | `https://otlp.nr-data.net:4318/v1/traces` |

use crate::errors::ConfigError;
use config::{Config, Environment, Map};
use serde::Deserialize;

pub const DEFAULT_AMQP_HOST: &str = "rabbitmq";
pub const DEFAULT_APP_NAME: &str = "dispatch-service";
pub const DEFAULT_OTLP_ENDPOINT: &str = "https://otlp.nr-data.net:4318/v1/traces";

const AMQP_PORT: u16 = 5672;
const AMQP_USER: &str = "guest";
const AMQP_PASSWORD: &str = "guest";
const AMQP_VHOST: &str = "%2f";

#[derive(Debug, Default, Deserialize)]
struct RawEnvironment {
    amqp_host: Option<String>,
    dispatch_error_percent: Option<String>,
    new_relic_app_name: Option<String>,
    new_relic_license_key: Option<String>,
    otel_exporter_otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfigs {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RabbitMQConfigs {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfigs {
    pub license_key: String,
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfigs {
    pub app: AppConfigs,
    pub rabbitmq: RabbitMQConfigs,
    pub telemetry: TelemetryConfigs,
    pub error_percent: u8,
}

impl DispatchConfigs {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(Environment::default())
    }

    /// Same as [`DispatchConfigs::from_env`] but reads `vars` instead of the process environment.
    pub fn from_vars(vars: Map<String, String>) -> Result<Self, ConfigError> {
        Self::from_source(Environment::default().source(Some(vars)))
    }

    fn from_source(env: Environment) -> Result<Self, ConfigError> {
        let raw: RawEnvironment = Config::builder()
            .add_source(env)
            .build()
            .and_then(|cfg| cfg.try_deserialize())
            .map_err(|err| ConfigError::Load(err.to_string()))?;

        let license_key = raw
            .new_relic_license_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingLicenseKey)?;

        Ok(DispatchConfigs {
            app: AppConfigs {
                name: raw
                    .new_relic_app_name
                    .unwrap_or_else(|| DEFAULT_APP_NAME.to_owned()),
            },
            rabbitmq: RabbitMQConfigs {
                host: raw
                    .amqp_host
                    .unwrap_or_else(|| DEFAULT_AMQP_HOST.to_owned()),
                port: AMQP_PORT,
                user: AMQP_USER.to_owned(),
                password: AMQP_PASSWORD.to_owned(),
                vhost: AMQP_VHOST.to_owned(),
            },
            telemetry: TelemetryConfigs {
                license_key,
                endpoint: raw
                    .otel_exporter_otlp_endpoint
                    .unwrap_or_else(|| DEFAULT_OTLP_ENDPOINT.to_owned()),
            },
            error_percent: parse_error_percent(raw.dispatch_error_percent.as_deref()),
        })
    }

    pub fn amqp_uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            self.rabbitmq.user,
            self.rabbitmq.password,
            self.rabbitmq.host,
            self.rabbitmq.port,
            self.rabbitmq.vhost
        )
    }
}

fn parse_error_percent(value: Option<&str>) -> u8 {
    value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map(|pct| pct.clamp(0, 100) as u8)
        .unwrap_or(0)
}
