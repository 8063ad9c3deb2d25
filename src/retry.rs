// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Retry
//!
//! Connect attempts are retried at a fixed interval. The default policy never gives up.

use crate::{
    broker::{BrokerConnection, Connector},
    errors::FatalSetupError,
};
use std::time::Duration;
use tracing::{info, warn};

/// How connect failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    interval: Duration,
    max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

    /// Retries forever, waiting `interval` after each failed attempt.
    pub fn fixed(interval: Duration) -> Self {
        RetryPolicy {
            interval,
            max_attempts: None,
        }
    }

    /// Gives up once `attempts` connect calls have failed.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    fn exhausted(&self, failures: u32) -> bool {
        self.max_attempts.is_some_and(|max| failures >= max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::fixed(Self::DEFAULT_INTERVAL)
    }
}

/// Calls `connector` until it succeeds or `policy` is exhausted.
pub async fn connect_with_retry<C>(
    connector: &C,
    policy: &RetryPolicy,
) -> Result<Box<dyn BrokerConnection>, FatalSetupError>
where
    C: Connector + ?Sized,
{
    let mut failures = 0u32;

    loop {
        match connector.connect().await {
            Ok(conn) => {
                if failures > 0 {
                    info!(failures, "connected after retrying");
                }
                return Ok(conn);
            }
            Err(err) => {
                failures += 1;
                if policy.exhausted(failures) {
                    return Err(FatalSetupError::ConnectRetriesExhausted { attempts: failures });
                }

                warn!(
                    error = %err,
                    attempt = failures,
                    "reconnecting in {:?}",
                    policy.interval
                );
                tokio::time::sleep(policy.interval).await;
            }
        }
    }
}
