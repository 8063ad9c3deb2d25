// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Dispatch Worker
//!
//! Three layers of errors live here:
//! - `AmqpError`: a single broker operation failed (connect, declare, bind, consume).
//! - `ConfigError`: the environment could not be turned into a `DispatchConfigs`.
//! - `FatalSetupError`: the worker cannot continue; the binary maps it to a non-zero exit.
//!
//! Transient connection failures are `AmqpError::ConnectionError` and never leave the
//! supervisor's retry loop. Everything that reaches `FatalSetupError` terminates the process.

use thiserror::Error;

/// Represents errors that can occur during AMQP/RabbitMQ operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmqpError {
    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding a queue to an exchange
    #[error("failure to binding exchange `{0}` to queue `{1}`")]
    BindingExchangeToQueueError(String, String),

    /// Error subscribing a consumer to a queue
    #[error("failure to declare consumer `{0}`")]
    BindingConsumerError(String),

    /// Error reported by an active subscription
    #[error("failure to consume message `{0}`")]
    ConsumerError(String),
}

/// Errors raised while reading configuration from the environment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The environment could not be read or deserialized
    #[error("failure to load configuration: {0}")]
    Load(String),

    /// The telemetry license key is absent or blank
    #[error("NEW_RELIC_LICENSE_KEY is not set")]
    MissingLicenseKey,
}

/// Conditions under which the worker stops.
///
/// Each variant names the operation that failed so the exit log is enough to diagnose a
/// misconfigured broker or deployment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FatalSetupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failure to initialize telemetry: {0}")]
    Telemetry(String),

    #[error("gave up connecting after {attempts} attempts")]
    ConnectRetriesExhausted { attempts: u32 },

    #[error("failed to create channel: {0}")]
    Channel(AmqpError),

    #[error("failed to install topology: {0}")]
    Topology(AmqpError),

    #[error("failed to consume: {0}")]
    Consume(AmqpError),

    #[error("connection supervisor stopped")]
    SupervisorStopped,

    #[error("worker task failed: {0}")]
    Task(String),
}
