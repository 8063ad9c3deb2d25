// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use dispatch::{
    channel::AmqpConnector,
    configs::DispatchConfigs,
    dispatcher::ConsumptionLoop,
    errors::FatalSetupError,
    otel,
    processor::OrderProcessor,
    retry::RetryPolicy,
    signals::CloseEvent,
    supervisor::ConnectionSupervisor,
};
use opentelemetry::global;
use std::{process::ExitCode, sync::Arc};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "dispatch stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), FatalSetupError> {
    let cfg = DispatchConfigs::from_env()?;

    let provider = otel::install_tracer_provider(&cfg)?;
    info!(app = %cfg.app.name, "telemetry initialized");
    info!("error percent is {}", cfg.error_percent);

    let (supervisor, readiness) =
        ConnectionSupervisor::new(AmqpConnector::new(&cfg), RetryPolicy::default());
    supervisor.close_signal().notify(CloseEvent::bootstrap());

    let processor = OrderProcessor::new(global::tracer("dispatch"), cfg.error_percent);
    let consumer = ConsumptionLoop::new(
        readiness,
        supervisor.topology().queue_name(),
        Arc::new(processor),
    );

    let mut supervisor = tokio::spawn(supervisor.run());
    let mut consumer = tokio::spawn(consumer.run());
    info!("waiting for messages");

    let finished = tokio::select! {
        res = &mut supervisor => res,
        res = &mut consumer => res,
    };
    supervisor.abort();
    consumer.abort();

    if let Err(err) = provider.shutdown() {
        warn!(error = %err, "failure to flush spans");
    }

    match finished {
        Ok(result) => result,
        Err(err) => Err(FatalSetupError::Task(err.to_string())),
    }
}
