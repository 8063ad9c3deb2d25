// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # OpenTelemetry Integration
//!
//! This module wires the worker to an OpenTelemetry backend. It includes utilities for
//! extracting trace context from incoming RabbitMQ message headers, creating consumer spans,
//! and installing the global tracer provider that exports spans over OTLP/HTTP.

use crate::{configs::DispatchConfigs, errors::FatalSetupError};
use lapin::{
    protocol::basic::AMQPProperties,
    types::{AMQPValue, ShortString},
};
use opentelemetry::{
    global,
    propagation::Extractor,
    trace::{SpanKind, Tracer},
    Context,
};
use opentelemetry_otlp::{SpanExporter, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::{propagation::TraceContextPropagator, trace::SdkTracerProvider, Resource};
use std::{borrow::Cow, collections::BTreeMap, collections::HashMap};
use tracing::error;

/// Header carrying the telemetry license key on every OTLP request.
pub const LICENSE_KEY_HEADER: &str = "api-key";

/// Reads OpenTelemetry context out of RabbitMQ headers.
pub(crate) struct RabbitMQTracePropagator<'a> {
    headers: &'a BTreeMap<ShortString, AMQPValue>,
}

impl<'a> RabbitMQTracePropagator<'a> {
    pub(crate) fn new(headers: &'a BTreeMap<ShortString, AMQPValue>) -> Self {
        Self { headers }
    }
}

impl Extractor for RabbitMQTracePropagator<'_> {
    /// Gets a trace context value from RabbitMQ message headers.
    fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|header_value| match header_value {
            AMQPValue::LongString(header_value) => std::str::from_utf8(header_value.as_bytes())
                .map_err(|e| error!("Error decoding header value {:?}", e))
                .ok(),
            AMQPValue::ShortString(header_value) => Some(header_value.as_str()),
            _ => None,
        })
    }

    fn keys(&self) -> Vec<&str> {
        self.headers.keys().map(|header| header.as_str()).collect()
    }
}

/// Creates a consumer span for an incoming message.
///
/// When the message headers carry trace context the span continues that trace; otherwise it
/// starts a new one.
pub fn new_span<T>(props: &AMQPProperties, tracer: &T, name: &str) -> (Context, T::Span)
where
    T: Tracer,
{
    let headers = props
        .headers()
        .as_ref()
        .map(|table| table.inner().clone())
        .unwrap_or_default();

    let ctx = global::get_text_map_propagator(|propagator| {
        propagator.extract(&RabbitMQTracePropagator::new(&headers))
    });

    let span = tracer
        .span_builder(Cow::from(name.to_owned()))
        .with_kind(SpanKind::Consumer)
        .start_with_context(tracer, &ctx);

    (ctx, span)
}

/// Installs the global tracer provider and W3C trace-context propagator.
///
/// The returned provider must be shut down before exit so buffered spans are flushed.
pub fn install_tracer_provider(
    cfg: &DispatchConfigs,
) -> Result<SdkTracerProvider, FatalSetupError> {
    let headers = HashMap::from([(
        LICENSE_KEY_HEADER.to_owned(),
        cfg.telemetry.license_key.clone(),
    )]);

    let exporter = SpanExporter::builder()
        .with_http()
        .with_endpoint(cfg.telemetry.endpoint.clone())
        .with_headers(headers)
        .build()
        .map_err(|err| {
            error!(error = err.to_string(), "failure to build span exporter");
            FatalSetupError::Telemetry(err.to_string())
        })?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            Resource::builder()
                .with_service_name(cfg.app.name.clone())
                .build(),
        )
        .build();

    global::set_text_map_propagator(TraceContextPropagator::new());
    global::set_tracer_provider(provider.clone());

    Ok(provider)
}
