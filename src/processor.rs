// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Order Processing Pipeline
//!
//! Per message: decode the correlation ids, open a `consume/order` span carrying them, simulate
//! the downstream work with a random delay and close the span. The pipeline has no failure
//! path; with error injection enabled a share of spans is marked as failed.

use crate::{broker::OrderDelivery, dispatcher::DeliveryHandler, order::OrderDetails, otel};
use async_trait::async_trait;
use opentelemetry::{
    trace::{Span, Status, Tracer},
    KeyValue,
};
use rand::Rng;
use std::{borrow::Cow, time::Duration};
use tracing::{info, warn};

/// Span name for every processed order.
pub const CONSUME_OPERATION: &str = "consume/order";

/// Uniform processing delay in `[min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyRange {
    min: Duration,
    max: Duration,
}

impl LatencyRange {
    /// An empty range is widened to one millisecond.
    pub fn new(min: Duration, max: Duration) -> Self {
        let max = max.max(min + Duration::from_millis(1));
        LatencyRange { min, max }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let millis = rng.gen_range(self.min.as_millis() as u64..self.max.as_millis() as u64);
        Duration::from_millis(millis)
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}

impl Default for LatencyRange {
    fn default() -> Self {
        LatencyRange::new(Duration::from_millis(420), Duration::from_millis(840))
    }
}

/// Percentage of processed orders whose span is marked as failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorInjection {
    percent: u8,
}

impl ErrorInjection {
    pub fn new(percent: u8) -> Self {
        ErrorInjection {
            percent: percent.min(100),
        }
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn should_fail<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        self.percent > 0 && rng.gen_range(0..100u8) < self.percent
    }
}

/// Traces and simulates the work for each delivered order.
pub struct OrderProcessor<T> {
    tracer: T,
    latency: LatencyRange,
    injection: ErrorInjection,
}

impl<T> OrderProcessor<T>
where
    T: Tracer + Send + Sync,
    T::Span: Send + 'static,
{
    pub fn new(tracer: T, error_percent: u8) -> Self {
        OrderProcessor {
            tracer,
            latency: LatencyRange::default(),
            injection: ErrorInjection::new(error_percent),
        }
    }

    pub fn with_latency(mut self, latency: LatencyRange) -> Self {
        self.latency = latency;
        self
    }

    /// Runs the pipeline for one delivery and returns the ids it was tagged with.
    pub async fn process(&self, delivery: &OrderDelivery) -> OrderDetails {
        let details = OrderDetails::decode(&delivery.data);

        let (_ctx, mut span) =
            otel::new_span(&delivery.properties, &self.tracer, CONSUME_OPERATION);
        span.set_attribute(KeyValue::new("user_id", details.user_id().to_owned()));
        span.set_attribute(KeyValue::new("order_id", details.order_id().to_owned()));

        info!(
            order = %String::from_utf8_lossy(&delivery.data),
            headers = ?delivery.properties.headers(),
            "order received"
        );

        let (delay, inject) = {
            let mut rng = rand::thread_rng();
            (self.latency.sample(&mut rng), self.injection.should_fail(&mut rng))
        };

        tokio::time::sleep(delay).await;

        if inject {
            warn!(
                order_id = details.order_id(),
                percent = self.injection.percent(),
                "injected processing failure"
            );
            span.set_status(Status::Error {
                description: Cow::from("injected failure"),
            });
        }

        span.end();
        details
    }
}

#[async_trait]
impl<T> DeliveryHandler for OrderProcessor<T>
where
    T: Tracer + Send + Sync,
    T::Span: Send + 'static,
{
    async fn handle(&self, delivery: OrderDelivery) {
        self.process(&delivery).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SpanData};
    use lapin::{
        protocol::basic::AMQPProperties,
        types::{AMQPValue, FieldTable},
    };
    use rand::{rngs::StdRng, SeedableRng};
    use serde_json::json;
    use std::{
        io,
        sync::{Arc, Mutex},
    };
    use tokio::time::Instant;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogBuffer {
        type Writer = LogBuffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn tracer_provider() -> (SdkTracerProvider, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        (provider, exporter)
    }

    fn attribute(span: &SpanData, key: &str) -> Option<String> {
        span.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| kv.value.to_string())
    }

    #[test]
    fn latency_samples_stay_in_range() {
        let range = LatencyRange::default();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..10_000 {
            let delay = range.sample(&mut rng);
            assert!(delay >= Duration::from_millis(420));
            assert!(delay < Duration::from_millis(840));
        }
    }

    #[test]
    fn empty_latency_range_is_widened() {
        let range = LatencyRange::new(Duration::from_millis(5), Duration::from_millis(5));
        assert_eq!(range.max(), Duration::from_millis(6));
        assert_eq!(
            range.sample(&mut StdRng::seed_from_u64(1)),
            Duration::from_millis(5)
        );
    }

    #[test]
    fn error_injection_bounds() {
        let mut rng = StdRng::seed_from_u64(11);
        let never = ErrorInjection::new(0);
        let always = ErrorInjection::new(100);

        for _ in 0..1_000 {
            assert!(!never.should_fail(&mut rng));
            assert!(always.should_fail(&mut rng));
        }
        assert_eq!(ErrorInjection::new(250).percent(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn span_carries_order_and_user() {
        let (provider, exporter) = tracer_provider();
        let processor = OrderProcessor::new(provider.tracer("dispatch-test"), 0);

        let body = json!({ "orderid": "A100", "user": "u42" }).to_string();
        let start = Instant::now();
        let details = processor.process(&OrderDelivery::new(body)).await;
        let elapsed = start.elapsed();

        assert_eq!(details.order_id(), "A100");
        assert!(elapsed >= Duration::from_millis(420) && elapsed < Duration::from_millis(840));

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.name, CONSUME_OPERATION);
        assert_eq!(attribute(span, "order_id").as_deref(), Some("A100"));
        assert_eq!(attribute(span, "user_id").as_deref(), Some("u42"));
        assert_eq!(span.status, Status::Unset);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_payload_is_tagged_unknown() {
        let (provider, exporter) = tracer_provider();
        let processor = OrderProcessor::new(provider.tracer("dispatch-test"), 0);

        processor.handle(OrderDelivery::new("not json")).await;

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(attribute(&spans[0], "order_id").as_deref(), Some("unknown"));
        assert_eq!(attribute(&spans[0], "user_id").as_deref(), Some("unknown"));
    }

    #[tokio::test(start_paused = true)]
    async fn full_error_injection_marks_span_failed() {
        let (provider, exporter) = tracer_provider();
        let processor = OrderProcessor::new(provider.tracer("dispatch-test"), 100)
            .with_latency(LatencyRange::new(Duration::from_millis(1), Duration::from_millis(2)));

        processor
            .handle(OrderDelivery::new(r#"{"orderid":"A1","user":"u1"}"#))
            .await;

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(
            spans[0].status,
            Status::Error {
                description: Cow::from("injected failure")
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn body_and_headers_are_logged_at_info() {
        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (provider, _exporter) = tracer_provider();
        let processor = OrderProcessor::new(provider.tracer("dispatch-test"), 0);

        let mut headers = FieldTable::default();
        headers.insert("x-source".into(), AMQPValue::LongString("web-checkout".into()));
        let delivery = OrderDelivery {
            data: br#"{"orderid":"A7","user":"u9"}"#.to_vec(),
            properties: AMQPProperties::default().with_headers(headers),
        };
        processor.process(&delivery).await;

        let output = logs.contents();
        let line = output
            .lines()
            .find(|line| line.contains("order received"))
            .expect("order received event");
        assert!(line.contains("INFO"));
        assert!(line.contains("A7"));
        assert!(line.contains("web-checkout"));
    }
}
