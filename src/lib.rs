// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Order dispatch worker: consumes order events from RabbitMQ, supervising and rebuilding its own
//! broker connection whenever it drops.

pub mod broker;
pub mod channel;
pub mod configs;
pub mod dispatcher;
pub mod errors;
pub mod exchange;
pub mod order;
pub mod otel;
pub mod processor;
pub mod queue;
pub mod retry;
pub mod signals;
pub mod supervisor;
pub mod topology;
