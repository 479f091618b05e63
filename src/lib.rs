// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Connections
//!
//! Named, lazily connected AMQP connections configured from flat option maps.
//! A [`handle::ConnectionHandle`] validates its options against a fixed
//! allow-list, merges them over defaults, and opens the connection and a
//! channel through `lapin` on first use.

pub mod config;
pub mod connector;
pub mod errors;
pub mod handle;
pub mod lapin_connector;
pub mod options;
pub mod registry;
