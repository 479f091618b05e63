// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Client Seam
//!
//! This module defines the narrow interface a connection handle needs from an
//! AMQP client: connect, open a channel, close the current channel and
//! reconnect. Handshakes, framing and heartbeats all live behind it.

use crate::{config::ConnectionConfig, errors::AmqpError};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;

/// Creates connections from a translated configuration.
#[cfg_attr(test, automock(type Connection = MockBrokerConnection;))]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connection type produced by this connector.
    type Connection: BrokerConnection;

    /// Creates a connection for the given configuration.
    ///
    /// When `config.lazy` is set the connector may return a connection that
    /// defers network I/O until its first use.
    ///
    /// # Parameters
    /// * `config` - The translated connection configuration
    ///
    /// # Returns
    /// The connection on success or `AmqpError::ConnectionError` on failure
    async fn connect(&self, config: &ConnectionConfig) -> Result<Self::Connection, AmqpError>;
}

/// A single logical connection to the broker.
#[cfg_attr(test, automock(type Channel = String;))]
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Channel type opened on this connection.
    type Channel: Send + Sync;

    /// Opens a new channel and makes it the current one.
    async fn open_channel(&mut self) -> Result<Arc<Self::Channel>, AmqpError>;

    /// Closes the current channel, if one is open.
    async fn close_current_channel(&mut self) -> Result<(), AmqpError>;

    /// Re-establishes the connection in place.
    ///
    /// Failures closing the previous link are not reported; failures opening
    /// the new one are.
    async fn reconnect(&mut self) -> Result<(), AmqpError>;
}
