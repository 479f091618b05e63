// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Connection Handle
//!
//! This module provides `ConnectionHandle`, the named entry point to one broker.
//! A handle validates its options once, then creates the underlying connection
//! and channel on first use and caches them. Eager handles (`lazy: false`)
//! connect while being constructed, so network and authentication failures
//! surface at startup instead of on the first publish.
//!
//! The caches sit behind an async mutex: concurrent first access on a shared
//! handle creates a single connection and a single channel.

use crate::{
    config::ConnectionConfig,
    connector::{BrokerConnection, Connector},
    errors::AmqpError,
    lapin_connector::LapinConnector,
    options::ConnectionOptions,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Channel type produced by the connections of a connector.
pub type ChannelOf<C> = <<C as Connector>::Connection as BrokerConnection>::Channel;

/// Lifecycle state of the connection/channel pair owned by a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// No connection has been created yet
    Unopened,
    /// A connection exists but no channel is cached
    Connected,
    /// A connection exists and a channel is cached
    ChannelOpen,
}

struct Slots<T: BrokerConnection> {
    connection: Option<T>,
    channel: Option<Arc<T::Channel>>,
}

/// A named, lazily connected AMQP connection.
pub struct ConnectionHandle<C: Connector = LapinConnector> {
    alias: String,
    options: ConnectionOptions,
    config: ConnectionConfig,
    connector: C,
    slots: Mutex<Slots<C::Connection>>,
}

impl ConnectionHandle<LapinConnector> {
    /// Creates a lapin-backed handle from a raw option map.
    ///
    /// # Parameters
    /// * `alias` - Name under which surrounding code looks the connection up
    /// * `raw` - Raw connection options, merged over the defaults
    ///
    /// # Returns
    /// The handle, or an `AmqpError` when the options are invalid or an eager
    /// connection cannot be established
    ///
    /// # Example
    /// ```no_run
    /// # async fn run() -> Result<(), rabbitmq_connection::errors::AmqpError> {
    /// use rabbitmq_connection::handle::ConnectionHandle;
    /// use serde_json::{json, Map};
    ///
    /// let mut raw = Map::new();
    /// raw.insert("hostname".to_owned(), json!("rabbitmq"));
    ///
    /// let handle = ConnectionHandle::create_connection("default", &raw).await?;
    /// let channel = handle.channel().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn create_connection(
        alias: &str,
        raw: &Map<String, Value>,
    ) -> Result<Self, AmqpError> {
        Self::with_connector(alias, raw, LapinConnector).await
    }
}

impl<C: Connector> ConnectionHandle<C> {
    /// Creates a handle from a raw option map using the given connector.
    ///
    /// # Parameters
    /// * `alias` - Name of the connection
    /// * `raw` - Raw connection options
    /// * `connector` - Client used to create the underlying connection
    ///
    /// # Returns
    /// The handle, or an `AmqpError` on invalid options or eager connect failure
    pub async fn with_connector(
        alias: &str,
        raw: &Map<String, Value>,
        connector: C,
    ) -> Result<Self, AmqpError> {
        let options = ConnectionOptions::from_map(alias, raw)?;
        Self::new(alias, options, connector).await
    }

    /// Creates a handle from an already merged option set.
    ///
    /// When `options.lazy` is false the connection is established before
    /// returning and any failure is returned from here.
    pub async fn new(
        alias: &str,
        options: ConnectionOptions,
        connector: C,
    ) -> Result<Self, AmqpError> {
        if alias.is_empty() {
            return Err(AmqpError::EmptyAliasError);
        }

        options.validate()?;

        let handle = ConnectionHandle {
            alias: alias.to_owned(),
            config: ConnectionConfig::from(&options),
            options,
            connector,
            slots: Mutex::new(Slots {
                connection: None,
                channel: None,
            }),
        };

        if !handle.options.lazy {
            handle.connect().await?;
        }

        Ok(handle)
    }

    /// Returns the alias the handle was created with.
    pub fn alias_name(&self) -> &str {
        &self.alias
    }

    /// Returns the effective option set.
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Returns the configuration handed to the connector.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Reports whether a connection and a channel are currently cached.
    pub async fn state(&self) -> HandleState {
        let slots = self.slots.lock().await;

        match (&slots.connection, &slots.channel) {
            (None, _) => HandleState::Unopened,
            (Some(_), None) => HandleState::Connected,
            (Some(_), Some(_)) => HandleState::ChannelOpen,
        }
    }

    /// Creates the underlying connection if it does not exist yet.
    pub async fn connect(&self) -> Result<(), AmqpError> {
        let mut slots = self.slots.lock().await;
        self.connection(&mut slots).await.map(|_| ())
    }

    /// Returns the cached channel, opening one on first use.
    ///
    /// Repeated calls return the same `Arc` until [`reconnect`](Self::reconnect)
    /// invalidates it. Client failures are returned unchanged and leave the
    /// cache as it was.
    ///
    /// # Returns
    /// The channel on success or the client's `AmqpError` on failure
    pub async fn channel(&self) -> Result<Arc<ChannelOf<C>>, AmqpError> {
        let mut slots = self.slots.lock().await;

        if let Some(channel) = &slots.channel {
            return Ok(channel.clone());
        }

        let connection = self.connection(&mut slots).await?;

        debug!(alias = self.alias.as_str(), "creating amqp channel...");
        let channel = match connection.open_channel().await {
            Ok(c) => c,
            Err(err) => {
                error!(
                    alias = self.alias.as_str(),
                    error = err.to_string(),
                    "error to create the channel"
                );
                return Err(err);
            }
        };

        slots.channel = Some(channel.clone());

        Ok(channel)
    }

    /// Closes the current channel and reconnects the connection in place.
    ///
    /// The cached channel is dropped before anything else, so after a failed
    /// reconnect the handle keeps its connection but no channel. Nothing is
    /// retried.
    pub async fn reconnect(&self) -> Result<(), AmqpError> {
        let mut slots = self.slots.lock().await;
        slots.channel = None;

        let connection = self.connection(&mut slots).await?;

        debug!(alias = self.alias.as_str(), "reconnecting amqp connection...");
        if let Err(err) = connection.close_current_channel().await {
            error!(
                alias = self.alias.as_str(),
                error = err.to_string(),
                "failure to close the channel"
            );
            return Err(err);
        }

        match connection.reconnect().await {
            Ok(()) => {
                debug!(alias = self.alias.as_str(), "amqp reconnected");
                Ok(())
            }
            Err(err) => {
                error!(
                    alias = self.alias.as_str(),
                    error = err.to_string(),
                    "failure to reconnect"
                );
                Err(err)
            }
        }
    }

    async fn connection<'s>(
        &self,
        slots: &'s mut Slots<C::Connection>,
    ) -> Result<&'s mut C::Connection, AmqpError> {
        let connection = match slots.connection.take() {
            Some(c) => c,
            None => {
                debug!(
                    alias = self.alias.as_str(),
                    lazy = self.config.lazy,
                    "creating amqp connection..."
                );

                match self.connector.connect(&self.config).await {
                    Ok(c) => c,
                    Err(err) => {
                        error!(
                            alias = self.alias.as_str(),
                            error = err.to_string(),
                            "failure to connect"
                        );
                        return Err(err);
                    }
                }
            }
        };

        Ok(slots.connection.insert(connection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        connector::{MockBrokerConnection, MockConnector},
        options::ConnectionOptions,
    };
    use mockall::Sequence;
    use serde_json::json;

    fn raw(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn connection_with_channels() -> MockBrokerConnection {
        let mut connection = MockBrokerConnection::new();
        connection
            .expect_open_channel()
            .returning(|| Ok(Arc::new("channel".to_owned())));
        connection
    }

    fn connector_connecting_once() -> MockConnector {
        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .times(1)
            .returning(|_| Ok(connection_with_channels()));
        connector
    }

    #[tokio::test]
    async fn default_handle_is_lazy_and_unopened() {
        let mut connector = MockConnector::new();
        connector.expect_connect().never();

        let handle = ConnectionHandle::with_connector("default", &Map::new(), connector)
            .await
            .unwrap();

        assert_eq!(handle.alias_name(), "default");
        assert_eq!(handle.options(), &ConnectionOptions::default());
        assert_eq!(handle.state().await, HandleState::Unopened);
    }

    #[tokio::test]
    async fn supplied_options_override_defaults() {
        let mut connector = MockConnector::new();
        connector.expect_connect().never();

        let handle = ConnectionHandle::with_connector(
            "secure",
            &raw(json!({"secure": true, "ssl_verify": true, "port": 5671})),
            connector,
        )
        .await
        .unwrap();

        assert_eq!(
            handle.options(),
            &ConnectionOptions {
                port: 5671,
                secure: true,
                ssl_verify: true,
                ..ConnectionOptions::default()
            }
        );
        assert!(handle.config().secure);
        assert_eq!(handle.config().port, 5671);
    }

    #[tokio::test]
    async fn unknown_option_fails_construction() {
        let mut connector = MockConnector::new();
        connector.expect_connect().never();

        let result =
            ConnectionHandle::with_connector("bad", &raw(json!({"unknown_key": 1})), connector)
                .await;

        assert_eq!(
            result.err(),
            Some(AmqpError::UnknownOptionsError {
                alias: "bad".to_owned(),
                keys: vec!["unknown_key".to_owned()],
            })
        );
    }

    #[tokio::test]
    async fn empty_alias_is_rejected() {
        let mut connector = MockConnector::new();
        connector.expect_connect().never();

        let result = ConnectionHandle::new("", ConnectionOptions::default(), connector).await;

        assert_eq!(result.err(), Some(AmqpError::EmptyAliasError));
    }

    #[tokio::test]
    async fn eager_handle_connects_during_construction() {
        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .withf(|config| !config.lazy)
            .times(1)
            .returning(|_| Ok(connection_with_channels()));

        let handle =
            ConnectionHandle::with_connector("eager", &raw(json!({"lazy": false})), connector)
                .await
                .unwrap();

        assert_eq!(handle.state().await, HandleState::Connected);
    }

    #[tokio::test]
    async fn eager_connect_failure_is_fatal() {
        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .times(1)
            .returning(|_| Err(AmqpError::ConnectionError("connection refused".to_owned())));

        let result =
            ConnectionHandle::with_connector("eager", &raw(json!({"lazy": false})), connector)
                .await;

        assert_eq!(
            result.err(),
            Some(AmqpError::ConnectionError("connection refused".to_owned()))
        );
    }

    #[tokio::test]
    async fn channel_connects_on_first_use_and_is_reused() {
        let handle =
            ConnectionHandle::with_connector("default", &Map::new(), connector_connecting_once())
                .await
                .unwrap();

        let first = handle.channel().await.unwrap();
        let second = handle.channel().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(handle.state().await, HandleState::ChannelOpen);
    }

    #[tokio::test]
    async fn concurrent_first_access_creates_one_connection() {
        let handle =
            ConnectionHandle::with_connector("shared", &Map::new(), connector_connecting_once())
                .await
                .unwrap();

        let (first, second) = tokio::join!(handle.channel(), handle.channel());

        assert!(Arc::ptr_eq(&first.unwrap(), &second.unwrap()));
    }

    #[tokio::test]
    async fn channel_failure_leaves_cache_empty() {
        let mut connector = MockConnector::new();
        connector.expect_connect().times(1).returning(|_| {
            let mut connection = MockBrokerConnection::new();
            connection
                .expect_open_channel()
                .returning(|| Err(AmqpError::ChannelError("channel max reached".to_owned())));
            Ok(connection)
        });

        let handle = ConnectionHandle::with_connector("default", &Map::new(), connector)
            .await
            .unwrap();

        assert_eq!(
            handle.channel().await.err(),
            Some(AmqpError::ChannelError("channel max reached".to_owned()))
        );
        assert_eq!(handle.state().await, HandleState::Connected);
    }

    #[tokio::test]
    async fn reconnect_replaces_the_channel() {
        let mut connector = MockConnector::new();
        connector.expect_connect().times(1).returning(|_| {
            let mut seq = Sequence::new();
            let mut connection = connection_with_channels();
            connection
                .expect_close_current_channel()
                .times(1)
                .in_sequence(&mut seq)
                .returning(|| Ok(()));
            connection
                .expect_reconnect()
                .times(1)
                .in_sequence(&mut seq)
                .returning(|| Ok(()));
            Ok(connection)
        });

        let handle = ConnectionHandle::with_connector("default", &Map::new(), connector)
            .await
            .unwrap();

        let before = handle.channel().await.unwrap();
        handle.reconnect().await.unwrap();
        assert_eq!(handle.state().await, HandleState::Connected);

        let after = handle.channel().await.unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn failed_reconnect_keeps_connection_without_channel() {
        let mut connector = MockConnector::new();
        connector.expect_connect().times(1).returning(|_| {
            let mut connection = connection_with_channels();
            connection
                .expect_close_current_channel()
                .returning(|| Ok(()));
            connection
                .expect_reconnect()
                .returning(|| Err(AmqpError::ReconnectError("access refused".to_owned())));
            Ok(connection)
        });

        let handle = ConnectionHandle::with_connector("default", &Map::new(), connector)
            .await
            .unwrap();
        handle.channel().await.unwrap();

        assert_eq!(
            handle.reconnect().await.err(),
            Some(AmqpError::ReconnectError("access refused".to_owned()))
        );
        assert_eq!(handle.state().await, HandleState::Connected);
    }

    #[tokio::test]
    async fn reconnect_on_unopened_handle_connects_first() {
        let mut connector = MockConnector::new();
        connector.expect_connect().times(1).returning(|_| {
            let mut connection = MockBrokerConnection::new();
            connection
                .expect_close_current_channel()
                .times(1)
                .returning(|| Ok(()));
            connection.expect_reconnect().times(1).returning(|| Ok(()));
            Ok(connection)
        });

        let handle = ConnectionHandle::with_connector("default", &Map::new(), connector)
            .await
            .unwrap();

        handle.reconnect().await.unwrap();
        assert_eq!(handle.state().await, HandleState::Connected);
    }
}
