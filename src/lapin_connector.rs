// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Lapin-backed Connector
//!
//! This module implements the client seam on top of `lapin`. It builds the
//! AMQP URI and connection properties from a `ConnectionConfig`, defers the
//! network handshake for lazy connections, and bounds channel RPCs with the
//! configured channel timeout.

use crate::{
    config::ConnectionConfig,
    connector::{BrokerConnection, Connector},
    errors::AmqpError,
    options::{LoginMethod, SslCryptoMethod},
};
use async_trait::async_trait;
use lapin::{
    types::LongString,
    uri::{AMQPAuthority, AMQPQueryString, AMQPScheme, AMQPUri, AMQPUserInfo, SASLMechanism},
    Channel, Connection, ConnectionProperties,
};
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, error, warn};

/// Reply code sent when closing channels and connections normally
pub const REPLY_SUCCESS: u16 = 200;

/// Connector producing [`LapinConnection`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct LapinConnector;

#[async_trait]
impl Connector for LapinConnector {
    type Connection = LapinConnection;

    /// Creates a lapin connection.
    ///
    /// A lazy configuration returns immediately without touching the network;
    /// otherwise the handshake is performed before returning.
    ///
    /// # Parameters
    /// * `config` - The translated connection configuration
    ///
    /// # Returns
    /// The connection on success or `AmqpError::ConnectionError` on failure
    async fn connect(&self, config: &ConnectionConfig) -> Result<LapinConnection, AmqpError> {
        let mut connection = LapinConnection::new(config.clone());

        if !config.lazy {
            connection.link().await?;
        }

        Ok(connection)
    }
}

/// A lapin connection together with the channel it opened last.
pub struct LapinConnection {
    config: ConnectionConfig,
    connection: Option<Connection>,
    current_channel: Option<Arc<Channel>>,
}

impl LapinConnection {
    /// Creates an unlinked connection for the given configuration.
    ///
    /// # Parameters
    /// * `config` - The translated connection configuration
    ///
    /// # Returns
    /// A new LapinConnection that has not performed any network I/O
    pub fn new(config: ConnectionConfig) -> Self {
        report_unsupported(&config);

        LapinConnection {
            config,
            connection: None,
            current_channel: None,
        }
    }

    /// Returns true once the handshake has completed and the link is still up.
    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| c.status().connected())
    }

    async fn link(&mut self) -> Result<&Connection, AmqpError> {
        let connection = match self.connection.take() {
            Some(c) => c,
            None => self.open().await?,
        };

        Ok(self.connection.insert(connection))
    }

    async fn open(&self) -> Result<Connection, AmqpError> {
        debug!(
            host = self.config.host.as_str(),
            port = self.config.port,
            "creating amqp connection..."
        );

        match Connection::connect_uri(amqp_uri(&self.config), connection_properties(&self.config))
            .await
        {
            Ok(c) => {
                debug!("amqp connected");
                Ok(c)
            }
            Err(err) => {
                error!(error = err.to_string(), "failure to connect");
                Err(AmqpError::ConnectionError(err.to_string()))
            }
        }
    }
}

#[async_trait]
impl BrokerConnection for LapinConnection {
    type Channel = Channel;

    async fn open_channel(&mut self) -> Result<Arc<Channel>, AmqpError> {
        let limit = self.config.channel_rpc_timeout;
        let connection = self.link().await?;

        debug!("creating amqp channel...");
        let channel = match within(limit, connection.create_channel()).await {
            Ok(c) => {
                debug!("channel created");
                Arc::new(c)
            }
            Err(err) => {
                error!(error = err.as_str(), "error to create the channel");
                return Err(AmqpError::ChannelError(err));
            }
        };

        self.current_channel = Some(channel.clone());

        Ok(channel)
    }

    async fn close_current_channel(&mut self) -> Result<(), AmqpError> {
        let Some(channel) = self.current_channel.take() else {
            return Ok(());
        };

        if !channel.status().connected() {
            return Ok(());
        }

        debug!(channel = channel.id(), "closing amqp channel...");
        match within(
            self.config.channel_rpc_timeout,
            channel.close(REPLY_SUCCESS, "OK"),
        )
        .await
        {
            Ok(()) => Ok(()),
            Err(err) => {
                error!(error = err.as_str(), "failure to close the channel");
                Err(AmqpError::CloseChannelError(err))
            }
        }
    }

    async fn reconnect(&mut self) -> Result<(), AmqpError> {
        self.current_channel = None;

        if let Some(previous) = self.connection.take() {
            if previous.status().connected() {
                if let Err(err) = previous.close(REPLY_SUCCESS, "OK").await {
                    warn!(error = err.to_string(), "failure to close the previous connection");
                }
            }
        }

        debug!("reconnecting...");
        let connection = match self.open().await {
            Ok(c) => c,
            Err(AmqpError::ConnectionError(msg)) => return Err(AmqpError::ReconnectError(msg)),
            Err(err) => return Err(err),
        };
        self.connection = Some(connection);

        Ok(())
    }
}

/// Builds the lapin URI for a configuration.
pub(crate) fn amqp_uri(config: &ConnectionConfig) -> AMQPUri {
    AMQPUri {
        scheme: if config.secure {
            AMQPScheme::AMQPS
        } else {
            AMQPScheme::AMQP
        },
        authority: AMQPAuthority {
            userinfo: AMQPUserInfo {
                username: config.user.clone(),
                password: config.password.clone(),
            },
            host: config.host.clone(),
            port: config.port,
        },
        vhost: config.vhost.clone(),
        query: AMQPQueryString {
            heartbeat: Some(config.heartbeat),
            connection_timeout: millis(config.connection_timeout),
            auth_mechanism: Some(sasl_mechanism(config.login_method)),
            ..AMQPQueryString::default()
        },
    }
}

fn connection_properties(config: &ConnectionConfig) -> ConnectionProperties {
    let mut properties = ConnectionProperties::default();

    if let Some(name) = &config.connection_name {
        properties = properties.with_connection_name(LongString::from(name.clone()));
    }

    if let Some(locale) = &config.locale {
        properties.locale = locale.clone();
    }

    properties
}

fn sasl_mechanism(method: LoginMethod) -> SASLMechanism {
    match method {
        LoginMethod::Amqplain => SASLMechanism::AMQPlain,
        LoginMethod::Plain => SASLMechanism::Plain,
        LoginMethod::External => SASLMechanism::External,
    }
}

fn millis(timeout: Duration) -> Option<u64> {
    if timeout.is_zero() {
        None
    } else {
        Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX))
    }
}

// A zero limit waits for the broker indefinitely.
async fn within<T>(
    limit: Duration,
    operation: impl Future<Output = lapin::Result<T>>,
) -> Result<T, String> {
    if limit.is_zero() {
        return operation.await.map_err(|err| err.to_string());
    }

    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result.map_err(|err| err.to_string()),
        Err(_) => Err(format!("no reply from the broker within {limit:?}")),
    }
}

fn report_unsupported(config: &ConnectionConfig) {
    if config.secure && config.ssl_crypto_method != SslCryptoMethod::AnyClient {
        warn!(
            method = ?config.ssl_crypto_method,
            "lapin negotiates the TLS version itself, ssl_crypto_method is not enforced"
        );
    }

    if config.login_response.is_some() {
        warn!("lapin builds the SASL response from the credentials, login_response is ignored");
    }

    debug!(
        read_timeout = ?config.read_timeout,
        write_timeout = ?config.write_timeout,
        keepalive = config.keepalive,
        insist = config.insist,
        io_type = ?config.io_type,
        ssl_verify = config.ssl_verify,
        ssl_verify_name = config.ssl_verify_name,
        "options left to the lapin transport defaults"
    );
}
