// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for RabbitMQ Connections
//!
//! This module provides the error type shared by every connection operation.
//! The `AmqpError` enum groups two families of failures: configuration errors,
//! raised while a connection handle is being built from its options, and
//! connectivity errors, raised by the AMQP client while connecting, opening
//! or closing channels, or reconnecting.

use thiserror::Error;

/// Represents errors that can occur while configuring or using a RabbitMQ connection.
///
/// Configuration variants are raised synchronously at construction time and are
/// never retried. Connectivity variants carry the message reported by the AMQP
/// client and are propagated to the caller unchanged.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// The connection alias was empty
    #[error("connection alias must not be empty")]
    EmptyAliasError,

    /// The option map contained keys outside the recognized set
    #[error("cannot create connection `{alias}`, received unknown arguments: {}", .keys.join(", "))]
    UnknownOptionsError { alias: String, keys: Vec<String> },

    /// A recognized option carried a value of the wrong type or out of range
    #[error("invalid connection option: {0}")]
    InvalidOptionError(String),

    /// No connection is registered under the given alias
    #[error("unknown connection `{0}`")]
    UnknownConnectionError(String),

    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect `{0}`")]
    ConnectionError(String),

    /// Error creating a channel from an established connection
    #[error("failure to create a channel `{0}`")]
    ChannelError(String),

    /// Error closing the current channel
    #[error("failure to close the channel `{0}`")]
    CloseChannelError(String),

    /// Error re-establishing the connection
    #[error("failure to reconnect `{0}`")]
    ReconnectError(String),
}

impl AmqpError {
    /// Returns true for errors raised while validating connection options.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AmqpError::EmptyAliasError
                | AmqpError::UnknownOptionsError { .. }
                | AmqpError::InvalidOptionError(_)
                | AmqpError::UnknownConnectionError(_)
        )
    }

    /// Returns true for errors reported by the AMQP client.
    pub fn is_connectivity(&self) -> bool {
        !self.is_configuration()
    }
}
