// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Configuration
//!
//! Translation of the effective `ConnectionOptions` into the configuration
//! handed to the AMQP client. Optional string fields that are empty in the
//! options are omitted here instead of being forwarded as empty values.

use crate::options::{ConnectionOptions, IoType, LoginMethod, SslCryptoMethod};
use std::time::Duration;

/// Configuration consumed by a [`Connector`](crate::connector::Connector).
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
    pub io_type: IoType,
    pub connection_name: Option<String>,
    pub connection_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub channel_rpc_timeout: Duration,
    pub keepalive: bool,
    pub heartbeat: u16,
    pub secure: bool,
    pub ssl_crypto_method: SslCryptoMethod,
    pub ssl_verify: bool,
    pub ssl_verify_name: bool,
    pub lazy: bool,
    pub insist: bool,
    pub locale: Option<String>,
    pub login_method: LoginMethod,
    pub login_response: Option<String>,
}

impl From<&ConnectionOptions> for ConnectionConfig {
    fn from(options: &ConnectionOptions) -> Self {
        let read_write_timeout = seconds(options.read_write_timeout);

        ConnectionConfig {
            host: options.hostname.clone(),
            port: options.port,
            user: options.username.clone(),
            password: options.password.clone(),
            vhost: options.vhost.clone(),
            io_type: options.io_type,
            connection_name: non_empty(Some(&options.connection_name)),
            connection_timeout: seconds(options.connect_timeout),
            read_timeout: read_write_timeout,
            write_timeout: read_write_timeout,
            channel_rpc_timeout: seconds(options.channel_rpc_timeout),
            keepalive: options.keep_alive,
            heartbeat: options.heartbeat,
            secure: options.secure,
            ssl_crypto_method: options.ssl_crypto_method,
            ssl_verify: options.ssl_verify,
            ssl_verify_name: options.ssl_verify_name,
            lazy: options.lazy,
            insist: options.insist,
            locale: non_empty(Some(&options.locale)),
            login_method: options.login_method,
            login_response: non_empty(options.login_response.as_ref()),
        }
    }
}

// Negative or non-finite values are rejected by `ConnectionOptions::validate`.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}
