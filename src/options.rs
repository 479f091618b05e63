// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Options
//!
//! This module defines the flat option set accepted for a named connection.
//! Options arrive as a raw key/value map (usually a section of a configuration
//! file), are checked against a fixed allow-list, and are merged key by key
//! over the defaults below. The resulting `ConnectionOptions` record is the
//! effective option set of a connection handle.

use crate::errors::AmqpError;
use serde::{de, Deserialize, Deserializer};
use serde_json::{Map, Value};
use tracing::error;

pub const DEFAULT_HOSTNAME: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5672;
pub const DEFAULT_USERNAME: &str = "guest";
pub const DEFAULT_PASSWORD: &str = "guest";
pub const DEFAULT_VHOST: &str = "/";
pub const DEFAULT_READ_WRITE_TIMEOUT: f64 = 3.0;
pub const DEFAULT_CONNECT_TIMEOUT: f64 = 3.0;
pub const DEFAULT_LOCALE: &str = "en_US";

/// Every option key a connection accepts.
pub const KNOWN_OPTIONS: [&str; 21] = [
    "hostname",
    "port",
    "username",
    "password",
    "vhost",
    "lazy",
    "insist",
    "read_write_timeout",
    "connect_timeout",
    "channel_rpc_timeout",
    "heartbeat",
    "keep_alive",
    "connection_name",
    "io_type",
    "secure",
    "ssl_crypto_method",
    "ssl_verify",
    "ssl_verify_name",
    "locale",
    "login_method",
    "login_response",
];

/// Transport used by the client to reach the broker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoType {
    #[default]
    Stream,
    Socket,
}

/// TLS protocol versions the client may negotiate.
///
/// Accepts either a name or the numeric stream crypto constant used by
/// existing configuration files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SslCryptoMethod {
    #[default]
    AnyClient,
    TlsV12Client,
    TlsV13Client,
}

pub const CRYPTO_METHOD_ANY_CLIENT: u64 = 63;
pub const CRYPTO_METHOD_TLSV1_2_CLIENT: u64 = 32;
pub const CRYPTO_METHOD_TLSV1_3_CLIENT: u64 = 64;

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCryptoMethod {
    Code(u64),
    Name(String),
}

impl<'de> Deserialize<'de> for SslCryptoMethod {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawCryptoMethod::deserialize(deserializer)? {
            RawCryptoMethod::Code(CRYPTO_METHOD_ANY_CLIENT) => Ok(SslCryptoMethod::AnyClient),
            RawCryptoMethod::Code(CRYPTO_METHOD_TLSV1_2_CLIENT) => {
                Ok(SslCryptoMethod::TlsV12Client)
            }
            RawCryptoMethod::Code(CRYPTO_METHOD_TLSV1_3_CLIENT) => {
                Ok(SslCryptoMethod::TlsV13Client)
            }
            RawCryptoMethod::Code(code) => Err(de::Error::custom(format!(
                "unsupported ssl_crypto_method `{code}`"
            ))),
            RawCryptoMethod::Name(name) => match name.as_str() {
                "any_client" => Ok(SslCryptoMethod::AnyClient),
                "tlsv1.2_client" => Ok(SslCryptoMethod::TlsV12Client),
                "tlsv1.3_client" => Ok(SslCryptoMethod::TlsV13Client),
                _ => Err(de::Error::unknown_variant(
                    &name,
                    &["any_client", "tlsv1.2_client", "tlsv1.3_client"],
                )),
            },
        }
    }
}

/// SASL mechanism used during the connection handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoginMethod {
    #[default]
    Amqplain,
    Plain,
    External,
}

/// The effective option set of a connection.
///
/// Every field maps one-to-one onto a key of [`KNOWN_OPTIONS`]. Timeouts are
/// expressed in seconds and may be fractional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
    pub lazy: bool,
    pub insist: bool,
    pub read_write_timeout: f64,
    pub connect_timeout: f64,
    pub channel_rpc_timeout: f64,
    pub heartbeat: u16,
    pub keep_alive: bool,
    pub connection_name: String,
    pub io_type: IoType,
    pub secure: bool,
    pub ssl_crypto_method: SslCryptoMethod,
    pub ssl_verify: bool,
    pub ssl_verify_name: bool,
    pub locale: String,
    pub login_method: LoginMethod,
    pub login_response: Option<String>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        ConnectionOptions {
            hostname: DEFAULT_HOSTNAME.to_owned(),
            port: DEFAULT_PORT,
            username: DEFAULT_USERNAME.to_owned(),
            password: DEFAULT_PASSWORD.to_owned(),
            vhost: DEFAULT_VHOST.to_owned(),
            lazy: true,
            insist: false,
            read_write_timeout: DEFAULT_READ_WRITE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            channel_rpc_timeout: 0.0,
            heartbeat: 0,
            keep_alive: false,
            connection_name: String::new(),
            io_type: IoType::default(),
            secure: false,
            ssl_crypto_method: SslCryptoMethod::default(),
            ssl_verify: false,
            ssl_verify_name: false,
            locale: DEFAULT_LOCALE.to_owned(),
            login_method: LoginMethod::default(),
            login_response: None,
        }
    }
}

impl ConnectionOptions {
    /// Builds the effective option set from a raw option map.
    ///
    /// Keys outside [`KNOWN_OPTIONS`] are rejected all at once; supplied keys
    /// override the defaults one by one and every other key keeps its default.
    ///
    /// # Parameters
    /// * `alias` - Name of the connection, used in error reports
    /// * `raw` - The raw option map
    ///
    /// # Returns
    /// The merged and validated options, or an `AmqpError` describing the
    /// unknown keys or the first ill-typed value
    pub fn from_map(alias: &str, raw: &Map<String, Value>) -> Result<Self, AmqpError> {
        let mut unknown: Vec<String> = raw
            .keys()
            .filter(|key| !KNOWN_OPTIONS.contains(&key.as_str()))
            .cloned()
            .collect();

        if !unknown.is_empty() {
            unknown.sort();
            error!(alias = alias, keys = ?unknown, "unknown connection options");
            return Err(AmqpError::UnknownOptionsError {
                alias: alias.to_owned(),
                keys: unknown,
            });
        }

        let options: ConnectionOptions = match serde_json::from_value(Value::Object(raw.clone()))
        {
            Ok(o) => Ok(o),
            Err(err) => {
                error!(alias = alias, error = err.to_string(), "invalid connection option");
                Err(AmqpError::InvalidOptionError(err.to_string()))
            }
        }?;

        options.validate()?;

        Ok(options)
    }

    /// Checks value ranges serde cannot express.
    pub fn validate(&self) -> Result<(), AmqpError> {
        for (key, seconds) in [
            ("read_write_timeout", self.read_write_timeout),
            ("connect_timeout", self.connect_timeout),
            ("channel_rpc_timeout", self.channel_rpc_timeout),
        ] {
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(AmqpError::InvalidOptionError(format!(
                    "`{key}` must be a non-negative number of seconds, got {seconds}"
                )));
            }
        }

        Ok(())
    }
}
