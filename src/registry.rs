// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Registry
//!
//! Builds every connection handle declared in a `connections` configuration
//! section and serves them by alias to the rest of the application.

use crate::{
    connector::Connector, errors::AmqpError, handle::ConnectionHandle,
    lapin_connector::LapinConnector,
};
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, error};

/// Named connection handles, keyed by alias.
pub struct ConnectionRegistry<C: Connector = LapinConnector> {
    connections: HashMap<String, Arc<ConnectionHandle<C>>>,
}

impl ConnectionRegistry<LapinConnector> {
    /// Builds lapin-backed handles for every entry of a `connections` section.
    ///
    /// # Parameters
    /// * `section` - A JSON object mapping each alias to its raw options
    ///
    /// # Returns
    /// The registry, or the first `AmqpError` raised while building a handle
    pub async fn from_config(section: &Value) -> Result<Self, AmqpError> {
        Self::with_connector(section, || LapinConnector).await
    }
}

impl<C: Connector> ConnectionRegistry<C> {
    /// Builds handles for every entry of a `connections` section.
    ///
    /// Eager entries (`lazy: false`) connect while the registry is built.
    ///
    /// # Parameters
    /// * `section` - A JSON object mapping each alias to its raw options
    /// * `connector` - Produces the connector of each handle
    pub async fn with_connector<F>(section: &Value, mut connector: F) -> Result<Self, AmqpError>
    where
        F: FnMut() -> C,
    {
        let Value::Object(entries) = section else {
            error!("connections section is not an object");
            return Err(AmqpError::InvalidOptionError(
                "connections section must be an object".to_owned(),
            ));
        };

        let mut connections = HashMap::with_capacity(entries.len());

        for (alias, options) in entries {
            let Value::Object(raw) = options else {
                error!(alias = alias.as_str(), "connection options are not an object");
                return Err(AmqpError::InvalidOptionError(format!(
                    "options of connection `{alias}` must be an object"
                )));
            };

            debug!(alias = alias.as_str(), "registering amqp connection");
            let handle = ConnectionHandle::with_connector(alias, raw, connector()).await?;
            connections.insert(alias.clone(), Arc::new(handle));
        }

        Ok(ConnectionRegistry { connections })
    }

    /// Returns the handle registered under `alias`.
    pub fn get(&self, alias: &str) -> Result<Arc<ConnectionHandle<C>>, AmqpError> {
        match self.connections.get(alias) {
            Some(handle) => Ok(handle.clone()),
            None => Err(AmqpError::UnknownConnectionError(alias.to_owned())),
        }
    }

    /// Lists the registered aliases, sorted.
    pub fn aliases(&self) -> Vec<&str> {
        let mut aliases: Vec<&str> = self.connections.keys().map(String::as_str).collect();
        aliases.sort_unstable();
        aliases
    }
}
