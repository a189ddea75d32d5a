//! Connection management for MongoDB
//!
//! Opens one pooled client per run and hands out record sources bound to
//! the configured database.

use bson::{Document, doc};
use mongodb::{Client, Collection, Database, options::ClientOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::error::{ExporterError, Result};
use crate::schema::Schema;
use crate::source::MongoRecordSource;

/// MongoDB connection manager
pub struct ConnectionManager {
    /// MongoDB client instance
    client: Option<Client>,

    /// Connection configuration
    config: ConnectionConfig,

    /// Current connection state
    state: Arc<RwLock<ConnectionState>>,
}

/// Connection state information
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,

    /// Currently connecting
    Connecting,

    /// Connected and ready
    Connected,

    /// Connection failed
    Failed(String),
}

impl ConnectionManager {
    /// Create a new connection manager
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            client: None,
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
        }
    }

    /// Establish connection to MongoDB and ping the server
    pub async fn connect(&mut self) -> Result<()> {
        self.set_state(ConnectionState::Connecting).await;

        match self.try_connect().await {
            Ok(client) => {
                self.client = Some(client);
                self.set_state(ConnectionState::Connected).await;
                info!("Connected to database '{}'", self.config.database);
                Ok(())
            }
            Err(e) => {
                self.set_state(ConnectionState::Failed(e.to_string())).await;
                Err(e)
            }
        }
    }

    async fn try_connect(&self) -> Result<Client> {
        let options = self.client_options().await?;
        let client = Client::with_options(options)?;

        let database = client.database(&self.config.database);
        database.run_command(doc! { "ping": 1 }).await?;
        debug!("Ping to {} succeeded", self.config.uri);

        Ok(client)
    }

    /// Parse the configured URI and apply pool and timeout settings
    async fn client_options(&self) -> Result<ClientOptions> {
        let mut options = ClientOptions::parse(&self.config.uri).await?;
        let timeout = Duration::from_secs(self.config.timeout);

        options.app_name = Some("pieces-exporter".to_string());
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);
        options.max_pool_size = Some(self.config.max_pool_size);

        Ok(options)
    }

    /// Close the client
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client.shutdown().await;
        }
        self.set_state(ConnectionState::Disconnected).await;
        Ok(())
    }

    /// Handle to the configured database
    pub fn database(&self) -> Result<Database> {
        let client = self.client.as_ref().ok_or_else(not_connected)?;
        Ok(client.database(&self.config.database))
    }

    /// Collection holding records of `schema`
    pub fn collection(&self, schema: &Schema) -> Result<Collection<Document>> {
        Ok(self.database()?.collection::<Document>(&schema.collection))
    }

    /// Record source over the records of `schema`
    pub fn record_source(&self, schema: &Schema) -> Result<MongoRecordSource> {
        let collection = self.collection(schema)?;
        Ok(MongoRecordSource::for_type(collection, &schema.name))
    }

    /// Get current connection state
    pub async fn get_state(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    /// Check if currently connected
    pub async fn is_connected(&self) -> bool {
        matches!(*self.state.read().await, ConnectionState::Connected)
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.state.write().await = state;
    }
}

fn not_connected() -> ExporterError {
    ExporterError::Generic("Not connected to MongoDB".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_manager_is_disconnected() {
        let manager = ConnectionManager::new(ConnectionConfig::default());
        assert_eq!(manager.get_state().await, ConnectionState::Disconnected);
        assert!(!manager.is_connected().await);
        assert!(manager.database().is_err());
    }

    #[tokio::test]
    async fn test_client_options_apply_config() {
        let config = ConnectionConfig {
            timeout: 5,
            max_pool_size: 4,
            ..ConnectionConfig::default()
        };
        let manager = ConnectionManager::new(config);
        let options = manager.client_options().await.unwrap();

        assert_eq!(options.connect_timeout, Some(Duration::from_secs(5)));
        assert_eq!(options.max_pool_size, Some(4));
        assert_eq!(options.app_name.as_deref(), Some("pieces-exporter"));
    }

    #[tokio::test]
    async fn test_unreachable_server_marks_failure() {
        let config = ConnectionConfig {
            uri: "mongodb://127.0.0.1:1".to_string(),
            timeout: 1,
            ..ConnectionConfig::default()
        };
        let mut manager = ConnectionManager::new(config);
        assert!(manager.connect().await.is_err());
        assert!(matches!(
            manager.get_state().await,
            ConnectionState::Failed(_)
        ));
    }
}
