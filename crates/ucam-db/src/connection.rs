//! SurrealDB connection management.

use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws, Wss};
use surrealdb::opt::auth::Root;
use tracing::info;

use crate::error::DbError;
use crate::setup::{SetupStatus, ensure_setup};

/// Configuration for connecting to the warehouse store.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Endpoint, either `host:port` or a `ws://` / `wss://` URL.
    pub url: String,
    /// SurrealDB namespace.
    pub namespace: String,
    /// SurrealDB database name.
    pub database: String,
    /// Root username for authentication.
    pub username: String,
    /// Root password for authentication.
    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "127.0.0.1:8000".into(),
            namespace: "ucam".into(),
            database: "governance".into(),
            username: "root".into(),
            password: "root".into(),
        }
    }
}

impl DbConfig {
    /// Split the configured URL into (use TLS, bare address).
    fn endpoint(&self) -> (bool, &str) {
        let url = self.url.trim().trim_end_matches('/');
        if let Some(rest) = url.strip_prefix("wss://") {
            (true, rest)
        } else if let Some(rest) = url.strip_prefix("ws://") {
            (false, rest)
        } else {
            (false, url)
        }
    }
}

/// Owns the client handle shared by every repository.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Client>,
}

impl DbManager {
    /// Connect, sign in as root and select the namespace and database.
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        let (tls, address) = config.endpoint();
        info!(
            address = %address,
            tls,
            namespace = %config.namespace,
            database = %config.database,
            "Connecting to warehouse store"
        );

        let db = if tls {
            Surreal::new::<Wss>(address).await?
        } else {
            Surreal::new::<Ws>(address).await?
        };

        db.signin(Root {
            username: config.username.clone(),
            password: config.password.clone(),
        })
        .await?;

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;

        info!("Connected to warehouse store");

        Ok(Self { db })
    }

    /// Apply pending migrations and verify both application tables are
    /// readable.
    pub async fn prepare(&self) -> SetupStatus {
        ensure_setup(&self.db).await
    }

    /// Returns a reference to the underlying SurrealDB client.
    pub fn client(&self) -> &Surreal<Client> {
        &self.db
    }
}
