use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use precinct_domain::ports::BoxFuture;
use precinct_domain::ports::db::{DbAdapter, DbError};
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use tokio::net::TcpStream;
use tokio::time::timeout;
use url::Url;

use crate::config::AppConfig;

const HEALTH_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl DbConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            endpoint: config.surreal_endpoint.clone(),
            namespace: config.surreal_ns.clone(),
            database: config.surreal_db.clone(),
            username: config.surreal_user.clone(),
            password: config.surreal_pass.clone(),
        }
    }
}

/// Opens one websocket session, signs in as root and selects ns/db. The
/// returned handle is shared by every store built on it.
pub async fn connect(db_config: &DbConfig) -> anyhow::Result<Arc<Surreal<Client>>> {
    let db = Surreal::<Client>::init();
    db.connect::<Ws>(&db_config.endpoint)
        .await
        .with_context(|| format!("connect surrealdb endpoint {}", db_config.endpoint))?;
    db.signin(Root {
        username: db_config.username.clone(),
        password: db_config.password.clone(),
    })
    .await?;
    db.use_ns(&db_config.namespace)
        .use_db(&db_config.database)
        .await?;
    tracing::info!(
        endpoint = %db_config.endpoint,
        namespace = %db_config.namespace,
        database = %db_config.database,
        "connected to surrealdb"
    );
    Ok(Arc::new(db))
}

#[derive(Debug, Clone)]
pub struct SurrealAdapter {
    config: DbConfig,
}

impl SurrealAdapter {
    pub fn new(config: DbConfig) -> Self {
        Self { config }
    }
}

impl DbAdapter for SurrealAdapter {
    fn name(&self) -> &'static str {
        "surrealdb"
    }

    fn health_check(&self) -> BoxFuture<'_, Result<(), DbError>> {
        let endpoint = self.config.endpoint.clone();
        Box::pin(async move {
            let address = parse_socket_address(&endpoint)?;
            let connect = timeout(HEALTH_CONNECT_TIMEOUT, TcpStream::connect(address))
                .await
                .map_err(|_| {
                    DbError::Unavailable("surreal endpoint connect timed out".to_string())
                })?;
            connect.map_err(|err| {
                DbError::Unavailable(format!("surreal endpoint connect failed: {err}"))
            })?;
            tracing::debug!(endpoint, "surreal health check succeeded");
            Ok(())
        })
    }
}

fn parse_socket_address(endpoint: &str) -> Result<String, DbError> {
    let normalized = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("ws://{endpoint}")
    };
    let parsed = Url::parse(&normalized).map_err(|err| {
        DbError::InvalidEndpoint(format!("'{endpoint}': {err}"))
    })?;

    let host = parsed
        .host_str()
        .ok_or_else(|| DbError::InvalidEndpoint(format!("missing host in '{endpoint}'")))?;
    let port = parsed
        .port()
        .unwrap_or(match parsed.scheme() {
            "wss" | "https" => 443,
            _ => 8000,
        });
    Ok(format!("{host}:{port}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_address_defaults_port_by_scheme() {
        assert_eq!(
            parse_socket_address("ws://db.internal").expect("addr"),
            "db.internal:8000"
        );
        assert_eq!(
            parse_socket_address("wss://db.internal").expect("addr"),
            "db.internal:443"
        );
        assert_eq!(
            parse_socket_address("127.0.0.1:9000").expect("addr"),
            "127.0.0.1:9000"
        );
    }

    #[test]
    fn socket_address_rejects_garbage() {
        assert!(matches!(
            parse_socket_address("ws://"),
            Err(DbError::InvalidEndpoint(_))
        ));
    }
}
