//! tabletop - tabletop session daemon
//!
//! Seeded dice, initiative and combat tracking, encounters and random tables
//! for a campaign, served over HTTP with SQLite storage.

pub mod api;
pub mod combat;
pub mod config;
pub mod db;
pub mod dice;
pub mod encounter;
pub mod error;
pub mod events;
pub mod tables;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

pub use config::{Config, LogFormat};
use db::Database;
use events::{EventSink, LogSink};

/// The tabletop server instance
pub struct Server {
    config: Config,
    db: Arc<Database>,
    events: Arc<dyn EventSink>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Server {
    /// Create a new server that publishes events to the log
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_events(config, Arc::new(LogSink)).await
    }

    /// Create a new server with a custom event sink
    pub async fn with_events(config: Config, events: Arc<dyn EventSink>) -> Result<Self> {
        let db = Database::new(config.db_path.as_deref()).await?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            db: Arc::new(db),
            events,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Get the database handle
    pub fn db(&self) -> Arc<Database> {
        self.db.clone()
    }

    /// Build the router
    fn router(&self) -> Router {
        api::router(self.db.clone(), self.events.clone())
    }

    /// Run the server until shutdown
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("tabletop listening on {}", local_addr);

        let router = self.router();
        let mut shutdown_rx = self.shutdown_rx.clone();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_rx.changed().await.ok();
            })
            .await?;

        info!("tabletop shutdown complete");
        Ok(())
    }

    /// Signal the server to shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}
