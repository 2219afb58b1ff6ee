//! Common test utilities - TabletopTest harness for end-to-end testing

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use serde_json::{json, Value};
use tabletop::events::MemorySink;
use tabletop::{Config, Server};
use tokio::task::JoinHandle;

/// Test harness that spawns a real tabletop server on a random port
pub struct TabletopTest {
    pub addr: SocketAddr,
    pub client: Client,
    pub events: Arc<MemorySink>,
    server: Arc<Server>,
    _handle: JoinHandle<()>,
}

impl TabletopTest {
    /// Start a new test server with an in-memory database
    pub async fn start() -> Result<Self> {
        Self::start_with_db(None).await
    }

    /// Start a new test server, optionally backed by a database file
    pub async fn start_with_db(db_path: Option<String>) -> Result<Self> {
        // Find a random available port
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        drop(listener);

        let config = Config {
            bind_addr: addr,
            db_path,
            ..Config::default()
        };

        let events = Arc::new(MemorySink::new());
        let server = Arc::new(Server::with_events(config, events.clone()).await?);
        let server_clone = server.clone();

        // Spawn the server in a background task
        let handle = tokio::spawn(async move {
            if let Err(e) = server_clone.run().await {
                eprintln!("Server error: {}", e);
            }
        });

        let client = Client::builder().timeout(Duration::from_secs(5)).build()?;

        // Poll until server is ready (max 2 seconds)
        let mut ready = false;
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if client
                .get(format!("http://{}/health", addr))
                .send()
                .await
                .is_ok()
            {
                ready = true;
                break;
            }
        }

        if !ready {
            panic!("Server failed to start within 2 seconds");
        }

        Ok(Self {
            addr,
            client,
            events,
            server,
            _handle: handle,
        })
    }

    /// Get the base URL for the server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        Ok(self
            .client
            .get(format!("{}{}", self.base_url(), path))
            .send()
            .await?)
    }

    /// Make a POST request with JSON body
    pub async fn post<T: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(format!("{}{}", self.base_url(), path))
            .json(body)
            .send()
            .await?)
    }

    /// POST and decode the JSON body, asserting the status
    pub async fn post_expect(&self, path: &str, body: &Value, status: u16) -> Result<Value> {
        let resp = self.post(path, body).await?;
        let actual = resp.status().as_u16();
        let body: Value = resp.json().await?;
        assert_eq!(actual, status, "unexpected status for {}: {}", path, body);
        Ok(body)
    }

    /// Get direct access to the database for test setup/assertions
    pub fn db(&self) -> Arc<tabletop::db::Database> {
        self.server.db()
    }

    /// Shutdown the server gracefully
    pub fn shutdown(&self) {
        self.server.shutdown();
    }

    /// Start a combat from `(name, side, stats)` triples and return the response
    pub async fn start_combat(&self, campaign_id: &str, roster: &[(&str, &str, Value)]) -> Result<Value> {
        let roster: Vec<Value> = roster
            .iter()
            .map(|(name, side, stats)| json!({"name": name, "side": side, "stats": stats}))
            .collect();
        self.post_expect(
            "/combat/start",
            &json!({"campaign_id": campaign_id, "roster": roster}),
            201,
        )
        .await
    }
}

impl Drop for TabletopTest {
    fn drop(&mut self) {
        self.server.shutdown();
    }
}
