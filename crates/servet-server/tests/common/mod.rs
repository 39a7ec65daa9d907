//! Common test utilities for integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use servet_server::{AppState, Server, ServerConfig};
use servet_session::{ManagerConfig, RateGuard, RateGuardConfig, SessionManager};

/// A test server that runs in the background.
pub struct TestServer {
    /// The server's address.
    pub addr: SocketAddr,
    /// HTTP client configured for this server.
    pub client: Client,
    /// Handle to the server task.
    _handle: JoinHandle<()>,
    /// Temporary directory for test data.
    pub temp_dir: TempDir,
}

/// Knobs for a test server.
pub struct TestOptions {
    pub only_one: bool,
    pub ttl: i64,
    pub sqlite: bool,
    pub rate_limit: Option<RateGuardConfig>,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            only_one: true,
            ttl: 60,
            sqlite: false,
            rate_limit: None,
        }
    }
}

impl TestServer {
    /// Start a new test server with default configuration.
    pub async fn start() -> Result<Self> {
        Self::start_with(TestOptions::default()).await
    }

    /// Start a new test server with the given options.
    pub async fn start_with(options: TestOptions) -> Result<Self> {
        let temp_dir = TempDir::new()?;

        // Find an available port
        let addr = find_available_port().await?;

        let mut manager_config = ManagerConfig::new("integration-secret")
            .with_only_one(options.only_one)
            .with_ttl(options.ttl);
        if options.sqlite {
            manager_config = manager_config.with_sqlite_path(temp_dir.path().join("sessions.db"));
        }
        let manager = SessionManager::new(manager_config).await?;

        let guard = RateGuard::new(options.rate_limit.unwrap_or_default())?;
        let config = ServerConfig::new()
            .with_bind_address(addr)
            .with_rate_limiting(options.rate_limit.is_some())
            .with_deny_message("Too many attempts")
            .with_request_logging(false);

        // Start server in background
        let server = Server::new(AppState::new(manager, guard, config));
        let handle = tokio::spawn(async move {
            let _ = server.run_until(addr, std::future::pending()).await;
        });

        // Wait for server to be ready
        let client = Client::new();
        wait_for_server(&client, addr).await?;

        Ok(Self {
            addr,
            client,
            _handle: handle,
            temp_dir,
        })
    }

    /// Get the base URL for the server.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// GET request builder.
    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(format!("{}{}", self.base_url(), path))
    }

    /// POST request builder.
    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.post(format!("{}{}", self.base_url(), path))
    }

    /// DELETE request builder.
    pub fn delete(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.delete(format!("{}{}", self.base_url(), path))
    }

    /// Check if server is healthy.
    pub async fn health(&self) -> Result<bool> {
        let resp = self.get("/health").send().await?;
        Ok(resp.status().is_success())
    }
}

/// Find an available port for the test server.
async fn find_available_port() -> Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

/// Wait for the server to become ready.
async fn wait_for_server(client: &Client, addr: SocketAddr) -> Result<()> {
    let url = format!("http://{}/health", addr);

    let result = timeout(Duration::from_secs(5), async {
        loop {
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await;

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_) => anyhow::bail!("Timeout waiting for server to start"),
    }
}
