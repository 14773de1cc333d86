//! Test server management.
//!
//! Spawns and manages icbd instances for integration testing.

use std::process::{Child, Command};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::time::sleep;

/// A test server instance.
pub struct TestServer {
    child: Child,
    port: u16,
    // Held so the config/database directory outlives the server.
    _data_dir: TempDir,
}

impl TestServer {
    /// Spawn a new test server on the given port.
    pub async fn spawn(port: u16) -> anyhow::Result<Self> {
        let data_dir = tempfile::tempdir()?;

        let config_path = data_dir.path().join("config.toml");
        let config_content = format!(
            r#"
[server]
name = "test.example.org"

[listen]
address = "127.0.0.1:{port}"

[groups]
default_group = "lobby"
default_topic = "Test lobby"

[timeouts]
ping_secs = 300
idle_move_secs = 3600
idle_disconnect_secs = 3600
moderator_idle_secs = 3600
away_notice_secs = 60
"#
        );
        std::fs::write(&config_path, config_content)?;

        let child = Command::new(env!("CARGO_BIN_EXE_icbd"))
            .arg("--config")
            .arg(&config_path)
            .spawn()?;

        let server = Self {
            child,
            port,
            _data_dir: data_dir,
        };
        server.wait_until_ready().await?;
        Ok(server)
    }

    /// The address clients should connect to.
    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        for _ in 0..50 {
            if TcpStream::connect(self.address()).await.is_ok() {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("server did not start listening on {}", self.address());
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
