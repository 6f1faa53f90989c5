#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use wiremock::{Mock, MockServer, Request};

pub const TEST_KEY: &str = "test-key-0123456789";

/// Mock Bing API. The runtime keeps the server alive while blocking
/// clients (and the `bwm` binary) talk to it from the test thread.
pub struct MockApi {
    pub server: MockServer,
    rt: Runtime,
}

impl MockApi {
    pub fn start() -> Self {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("build tokio runtime");
        let server = rt.block_on(MockServer::start());
        Self { server, rt }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn mount(&self, mock: Mock) {
        self.rt.block_on(mock.mount(&self.server));
    }

    pub fn received(&self) -> Vec<Request> {
        self.rt
            .block_on(self.server.received_requests())
            .unwrap_or_default()
    }
}

/// Isolated config directory and environment for one CLI run.
pub struct TestEnv {
    _tmp: TempDir,
    pub config_dir: PathBuf,
    base_url: String,
}

impl TestEnv {
    pub fn new() -> Self {
        // Nothing listens on the discard port; calls fail fast if they leak.
        Self::with_base_url("http://127.0.0.1:9".to_string())
    }

    pub fn with_api(api: &MockApi) -> Self {
        Self::with_base_url(api.uri())
    }

    fn with_base_url(base_url: String) -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let config_dir = tmp.path().join("bwm");
        Self {
            _tmp: tmp,
            config_dir,
            base_url,
        }
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("bwm").expect("bwm binary");
        cmd.env_remove("BING_WEBMASTER_API_KEY")
            .env_remove("BWM_CREDENTIALS_FILE")
            .env_remove("BWM_APP_CONFIG_FILE")
            .env_remove("BWM_TIMEOUT_SECS")
            .env_remove("BWM_LOG")
            .env("BWM_CONFIG_DIR", &self.config_dir)
            .env("BWM_API_BASE_URL", &self.base_url);
        cmd
    }

    /// Same as `cmd`, with the API key supplied through the environment.
    pub fn authed_cmd(&self) -> Command {
        let mut cmd = self.cmd();
        cmd.env("BING_WEBMASTER_API_KEY", TEST_KEY);
        cmd
    }

    pub fn credentials_file(&self) -> PathBuf {
        self.config_dir.join("credentials.json")
    }

    pub fn write_file(&self, name: &str, contents: &str) -> PathBuf {
        fs::create_dir_all(&self.config_dir).expect("create config dir");
        let path = self.config_dir.join(name);
        fs::write(&path, contents).expect("write fixture file");
        path
    }

    pub fn run_json(&self, cmd: &mut Command) -> serde_json::Value {
        let out = cmd.assert().success().get_output().stdout.clone();
        serde_json::from_slice(&out).expect("valid json output")
    }
}
