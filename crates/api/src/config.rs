use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ledgerscan_core::jobs::{PipelineStep, STEP_META, STEP_TX};
use ledgerscan_core::runner::{RunnerError, ToolSpec};
use ledgerscan_core::supervisor::{
    LaunchSpec, ServerArgs, SupervisorSettings, DEFAULT_PROBE_TIMEOUT,
};

use crate::auth::jwt::JwtConfig;

/// Executable names never treated as a running server when stopping it.
const HELPER_PROCESS_NAMES: &[&str] = &["pgrep", "pkill", "ps"];

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for in-flight jobs, in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    pub jwt: JwtConfig,
    pub ocr: OcrConfig,
    pub llm: LlmServerConfig,
    /// Admin account created at start-up when it does not exist yet.
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    /// | `DATA_DIR`             | `./data`                   |
    ///
    /// See [`JwtConfig::from_env`], [`OcrConfig::from_env`], and
    /// [`LlmServerConfig::from_env`] for the remaining variables.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env_or("PORT", 3000);

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = env_or("REQUEST_TIMEOUT_SECS", 30);
        let shutdown_timeout_secs: u64 = env_or("SHUTDOWN_TIMEOUT_SECS", 30);

        let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".into()));

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            jwt: JwtConfig::from_env(),
            ocr: OcrConfig::from_env(&data_dir),
            llm: LlmServerConfig::from_env(&data_dir),
            bootstrap_admin: BootstrapAdmin::from_env(),
        }
    }
}

/// OCR pipeline settings.
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// Preprocessed image every job reads.
    pub input_image: PathBuf,
    /// Job store directory.
    pub results_dir: PathBuf,
    /// Command line of the statement-metadata tool.
    pub meta_command: String,
    /// Command line of the transaction-table tool.
    pub tx_command: String,
    /// Per-step wall-clock limit.
    pub step_timeout_secs: u64,
}

impl OcrConfig {
    /// | Env Var                 | Default                 |
    /// |-------------------------|-------------------------|
    /// | `OCR_INPUT_IMAGE`       | `$DATA_DIR/temp.png`    |
    /// | `OCR_RESULTS_DIR`       | `$DATA_DIR/results`     |
    /// | `OCR_META_COMMAND`      | `python3 ocr_meta.py`   |
    /// | `OCR_TX_COMMAND`        | `python3 ocr_tx.py`     |
    /// | `OCR_STEP_TIMEOUT_SECS` | `600`                   |
    pub fn from_env(data_dir: &Path) -> Self {
        Self {
            input_image: env_path("OCR_INPUT_IMAGE", data_dir.join("temp.png")),
            results_dir: env_path("OCR_RESULTS_DIR", data_dir.join("results")),
            meta_command: std::env::var("OCR_META_COMMAND")
                .unwrap_or_else(|_| "python3 ocr_meta.py".into()),
            tx_command: std::env::var("OCR_TX_COMMAND")
                .unwrap_or_else(|_| "python3 ocr_tx.py".into()),
            step_timeout_secs: env_or("OCR_STEP_TIMEOUT_SECS", 600),
        }
    }

    /// The ordered pipeline: metadata first, then transactions.
    pub fn pipeline_steps(&self) -> Result<Vec<PipelineStep>, RunnerError> {
        let timeout = Duration::from_secs(self.step_timeout_secs);
        Ok(vec![
            PipelineStep::new(
                STEP_META,
                "metadata",
                ToolSpec::from_command_line("ocr_meta", &self.meta_command, timeout)?,
            ),
            PipelineStep::new(
                STEP_TX,
                "transactions",
                ToolSpec::from_command_line("ocr_tx", &self.tx_command, timeout)?,
            ),
        ])
    }
}

/// Local llama-server settings.
#[derive(Debug, Clone)]
pub struct LlmServerConfig {
    /// Base URL chat requests are relayed to.
    pub url: String,
    /// Host probed for liveness, taken from `url`.
    pub host: String,
    /// Port probed for liveness and passed to the server, taken from `url`.
    pub port: u16,
    pub executable: String,
    pub process_name: String,
    pub startup_grace_secs: u64,
    pub stop_grace_secs: u64,
    pub model_path: PathBuf,
    pub n_gpu_layers: u32,
    pub context_size: u32,
    pub batch_size: u32,
    pub ubatch_size: u32,
    pub cache_type_k: String,
    pub cache_type_v: String,
    pub flash_attn: bool,
    pub mlock: bool,
}

impl LlmServerConfig {
    /// | Env Var                         | Default                              |
    /// |---------------------------------|--------------------------------------|
    /// | `LLM_SERVER_URL`                | `http://127.0.0.1:4000`              |
    /// | `LLM_SERVER_EXECUTABLE`         | `llama-server`                       |
    /// | `LLM_SERVER_PROCESS_NAME`       | `llama-server`                       |
    /// | `LLM_SERVER_STARTUP_GRACE_SECS` | `5`                                  |
    /// | `LLM_SERVER_STOP_GRACE_SECS`    | `5`                                  |
    /// | `MODEL_PATH`                    | `$DATA_DIR/gemma-3-4b-it-Q5_K_M.gguf`|
    /// | `N_GPU_LAYERS`                  | `48`                                 |
    /// | `CONTEXT_SIZE`                  | `8192`                               |
    /// | `BATCH_SIZE`                    | `512`                                |
    /// | `UBATCH_SIZE`                   | `128`                                |
    /// | `CACHE_TYPE_K` / `CACHE_TYPE_V` | `q5_1`                               |
    /// | `FLASH_ATTN`                    | `1`                                  |
    /// | `MLOCK`                         | `1`                                  |
    ///
    /// # Panics
    ///
    /// Panics if `LLM_SERVER_URL` is not an absolute URL with a host.
    pub fn from_env(data_dir: &Path) -> Self {
        let url =
            std::env::var("LLM_SERVER_URL").unwrap_or_else(|_| "http://127.0.0.1:4000".into());
        let (host, port) = probe_target(&url)
            .unwrap_or_else(|| panic!("LLM_SERVER_URL '{url}' must be an absolute URL with a host"));

        Self {
            url: url.trim_end_matches('/').to_string(),
            host,
            port,
            executable: std::env::var("LLM_SERVER_EXECUTABLE")
                .unwrap_or_else(|_| "llama-server".into()),
            process_name: std::env::var("LLM_SERVER_PROCESS_NAME")
                .unwrap_or_else(|_| "llama-server".into()),
            startup_grace_secs: env_or("LLM_SERVER_STARTUP_GRACE_SECS", 5),
            stop_grace_secs: env_or("LLM_SERVER_STOP_GRACE_SECS", 5),
            model_path: env_path("MODEL_PATH", data_dir.join("gemma-3-4b-it-Q5_K_M.gguf")),
            n_gpu_layers: env_or("N_GPU_LAYERS", 48),
            context_size: env_or("CONTEXT_SIZE", 8192),
            batch_size: env_or("BATCH_SIZE", 512),
            ubatch_size: env_or("UBATCH_SIZE", 128),
            cache_type_k: std::env::var("CACHE_TYPE_K").unwrap_or_else(|_| "q5_1".into()),
            cache_type_v: std::env::var("CACHE_TYPE_V").unwrap_or_else(|_| "q5_1".into()),
            flash_attn: env_flag("FLASH_ATTN", true),
            mlock: env_flag("MLOCK", true),
        }
    }

    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            host: self.host.clone(),
            port: self.port,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            startup_grace: Duration::from_secs(self.startup_grace_secs),
            stop_grace: Duration::from_secs(self.stop_grace_secs),
            process_name: self.process_name.clone(),
            exclude_names: HELPER_PROCESS_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn launch_spec(&self) -> LaunchSpec {
        let args = ServerArgs {
            model_path: self.model_path.clone(),
            port: self.port,
            n_gpu_layers: self.n_gpu_layers,
            context_size: self.context_size,
            batch_size: self.batch_size,
            ubatch_size: self.ubatch_size,
            cache_type_k: self.cache_type_k.clone(),
            cache_type_v: self.cache_type_v.clone(),
            flash_attn: self.flash_attn,
            mlock: self.mlock,
        };

        LaunchSpec {
            program: self.executable.clone(),
            args: args.to_args(),
            model_path: Some(self.model_path.clone()),
        }
    }

    /// Upstream chat-completions endpoint.
    pub fn chat_completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.url)
    }
}

/// Credentials for the start-up admin account.
#[derive(Clone)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl BootstrapAdmin {
    /// Read `BOOTSTRAP_ADMIN_USERNAME` and `BOOTSTRAP_ADMIN_PASSWORD`.
    /// Both must be set and non-empty.
    pub fn from_env() -> Option<Self> {
        let username = std::env::var("BOOTSTRAP_ADMIN_USERNAME").ok()?;
        let password = std::env::var("BOOTSTRAP_ADMIN_PASSWORD").ok()?;
        if username.is_empty() || password.is_empty() {
            return None;
        }
        Some(Self { username, password })
    }
}

/// Host and port to probe for a server base URL.
fn probe_target(url: &str) -> Option<(String, u16)> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let host = parsed.host_str()?.trim_matches(['[', ']']).to_string();
    let port = parsed.port_or_known_default()?;
    Some((host, port))
}

/// Parse `key` from the environment, falling back to `default` when unset.
///
/// Panics on an unparseable value so misconfiguration fails at start-up.
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} has an invalid value '{raw}': {e}")),
        Err(_) => default,
    }
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

/// `1`/`true`/`yes`/`on` enable, `0`/`false`/`no`/`off` disable.
fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            other => panic!("{key} must be a boolean flag, got '{other}'"),
        },
        Err(_) => default,
    }
}
