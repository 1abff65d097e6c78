/// Ollama model server provider
///
/// Talks to a local Ollama daemon over its HTTP API and, when allowed, launches
/// `ollama serve` on demand.
///
/// API Flow:
/// 1. Readiness / health: GET /api/tags → installed models
/// 2. Inference: POST /api/generate (non-streaming) → generated text
///
/// Launching is single-flight: the child-process slot is behind an async mutex,
/// and callers that waited on it re-check readiness before doing anything.
/// Generation calls never take that lock.
use std::process::Stdio;
use std::time::Duration;

use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::{
    process::{Child, Command},
    sync::{watch, Mutex},
    time::{sleep_until, Instant},
};

use crate::{
    config::Config,
    error::{AppError, AppResult},
    services::providers::{GenerationRequest, LanguageModel, ModelHealth, Readiness},
};

const DEFAULT_HOST: &str = "http://localhost:11434";

/// Connection and lifecycle settings for [`OllamaClient`]
#[derive(Debug, Clone)]
pub struct OllamaOptions {
    pub base_url: String,
    pub auto_start: bool,
    pub serve_command: String,
    pub startup_timeout: Duration,
    pub poll_interval: Duration,
    pub probe_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for OllamaOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_HOST.to_string(),
            auto_start: true,
            serve_command: "ollama".to_string(),
            startup_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl From<&Config> for OllamaOptions {
    fn from(config: &Config) -> Self {
        Self {
            base_url: config.ollama_host.trim_end_matches('/').to_string(),
            auto_start: config.ollama_auto_start,
            serve_command: config.ollama_command.clone(),
            startup_timeout: Duration::from_secs(config.ollama_startup_timeout_secs),
            poll_interval: Duration::from_millis(config.ollama_poll_interval_ms),
            probe_timeout: Duration::from_secs(config.ollama_probe_timeout_secs),
            request_timeout: Duration::from_secs(config.ollama_request_timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f64,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct OllamaClient {
    http_client: HttpClient,
    options: OllamaOptions,
    state: watch::Sender<Readiness>,
    /// Server process launched by this client; the lock doubles as the launch guard
    launch: Mutex<Option<Child>>,
}

impl OllamaClient {
    pub fn new(options: OllamaOptions) -> AppResult<Self> {
        let http_client = HttpClient::builder()
            .user_agent(concat!("smartcampus-ai/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;
        let (state, _) = watch::channel(Readiness::Unstarted);

        Ok(Self {
            http_client,
            options,
            state,
            launch: Mutex::new(None),
        })
    }

    /// Receiver that observes every readiness transition
    pub fn subscribe(&self) -> watch::Receiver<Readiness> {
        self.state.subscribe()
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/api/{}", self.options.base_url.trim_end_matches('/'), endpoint)
    }

    fn set_state(&self, readiness: Readiness) {
        let previous = self.state.send_replace(readiness.clone());
        if previous != readiness {
            tracing::debug!(from = ?previous, to = ?readiness, "Model server readiness changed");
        }
    }

    /// A server that was ready stopped answering; the next `ensure_ready` probes again
    fn mark_connection_lost(&self) {
        let reset = self.state.send_if_modified(|state| {
            if *state == Readiness::Ready {
                *state = Readiness::Unstarted;
                true
            } else {
                false
            }
        });
        if reset {
            tracing::warn!(base_url = %self.options.base_url, "Lost connection to model server");
        }
    }

    fn fail(&self, reason: String) -> AppError {
        tracing::error!(base_url = %self.options.base_url, reason = %reason, "Model server not available");
        self.set_state(Readiness::Failed {
            reason: reason.clone(),
        });
        AppError::ModelUnavailable(reason)
    }

    /// Names of the models installed on the server
    async fn list_models(&self, timeout: Duration) -> AppResult<Vec<String>> {
        let response = self
            .http_client
            .get(self.api_url("tags"))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| self.map_request_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ModelError(describe_failure(status, &body)));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| AppError::ModelError(format!("invalid model list: {}", e)))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn probe(&self, timeout: Duration) -> bool {
        match self.list_models(timeout).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Model server probe failed");
                false
            }
        }
    }

    fn spawn_server(&self) -> AppResult<Child> {
        let mut command = Command::new(&self.options.serve_command);
        command
            .arg("serve")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        if self.options.base_url != DEFAULT_HOST {
            command.env("OLLAMA_HOST", &self.options.base_url);
        }

        let child = command.spawn().map_err(|e| {
            self.fail(format!(
                "could not launch '{} serve': {}",
                self.options.serve_command, e
            ))
        })?;

        tracing::info!(
            command = %self.options.serve_command,
            pid = ?child.id(),
            "Model server launched"
        );
        Ok(child)
    }

    /// Polls until the server answers, the launched process dies, or the timeout elapses.
    /// No probe or pause runs past the startup deadline.
    async fn wait_until_ready(&self, slot: &mut Option<Child>) -> AppResult<()> {
        let deadline = Instant::now() + self.options.startup_timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !remaining.is_zero() && self.probe(remaining.min(self.options.probe_timeout)).await {
                tracing::info!(attempts, "Model server ready");
                self.set_state(Readiness::Ready);
                return Ok(());
            }

            if let Some(child) = slot.as_mut() {
                if let Ok(Some(exit)) = child.try_wait() {
                    *slot = None;
                    return Err(self.fail(format!(
                        "model server exited with {} before becoming ready",
                        exit
                    )));
                }
            }

            if Instant::now() >= deadline {
                return Err(self.fail(format!(
                    "model server did not become ready within {:?}",
                    self.options.startup_timeout
                )));
            }

            tracing::debug!(attempt = attempts, "Model server not ready yet");
            sleep_until(deadline.min(Instant::now() + self.options.poll_interval)).await;
        }
    }

    fn map_request_error(&self, e: reqwest::Error, timeout: Duration) -> AppError {
        if e.is_timeout() {
            AppError::ModelTimeout(format!("no response from model server within {:?}", timeout))
        } else if e.is_connect() {
            self.mark_connection_lost();
            AppError::Connection(format!(
                "cannot connect to model server at {}: {}",
                self.options.base_url, e
            ))
        } else {
            AppError::ModelError(format!("request to model server failed: {}", e))
        }
    }
}

#[async_trait::async_trait]
impl LanguageModel for OllamaClient {
    async fn ensure_ready(&self) -> AppResult<()> {
        if self.readiness() == Readiness::Ready {
            return Ok(());
        }

        let mut slot = self.launch.lock().await;

        // Another caller may have finished the launch while we waited
        if self.readiness() == Readiness::Ready {
            return Ok(());
        }

        if self.probe(self.options.probe_timeout).await {
            tracing::info!(base_url = %self.options.base_url, "Model server already running");
            self.set_state(Readiness::Ready);
            return Ok(());
        }

        if !self.options.auto_start {
            return Err(self.fail(format!(
                "model server at {} is not reachable and auto start is disabled",
                self.options.base_url
            )));
        }

        self.set_state(Readiness::Starting);

        let still_running = match slot.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        };
        if !still_running {
            *slot = Some(self.spawn_server()?);
        }

        self.wait_until_ready(&mut slot).await
    }

    async fn generate(&self, request: &GenerationRequest) -> AppResult<String> {
        let body = GenerateBody {
            model: &request.model,
            prompt: &request.prompt,
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let started = Instant::now();
        let response = self
            .http_client
            .post(self.api_url("generate"))
            .timeout(self.options.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_request_error(e, self.options.request_timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.map_request_error(e, self.options.request_timeout))?;

        if !status.is_success() {
            return Err(AppError::ModelError(describe_failure(status, &text)));
        }

        let generated: GenerateResponse = serde_json::from_str(&text).map_err(|e| {
            tracing::error!(error = %e, response = %text, "Failed to decode model server response");
            AppError::ModelError(format!("invalid response from model server: {}", e))
        })?;

        tracing::info!(
            model = %request.model,
            chars = generated.response.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            provider = "ollama",
            "Generation completed"
        );

        Ok(generated.response)
    }

    async fn health(&self, model_name: &str) -> ModelHealth {
        match self.list_models(self.options.probe_timeout).await {
            Ok(installed) => ModelHealth {
                endpoint_reachable: true,
                model_available: installed.iter().any(|name| model_matches(name, model_name)),
            },
            Err(e) => {
                tracing::debug!(error = %e, "Health probe failed");
                ModelHealth::default()
            }
        }
    }

    fn readiness(&self) -> Readiness {
        self.state.borrow().clone()
    }

    async fn shutdown(&self) {
        let mut slot = self.launch.lock().await;
        if let Some(mut child) = slot.take() {
            match child.kill().await {
                Ok(()) => tracing::info!("Model server process stopped"),
                Err(e) => tracing::warn!(error = %e, "Failed to stop model server process"),
            }
            self.set_state(Readiness::Unstarted);
        }
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}

/// Installed tag `name` satisfies `wanted`; a bare name matches its `:latest` tag
fn model_matches(name: &str, wanted: &str) -> bool {
    name == wanted || (!wanted.contains(':') && name.strip_suffix(":latest") == Some(wanted))
}

fn describe_failure(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(err) => format!("model server returned {}: {}", status, err.error),
        Err(_) if body.trim().is_empty() => format!("model server returned {}", status),
        Err(_) => format!("model server returned {}: {}", status, body.trim()),
    }
}
