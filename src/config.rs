use serde::Deserialize;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path of the JSON settings document (created with defaults if absent)
    #[serde(default = "default_settings_path")]
    pub settings_path: String,

    /// Path of the YAML prompt template
    #[serde(default = "default_prompt_template_path")]
    pub prompt_template_path: String,

    /// Base URL of the local Ollama server
    #[serde(default = "default_ollama_host")]
    pub ollama_host: String,

    /// Whether the service may launch `ollama serve` when the server is down
    #[serde(default = "default_ollama_auto_start")]
    pub ollama_auto_start: bool,

    /// Executable used to launch the model server
    #[serde(default = "default_ollama_command")]
    pub ollama_command: String,

    /// How long to wait for a launched server to answer
    #[serde(default = "default_ollama_startup_timeout_secs")]
    pub ollama_startup_timeout_secs: u64,

    /// Delay between readiness probes while waiting for a launch
    #[serde(default = "default_ollama_poll_interval_ms")]
    pub ollama_poll_interval_ms: u64,

    /// Timeout of a single readiness probe
    #[serde(default = "default_ollama_probe_timeout_secs")]
    pub ollama_probe_timeout_secs: u64,

    /// Timeout of a single generation call
    #[serde(default = "default_ollama_request_timeout_secs")]
    pub ollama_request_timeout_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_settings_path() -> String {
    "config/settings.json".to_string()
}

fn default_prompt_template_path() -> String {
    "prompts/system_prompt.yaml".to_string()
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_auto_start() -> bool {
    true
}

fn default_ollama_command() -> String {
    "ollama".to_string()
}

fn default_ollama_startup_timeout_secs() -> u64 {
    30
}

fn default_ollama_poll_interval_ms() -> u64 {
    1000
}

fn default_ollama_probe_timeout_secs() -> u64 {
    5
}

fn default_ollama_request_timeout_secs() -> u64 {
    120
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Socket address the HTTP server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_to_empty_environment() {
        let vars: Vec<(String, String)> = Vec::new();
        let config: Config = envy::from_iter(vars).unwrap();

        assert_eq!(config.bind_address(), "127.0.0.1:8000");
        assert_eq!(config.ollama_host, "http://localhost:11434");
        assert!(config.ollama_auto_start);
        assert_eq!(config.ollama_startup_timeout_secs, 30);
        assert_eq!(config.settings_path, "config/settings.json");
    }

    #[test]
    fn test_overrides_from_environment() {
        let vars = vec![
            ("PORT".to_string(), "9090".to_string()),
            ("OLLAMA_HOST".to_string(), "http://10.0.0.5:11434".to_string()),
            ("OLLAMA_AUTO_START".to_string(), "false".to_string()),
        ];
        let config: Config = envy::from_iter(vars).unwrap();

        assert_eq!(config.port, 9090);
        assert_eq!(config.ollama_host, "http://10.0.0.5:11434");
        assert!(!config.ollama_auto_start);
    }
}
