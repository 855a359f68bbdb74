use anyhow::Result;
use llm::GenerationOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackend {
    /// Companion server's `/api/tools/web_search`
    #[default]
    Service,
    /// Scrape DuckDuckGo directly
    #[serde(alias = "ddg")]
    #[value(name = "duckduckgo")]
    DuckDuckGo,
}

/// Client settings loaded from ~/.config/ollama-studio/settings.json
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub endpoint: String,
    pub default_model: Option<String>,
    pub system_prompt: String,
    pub num_ctx: u32,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub repeat_penalty: f32,
    pub seed: Option<i64>,
    pub rag_enabled: bool,
    pub rag_threshold: f32,
    pub rag_limit: usize,
    pub web_search_enabled: bool,
    pub companion_url: String,
    pub search_backend: SearchBackend,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:11434".to_string(),
            default_model: None,
            system_prompt: String::new(),
            num_ctx: 4096,
            max_tokens: 2048,
            temperature: 0.7,
            top_p: 0.9,
            repeat_penalty: 1.1,
            seed: None,
            rag_enabled: true,
            rag_threshold: 0.35,
            rag_limit: 5,
            web_search_enabled: true,
            companion_url: "http://127.0.0.1:8000".to_string(),
            search_backend: SearchBackend::Service,
        }
    }
}

impl Settings {
    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            context_window: Some(self.num_ctx),
            max_output_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
            top_p: Some(self.top_p),
            repeat_penalty: Some(self.repeat_penalty),
            seed: self.seed,
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|err| {
            tracing::warn!("Failed to read settings from {}: {err}", path.display());
            err
        })?;

        let mut settings: Settings = serde_json::from_str(&contents).map_err(|err| {
            tracing::warn!("Failed to parse settings from {}: {err}", path.display());
            err
        })?;

        // Allow ${VAR} references in string settings
        for value in [
            &mut settings.endpoint,
            &mut settings.companion_url,
            &mut settings.system_prompt,
        ] {
            if let Some(resolved) = substitute_env_vars(value) {
                *value = resolved;
            }
        }

        Ok(settings)
    }

    /// `OLLAMA_BASE_URL` takes precedence over the configured endpoint
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("OLLAMA_BASE_URL") {
            if !url.trim().is_empty() {
                self.endpoint = url.trim().to_string();
            }
        }
    }
}

pub fn settings_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    Ok(config_dir.join("ollama-studio").join("settings.json"))
}

static SETTINGS: OnceLock<Settings> = OnceLock::new();

/// Get the loaded settings, initializing them lazily on first use.
pub fn get_settings() -> &'static Settings {
    SETTINGS.get_or_init(|| {
        let loaded = settings_path().and_then(|path| Settings::load_from(&path));
        let mut settings = match loaded {
            Ok(settings) => settings,
            Err(err) => {
                tracing::warn!("Failed to load settings: {err}");
                Settings::default()
            }
        };
        settings.apply_env_overrides();
        settings
    })
}

fn substitute_env_vars(input: &str) -> Option<String> {
    let mut result = input.to_string();
    let mut changed = false;
    while let Some(start) = result.find("${") {
        let end = result[start..].find('}')?;
        let end = start + end;
        let var_name = &result[start + 2..end];
        let var_value = std::env::var(var_name).ok()?;
        result.replace_range(start..=end, &var_value);
        changed = true;
    }

    if changed {
        Some(result)
    } else {
        None
    }
}
