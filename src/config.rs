use std::net::SocketAddr;

use anyhow::{bail, Context};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres { database_url: String },
    Rest { base_url: String, service_key: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub backend: StoreBackend,
    pub bind_addr: SocketAddr,
    pub gemini: Option<GeminiConfig>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let backend = if let Some(database_url) = get("DATABASE_URL") {
            StoreBackend::Postgres { database_url }
        } else {
            match (get("SUPABASE_URL"), get("SUPABASE_SERVICE_ROLE_KEY")) {
                (Some(base_url), Some(service_key)) => StoreBackend::Rest {
                    base_url: base_url.trim_end_matches('/').to_string(),
                    service_key,
                },
                _ => bail!(
                    "set DATABASE_URL, or SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY, to reach the store"
                ),
            }
        };

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("BIND_ADDR must be a socket address such as 0.0.0.0:8080")?;

        let gemini = get("GEMINI_API_KEY").map(|api_key| GeminiConfig {
            api_key,
            model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            base_url: get("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        });

        Ok(Self {
            backend,
            bind_addr,
            gemini,
        })
    }
}
