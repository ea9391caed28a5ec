// src/config.rs
//! Unified configuration: YAML file, then environment overrides

use crate::browser::BrowserSettings;
use crate::traversal::{SiteProfile, TraversalLimits};
use crate::utils;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_DATABASE_PATH: &str = "data/jobs.db";
const PRODUCTION_ROOT: &str = "/app";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct EnvironmentSection {
    database_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    local: EnvironmentSection,
    production: EnvironmentSection,
    limits: TraversalLimits,
    browser: BrowserSettings,
    cookies: Option<String>,
    sites: Vec<SiteProfile>,
}

#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    pub name: String,
    pub database_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ConfigManager {
    pub environment: EnvironmentConfig,
    pub limits: TraversalLimits,
    pub browser: BrowserSettings,
    /// Session `Cookie` header for the authenticated origin site
    pub cookies: Option<String>,
    sites: Vec<SiteProfile>,
}

impl ConfigManager {
    /// Reads `path` when it exists; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = if path.exists() {
            info!("Loading configuration from {}", path.display());
            Some(
                std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
            )
        } else {
            info!("No configuration at {}, using defaults", path.display());
            None
        };
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        Self::from_sources(content.as_deref(), |key| std::env::var(key).ok(), &cwd)
    }

    fn from_sources(
        content: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
        cwd: &Path,
    ) -> Result<Self> {
        let file: ConfigFile = match content {
            Some(text) if !text.trim().is_empty() => {
                serde_yaml::from_str(text).context("Failed to parse configuration YAML")?
            }
            _ => ConfigFile::default(),
        };

        let name = env("HARVEST_ENV").unwrap_or_else(|| "local".to_string());
        let (section, base) = match name.as_str() {
            "production" => (file.production, PathBuf::from(PRODUCTION_ROOT)),
            _ => (file.local, cwd.to_path_buf()),
        };

        let database_path = env("HARVEST_DATABASE")
            .map(PathBuf::from)
            .or(section.database_path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH));

        let cookies = env("HARVEST_COOKIES")
            .or(file.cookies)
            .filter(|c| !c.trim().is_empty());

        let mut browser = file.browser;
        if let Some(path) = env("HARVEST_CHROME").filter(|p| !p.trim().is_empty()) {
            browser.executable = Some(PathBuf::from(path.trim()));
        }
        if let Some(flag) = env("HARVEST_HEADLESS") {
            browser.headless = !matches!(
                flag.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "no" | "off"
            );
        }

        info!("Environment: {}", name);
        Ok(Self {
            environment: EnvironmentConfig {
                name,
                database_path: utils::resolve_path(&base, &database_path),
            },
            limits: file.limits,
            browser,
            cookies,
            sites: file.sites,
        })
    }

    /// Configured entries override the built-in profile of the same name
    pub fn site(&self, name: &str) -> Option<SiteProfile> {
        self.sites
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .cloned()
            .or_else(|| SiteProfile::builtin(name))
    }

    pub fn site_names(&self) -> Vec<String> {
        let mut names: Vec<String> = SiteProfile::builtins()
            .into_iter()
            .map(|s| s.name)
            .chain(self.sites.iter().map(|s| s.name.clone()))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub async fn ensure_directories(&self) -> Result<()> {
        if let Some(parent) = self.environment.database_path.parent() {
            utils::ensure_dir_exists(parent).await?;
        }
        Ok(())
    }
}
