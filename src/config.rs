use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::data::facet::DefaultPolicy;
use crate::data::loader::{LoadOptions, SourceLocation};
use crate::error::ConfigError;
use crate::page::{Aggregate, PageSpec};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Where the three source tables live and how to read them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourcesConfig {
    pub songs: SourceLocation,
    pub artist_popularity: SourceLocation,
    pub artist_info: SourceLocation,
    /// Single ASCII character separating fields of delimited text.
    pub delimiter: char,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            songs: SourceLocation::parse("songs_info.csv"),
            artist_popularity: SourceLocation::parse("artistas_popularidade.csv"),
            artist_info: SourceLocation::parse("artistas_info.csv"),
            delimiter: ',',
        }
    }
}

/// Behaviour of URL sources.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteConfig {
    pub retries: u32,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            retries: 1,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FacetsConfig {
    pub default: DefaultPolicy,
}

/// Complete dashboard configuration. Every section is optional; an empty
/// document yields [`Config::default`], which carries the built-in pages.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub sources: SourcesConfig,
    pub remote: RemoteConfig,
    pub facets: FacetsConfig,
    pub pages: Vec<PageSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: SourcesConfig::default(),
            remote: RemoteConfig::default(),
            facets: FacetsConfig::default(),
            pages: PageSpec::builtin(),
        }
    }
}

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("loading configuration {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.sources.delimiter.is_ascii() {
            return Err(ConfigError::Invalid(format!(
                "delimiter '{}' is not a single ASCII character",
                self.sources.delimiter
            )));
        }
        if let DefaultPolicy::FirstN { n: 0 } = self.facets.default {
            return Err(ConfigError::Invalid(
                "facets.default first_n needs n > 0".to_string(),
            ));
        }

        let mut names = BTreeSet::new();
        for page in &self.pages {
            if !names.insert(page.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate page '{}'",
                    page.name
                )));
            }
            let mut ids = BTreeSet::new();
            for spec in &page.aggregates {
                if !ids.insert(spec.id.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "page '{}': duplicate aggregate '{}'",
                        page.name, spec.id
                    )));
                }
                let zero = match &spec.aggregate {
                    Aggregate::WordFrequency { top_n, .. } => *top_n == 0,
                    Aggregate::TopRows { n, .. } => *n == Some(0),
                    Aggregate::CountBy { limit, .. } | Aggregate::NuniqueBy { limit, .. } => {
                        *limit == Some(0)
                    }
                    _ => false,
                };
                if zero {
                    return Err(ConfigError::Invalid(format!(
                        "page '{}': aggregate '{}' must keep at least one entry",
                        page.name, spec.id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn page(&self, name: &str) -> Option<&PageSpec> {
        self.pages.iter().find(|p| p.name == name)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            // validate() guarantees ASCII
            delimiter: self.sources.delimiter as u8,
            retries: self.remote.retries,
            timeout: Duration::from_secs(self.remote.timeout_secs),
        }
    }
}
