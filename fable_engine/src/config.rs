//! Engine configuration.
//!
//! Settings for quest chaining, policy search and game generation are read from a TOML
//! file (`data/config.toml` by default). Loading never fails: a missing or malformed file
//! is logged and the built-in defaults are used instead.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::chainer::ChainingOptions;
use crate::policy::PolicyOptions;

/// Environment variable enabling extra runtime assertions and keeping compiler output.
pub const DEBUG_ENV_VAR: &str = "TEXTWORLD_DEBUG";

/// True when `TEXTWORLD_DEBUG` is set to anything but an empty string, `0` or `false`.
pub fn debug_enabled() -> bool {
    env::var(DEBUG_ENV_VAR).is_ok_and(|value| !matches!(value.trim(), "" | "0" | "false"))
}

/// Numeric chaining bounds; turned into [`ChainingOptions`] by the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainingConfig {
    pub min_depth: usize,
    pub max_depth: usize,
    pub min_breadth: usize,
    pub max_breadth: usize,
    pub max_nodes: usize,
    pub create_variables: bool,
    pub restricted_types: Vec<String>,
}

impl Default for ChainingConfig {
    fn default() -> Self {
        Self {
            min_depth: 1,
            max_depth: 3,
            min_breadth: 1,
            max_breadth: 2,
            max_nodes: 10_000,
            create_variables: false,
            restricted_types: vec!["r".into(), "d".into()],
        }
    }
}

impl ChainingConfig {
    /// Chaining options with these bounds and everything else at its default.
    pub fn options(&self) -> ChainingOptions {
        ChainingOptions {
            min_depth: self.min_depth,
            max_depth: self.max_depth,
            min_breadth: self.min_breadth,
            max_breadth: self.max_breadth,
            max_nodes: self.max_nodes,
            create_variables: self.create_variables,
            restricted_types: self.restricted_types.iter().cloned().collect(),
            ..ChainingOptions::default()
        }
    }
}

/// Size of generated games.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub rooms: usize,
    pub objects: usize,
    pub quest_length: usize,
    pub quest_breadth: usize,
    /// Weights used when drawing object types; types left out are never drawn.
    pub type_probs: BTreeMap<String, f64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            rooms: 3,
            objects: 6,
            quest_length: 3,
            quest_breadth: 1,
            type_probs: [("c", 0.2), ("s", 0.2), ("o", 0.35), ("f", 0.25)]
                .into_iter()
                .map(|(ty, p)| (ty.to_string(), p))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub chaining: ChainingConfig,
    pub policy: PolicyOptions,
    pub generation: GenerationConfig,
}

/// Load the engine configuration, falling back to defaults on any error.
pub fn load_config(toml_path: &Path) -> EngineConfig {
    match try_load_config(toml_path) {
        Ok(config) => {
            info!("engine configuration loaded from '{}'", toml_path.display());
            config
        },
        Err(e) => {
            warn!(
                "Could not load engine configuration from '{}': {e:#}. Using built-in defaults.",
                toml_path.display()
            );
            EngineConfig::default()
        },
    }
}

fn try_load_config(toml_path: &Path) -> Result<EngineConfig> {
    let text = fs::read_to_string(toml_path)
        .with_context(|| format!("reading engine configuration from '{}'", toml_path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing engine configuration from '{}'", toml_path.display()))
}
