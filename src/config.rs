//! Manifest and settings loading
//!
//! A manifest lists resources as `[[resource]]` tables (TOML) or a
//! `{"resource": [...]}` document (JSON); the format follows the file
//! extension. Settings live in `<config dir>/config.toml` and only supply
//! defaults for command-line flags.

use anyhow::{Context, Result, bail};
use declarative::{DesiredState, Ensure, Properties, Reconciler, ResourceHandle};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

// ============================================================================
// Manifest
// ============================================================================

/// One declared resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDecl {
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default)]
    pub properties: Properties,
}

impl ResourceDecl {
    fn label(&self) -> String {
        format!("{}[{}]", self.kind, self.title)
    }
}

/// A declaration that failed validation
#[derive(Debug)]
pub struct Rejected {
    /// `kind[title]` as written in the manifest
    pub label: String,
    pub error: declarative::Error,
}

/// Validated handles plus the declarations that were turned away
#[derive(Debug, Default)]
pub struct Declared {
    pub handles: Vec<ResourceHandle>,
    pub rejected: Vec<Rejected>,
}

/// Parsed manifest file
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, rename = "resource")]
    pub resources: Vec<ResourceDecl>,
}

/// Manifest file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Toml,
    Json,
}

impl Format {
    /// Detect the format from a file extension; anything but `.json` is TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Toml,
        }
    }
}

impl Manifest {
    /// Load a manifest, expanding `~` and variables in the path.
    pub fn load(path: &Path) -> Result<Self> {
        let path = paths::expand(&path.to_string_lossy());
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        let manifest = Self::parse(&content, Format::from_path(&path))
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))?;
        log::debug!(
            "Loaded {} resource(s) from {}",
            manifest.resources.len(),
            path.display()
        );
        Ok(manifest)
    }

    /// Parse manifest text in the given format.
    pub fn parse(content: &str, format: Format) -> Result<Self> {
        match format {
            Format::Toml => toml::from_str(content).context("Invalid TOML manifest"),
            Format::Json => serde_json::from_str(content).context("Invalid JSON manifest"),
        }
    }

    /// Validate every declaration and bind identities.
    ///
    /// An invalid declaration is set aside in [`Declared::rejected`] and the
    /// rest still go through. Two declarations that resolve to the same kind
    /// and name fail the whole manifest.
    pub fn declare(&self, reconciler: &Reconciler) -> Result<Declared> {
        let mut declared = Declared::default();
        let mut seen: HashMap<(String, String), String> = HashMap::new();

        for decl in &self.resources {
            let desired = DesiredState {
                ensure: decl.ensure,
                properties: decl.properties.clone(),
            };
            let handle = match reconciler.validate_and_register(&decl.kind, &decl.title, desired) {
                Ok(handle) => handle,
                Err(error) if !error.is_resource_local() => {
                    return Err(error)
                        .with_context(|| format!("Invalid resource {}", decl.label()));
                }
                Err(error) => {
                    log::warn!("Rejected {}: {error}", decl.label());
                    declared.rejected.push(Rejected {
                        label: decl.label(),
                        error,
                    });
                    continue;
                }
            };

            let key = (handle.kind.clone(), handle.name.clone());
            if let Some(previous) = seen.insert(key, decl.title.clone()) {
                bail!(
                    "Duplicate declaration of {}: titles '{}' and '{}' name the same resource",
                    handle,
                    previous,
                    decl.title
                );
            }
            declared.handles.push(handle);
        }

        Ok(declared)
    }
}

// ============================================================================
// Settings
// ============================================================================

/// User defaults from `config.toml`
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Default number of parallel jobs for apply
    #[serde(default)]
    pub jobs: Option<usize>,
    /// Default state file
    #[serde(default)]
    pub state_file: Option<String>,
}

impl Settings {
    /// Load settings from the config directory. A missing file means defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_dir()?.join("config.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))
    }

    /// State file to use: the flag, then the setting, then the default location.
    pub fn state_file(&self, flag: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = flag {
            return Ok(paths::expand(&path.to_string_lossy()));
        }
        if let Some(path) = &self.state_file {
            return Ok(paths::expand(path));
        }
        paths::default_state_file()
    }

    /// Parallel jobs to use: the flag, then the setting, then the engine default.
    pub fn jobs(&self, flag: Option<usize>) -> usize {
        flag.or(self.jobs)
            .unwrap_or_else(|| declarative::ExecuteOptions::default().jobs)
            .max(1)
    }
}

// ============================================================================
// Tests
// ============================================================================
