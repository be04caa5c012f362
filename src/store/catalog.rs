//! Filesystem catalog of presets, levels and mods

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info};

/// Preset file holding the shared baseline for every preset
pub const DEFAULTS_PRESET: &str = "Defaults";

/// Marker file identifying a mod directory
const MOD_SCRIPT: &str = "script.lgs";

/// Contents of a preset file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PresetFile {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default, rename = "mod")]
    pub mod_name: Option<String>,
    #[serde(default)]
    pub loading_time: Option<u32>,
    /// Engine variables pushed with `setvar` when the preset activates
    #[serde(default)]
    pub vars: BTreeMap<String, serde_json::Value>,
}

impl PresetFile {
    /// Engine variables as name/value strings
    pub fn var_pairs(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.vars.iter().map(|(name, value)| {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (name.clone(), value)
        })
    }
}

/// Where the catalog is scanned from
#[derive(Debug, Clone)]
pub struct CatalogDirs {
    pub preset_dir: PathBuf,
    pub level_dir: PathBuf,
    pub mod_dir: PathBuf,
}

/// Known presets, levels and mods
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    dirs: Option<CatalogDirs>,
    /// Preset names from configuration, kept even without a file
    configured: Vec<String>,
    presets: Vec<String>,
    preset_files: HashMap<String, PresetFile>,
    defaults: Option<PresetFile>,
    levels: Vec<String>,
    mods: Vec<String>,
}

impl Catalog {
    /// Scan the preset, level and mod directories
    pub async fn scan(dirs: CatalogDirs, configured: Vec<String>) -> Result<Self, CatalogError> {
        let mut catalog = Self {
            dirs: Some(dirs),
            configured,
            ..Self::default()
        };
        catalog.rescan().await?;
        Ok(catalog)
    }

    /// Catalog built from known entries, never touching the filesystem
    #[cfg(test)]
    pub fn from_entries(
        presets: Vec<(String, PresetFile)>,
        defaults: Option<PresetFile>,
        levels: Vec<String>,
        mods: Vec<String>,
    ) -> Self {
        let names = presets.iter().map(|(name, _)| name.clone()).collect();
        Self {
            dirs: None,
            configured: Vec::new(),
            presets: names,
            preset_files: presets.into_iter().collect(),
            defaults,
            levels,
            mods,
        }
    }

    /// Re-read every directory; in-memory catalogs are left alone
    pub async fn rescan(&mut self) -> Result<(), CatalogError> {
        let Some(dirs) = self.dirs.clone() else {
            return Ok(());
        };

        let mut presets = Vec::new();
        let mut preset_files = HashMap::new();
        let mut defaults = None;
        for name in list_entries(&dirs.preset_dir, EntryKind::File).await? {
            let file = read_preset(&dirs.preset_dir.join(&name)).await;
            if name.eq_ignore_ascii_case(DEFAULTS_PRESET) {
                defaults = Some(file);
            } else {
                preset_files.insert(name.clone(), file);
                presets.push(name);
            }
        }
        for name in &self.configured {
            if !presets.contains(name) {
                presets.push(name.clone());
            }
        }
        if presets.is_empty() {
            return Err(CatalogError::NoPresets(dirs.preset_dir));
        }

        let levels = list_entries(&dirs.level_dir, EntryKind::File).await?;

        let mut mods = Vec::new();
        for name in list_entries(&dirs.mod_dir, EntryKind::Dir).await? {
            if is_mod_dir(&dirs.mod_dir.join(&name)).await? {
                mods.push(name);
            }
        }

        info!(
            presets = presets.len(),
            levels = levels.len(),
            mods = mods.len(),
            "Catalog scanned"
        );

        self.presets = presets;
        self.preset_files = preset_files;
        self.defaults = defaults;
        self.levels = levels;
        self.mods = mods;
        Ok(())
    }

    pub fn presets(&self) -> &[String] {
        &self.presets
    }

    #[cfg(test)]
    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    #[cfg(test)]
    pub fn mods(&self) -> &[String] {
        &self.mods
    }

    /// Parsed preset file, if one exists for `name`
    pub fn preset_file(&self, name: &str) -> Option<&PresetFile> {
        self.preset_files.get(name)
    }

    pub fn defaults(&self) -> Option<&PresetFile> {
        self.defaults.as_ref()
    }

    pub fn find_preset(&self, query: &str) -> Option<&str> {
        find_name(&self.presets, query)
    }

    pub fn find_level(&self, query: &str) -> Option<&str> {
        find_name(&self.levels, query)
    }

    pub fn find_mod(&self, query: &str) -> Option<&str> {
        find_name(&self.mods, query)
    }
}

/// First name containing `query`, ignoring case
pub fn find_name<'a>(names: &'a [String], query: &str) -> Option<&'a str> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return None;
    }
    names
        .iter()
        .find(|name| name.to_lowercase().contains(&query))
        .map(String::as_str)
}

#[derive(Clone, Copy)]
enum EntryKind {
    File,
    Dir,
}

/// Sorted visible entries of one kind in `dir`
async fn list_entries(dir: &Path, kind: EntryKind) -> Result<Vec<String>, CatalogError> {
    let io_err = |source: std::io::Error| CatalogError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = fs::read_dir(dir).await.map_err(io_err)?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let Ok(name) = entry.file_name().into_string() else {
            debug!(path = ?entry.path(), "Skipping non UTF-8 entry");
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let file_type = entry.file_type().await.map_err(io_err)?;
        let wanted = match kind {
            EntryKind::File => file_type.is_file(),
            EntryKind::Dir => file_type.is_dir(),
        };
        if wanted {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

async fn is_mod_dir(dir: &Path) -> Result<bool, CatalogError> {
    let io_err = |source: std::io::Error| CatalogError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = fs::read_dir(dir).await.map_err(io_err)?;
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        if entry
            .file_name()
            .to_string_lossy()
            .eq_ignore_ascii_case(MOD_SCRIPT)
        {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Read one preset file; unreadable or malformed files load as empty
async fn read_preset(path: &Path) -> PresetFile {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) => {
            error!(path = ?path, error = %e, "Failed to read preset");
            return PresetFile::default();
        }
    };
    if raw.trim().is_empty() {
        return PresetFile::default();
    }
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        error!(path = ?path, error = %e, "Malformed preset file");
        PresetFile::default()
    })
}

/// Catalog errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("There are no presets available in {0:?}")]
    NoPresets(PathBuf),
}
