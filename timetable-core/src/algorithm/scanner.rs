//! Algorithm discovery.
//!
//! Scans a root directory whose immediate subdirectories are algorithm
//! packages. A package needs an executable named `algorithm`; an optional
//! `info.json` carries richer metadata.

use super::info::AlgorithmInfo;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct AlgorithmScanner {
    algorithms_dir: PathBuf,
    algorithms: BTreeMap<String, AlgorithmInfo>,
}

impl AlgorithmScanner {
    /// Scan `algorithms_dir` once. Invalid entries are logged and dropped.
    pub fn scan(algorithms_dir: impl Into<PathBuf>) -> Self {
        let mut scanner = Self {
            algorithms_dir: algorithms_dir.into(),
            algorithms: BTreeMap::new(),
        };
        scanner.rescan();
        scanner
    }

    /// Re-read the algorithms directory from scratch.
    pub fn rescan(&mut self) {
        self.algorithms.clear();

        let entries = match std::fs::read_dir(&self.algorithms_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("algorithm directory {} is not readable: {e}", self.algorithms_dir.display());
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                self.load_directory(&path);
            }
        }

        info!("found {} algorithms in {}", self.algorithms.len(), self.algorithms_dir.display());
    }

    fn load_directory(&mut self, directory: &Path) {
        // A package without the executable is not an algorithm at all.
        if !directory.join("algorithm").is_file() {
            return;
        }

        let info_file = directory.join("info.json");
        let info = if info_file.is_file() {
            match AlgorithmInfo::from_info_file(&info_file) {
                Ok(info) => info,
                Err(e) => {
                    warn!("skipping {}: {e}", directory.display());
                    return;
                }
            }
        } else {
            AlgorithmInfo::minimal(directory)
        };

        if info.is_valid() {
            info!("loaded algorithm: {} ({})", info.name, info.display_name);
            self.algorithms.insert(info.name.clone(), info);
        } else {
            warn!("invalid algorithm metadata in {}", directory.display());
        }
    }

    pub fn list_all(&self) -> Vec<&AlgorithmInfo> {
        self.algorithms.values().collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.algorithms.keys().cloned().collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.algorithms.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&AlgorithmInfo> {
        self.algorithms.get(name)
    }

    pub fn path_of(&self, name: &str) -> Option<&Path> {
        self.algorithms.get(name).map(|info| info.path.as_path())
    }

    /// Validate a run configuration against an algorithm's parameter schema.
    pub fn validate_config(&self, name: &str, config: &Value) -> Vec<String> {
        match self.algorithms.get(name) {
            Some(info) => info.validate_parameters(config),
            None => vec![format!("Algorithm '{name}' not found")],
        }
    }
}
