//! # Model Discovery Module
//!
//! One-shot, startup-time discovery of model descriptors under a fixed
//! filesystem root. Each direct child directory is one candidate model;
//! the result is a frozen registry of available descriptors plus a
//! parallel map of unavailability reasons.
//!
//! No inotify, no filesystem watches, no hot reload. A missing root
//! directory yields an empty registry and is not fatal.

use crate::config::{DescriptorError, ModelDescriptor};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// Why a discovered directory did not produce an available model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// The directory has no `model.yaml`
    MissingModelYaml,
    /// The descriptor failed parsing or validation
    InvalidModelYaml,
    /// The descriptor is valid but its weights file does not exist
    MissingWeights,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingModelYaml => write!(f, "missing_model_yaml"),
            Self::InvalidModelYaml => write!(f, "invalid_model_yaml"),
            Self::MissingWeights => write!(f, "missing_weights"),
        }
    }
}

impl From<&DescriptorError> for UnavailableReason {
    fn from(err: &DescriptorError) -> Self {
        match err {
            DescriptorError::Missing(_) => Self::MissingModelYaml,
            DescriptorError::MissingWeights(_) => Self::MissingWeights,
            DescriptorError::Io(_) | DescriptorError::Parse(_) | DescriptorError::Invalid(_) => {
                Self::InvalidModelYaml
            }
        }
    }
}

/// Frozen result of a discovery scan
///
/// Available models are keyed by `model_id`; unavailable entries are keyed
/// by directory name, since an unparseable descriptor has no trustworthy
/// model id.
#[derive(Debug, Default)]
pub struct DiscoveryRegistry {
    available: BTreeMap<String, ModelDescriptor>,
    unavailable: BTreeMap<String, UnavailableReason>,
}

impl DiscoveryRegistry {
    /// Looks up an available model by id
    pub fn get(&self, model_id: &str) -> Option<&ModelDescriptor> {
        self.available.get(model_id)
    }

    /// True when the model is available
    pub fn is_available(&self, model_id: &str) -> bool {
        self.available.contains_key(model_id)
    }

    /// Ids of all available models, in sorted order
    pub fn available_ids(&self) -> impl Iterator<Item = &str> {
        self.available.keys().map(String::as_str)
    }

    /// Available descriptors, in sorted id order
    pub fn available(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.available.values()
    }

    /// Unavailable entries with their reasons, in sorted directory order
    pub fn unavailable(&self) -> impl Iterator<Item = (&str, UnavailableReason)> {
        self.unavailable
            .iter()
            .map(|(name, reason)| (name.as_str(), *reason))
    }

    /// Why a directory entry is unavailable, if it is
    pub fn unavailable_reason(&self, entry: &str) -> Option<UnavailableReason> {
        self.unavailable.get(entry).copied()
    }

    /// Number of available models
    pub fn available_count(&self) -> usize {
        self.available.len()
    }

    /// Number of unavailable entries
    pub fn unavailable_count(&self) -> usize {
        self.unavailable.len()
    }
}

/// Scans `models_root` once and classifies every child directory
///
/// Directories are visited in sorted order so repeated scans of the same
/// tree produce the same registry.
pub fn discover(models_root: &Path) -> DiscoveryRegistry {
    info!(models_root = %models_root.display(), "discovering models");

    let mut registry = DiscoveryRegistry::default();

    if !models_root.is_dir() {
        warn!(
            models_root = %models_root.display(),
            "models directory does not exist, no models will be available"
        );
        return registry;
    }

    let entries = match std::fs::read_dir(models_root) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(
                models_root = %models_root.display(),
                error = %err,
                "failed to list models directory"
            );
            return registry;
        }
    };

    let mut dirs: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();

    for model_dir in dirs {
        let entry_name = model_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        match ModelDescriptor::load(&model_dir) {
            Ok(descriptor) => {
                info!(
                    model_id = %descriptor.model_id,
                    model_name = %descriptor.model_name,
                    model_version = %descriptor.model_version,
                    model_type = %descriptor.model_type,
                    gpu_required = descriptor.resource_requirements.gpu_required,
                    "discovered model"
                );
                if let Some(previous) =
                    registry.available.insert(descriptor.model_id.clone(), descriptor)
                {
                    warn!(
                        model_id = %previous.model_id,
                        "duplicate model_id across directories, keeping the later entry"
                    );
                }
            }
            Err(err) => {
                let reason = UnavailableReason::from(&err);
                warn!(
                    entry = %entry_name,
                    reason = %reason,
                    error = %err,
                    "model marked unavailable"
                );
                registry.unavailable.insert(entry_name, reason);
            }
        }
    }

    info!(
        available = registry.available_count(),
        unavailable = registry.unavailable_count(),
        "model discovery complete"
    );

    registry
}
