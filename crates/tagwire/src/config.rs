// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Serialization settings.
//!
//! Supports both programmatic and file-based configuration.

use crate::schema::MemberFlags;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Limits and defaults applied to every encode/decode call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializationSettings {
    /// Maximum element count for collections and tables.
    #[serde(default = "default_max_collection_size")]
    pub max_collection_size: usize,

    /// Maximum encoded string length (bytes).
    #[serde(default = "default_max_blob_size")]
    pub max_string_size: usize,

    /// Maximum encoded byte-array length.
    #[serde(default = "default_max_blob_size")]
    pub max_byte_array_size: usize,

    /// Limit of the runtime depth counter for cyclic types.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Active schema version; `None` accepts every versioned type and member.
    #[serde(default)]
    pub schema_version: Option<u32>,

    /// Member flag names excluded from encoding, e.g. `["hidden"]`.
    #[serde(default)]
    pub exclude_flags: Vec<String>,
}

fn default_max_collection_size() -> usize {
    16 * 1024
}

fn default_max_blob_size() -> usize {
    64 * 1024 * 1024
}

fn default_max_depth() -> u32 {
    256
}

impl Default for SerializationSettings {
    fn default() -> Self {
        Self {
            max_collection_size: default_max_collection_size(),
            max_string_size: default_max_blob_size(),
            max_byte_array_size: default_max_blob_size(),
            max_depth: default_max_depth(),
            schema_version: None,
            exclude_flags: Vec::new(),
        }
    }
}

impl SerializationSettings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_collection_size == 0 {
            return Err(ConfigError::Invalid(
                "max_collection_size must be greater than zero".into(),
            ));
        }
        if self.max_string_size == 0 || self.max_byte_array_size == 0 {
            return Err(ConfigError::Invalid(
                "string and byte array limits must be greater than zero".into(),
            ));
        }
        if self.max_depth == 0 {
            return Err(ConfigError::Invalid("max_depth must be greater than zero".into()));
        }
        self.exclusion()?;
        Ok(())
    }

    /// Combined exclusion mask from `exclude_flags`.
    pub fn exclusion(&self) -> Result<MemberFlags, ConfigError> {
        let mut flags = MemberFlags::NONE;
        for name in &self.exclude_flags {
            flags |= MemberFlags::from_name(name)
                .ok_or_else(|| ConfigError::Invalid(format!("Unknown member flag '{}'", name)))?;
        }
        Ok(flags)
    }
}
