use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use simple_error::SimpleResult;

use super::read_yaml_file;

pub const DEFAULT_QUEUE: &str = "batch.q";

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ToolResource {
    pub path: Utf8PathBuf,
}

/// Site-specific settings: scheduler queue, job runner script and tool locations
///
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct SystemConfig {
    pub queue: String,

    /// Wrapper script handed to qsub for every submitted job
    pub qsub_runner: Option<Utf8PathBuf>,

    /// Tool name to installed location
    pub resources: BTreeMap<String, ToolResource>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            queue: DEFAULT_QUEUE.to_string(),
            qsub_runner: None,
            resources: BTreeMap::new(),
        }
    }
}

impl SystemConfig {
    pub fn from_file(filename: &Utf8Path) -> SimpleResult<Self> {
        read_yaml_file(filename, "system config")
    }
}
