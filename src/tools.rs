//! Location of external tools and scripts
//!

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use simple_error::{SimpleResult, bail};

use crate::config::ToolResource;
use crate::globals::PROGRAM_NAME;

fn find_in_path(name: &str) -> Option<Utf8PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|x| x.is_file())
        .and_then(|x| Utf8PathBuf::from_path_buf(x).ok())
}

/// Resolve a tool from the system config resources, falling back to PATH
///
/// This program itself additionally resolves to the running executable.
///
pub fn get_tool_path(
    resources: &BTreeMap<String, ToolResource>,
    name: &str,
) -> SimpleResult<Utf8PathBuf> {
    if let Some(resource) = resources.get(name) {
        if !resource.path.exists() {
            bail!(
                "{name} is configured at '{}' in the system config, but this path does not exist",
                resource.path
            );
        }
        return Ok(resource.path.clone());
    }

    if let Some(x) = find_in_path(name) {
        return Ok(x);
    }

    if name == PROGRAM_NAME {
        if let Some(x) = std::env::current_exe()
            .ok()
            .and_then(|x| Utf8PathBuf::from_path_buf(x).ok())
        {
            return Ok(x);
        }
    }

    bail!(
        "{name} executable was not found. You can either specify its path in the system config, or add it to PATH"
    );
}

/// Command prefix running `script`, optionally through an interpreter such as python or java
pub fn get_tool_cmdline(
    resources: &BTreeMap<String, ToolResource>,
    interpreter: Option<&str>,
    script: &str,
) -> SimpleResult<String> {
    let script_path = get_tool_path(resources, script)?;
    Ok(match interpreter {
        Some(interpreter) => {
            let interpreter_path = get_tool_path(resources, interpreter)?;
            if interpreter == "java" {
                format!("{interpreter_path} -jar {script_path}")
            } else {
                format!("{interpreter_path} {script_path}")
            }
        }
        None => script_path.to_string(),
    })
}
