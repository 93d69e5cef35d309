//! Stored configuration loading.
//!
//! The stored layer is a JSON file. It either holds the options object
//! directly or nests it under a `"deploy-git"` key, so a project manifest
//! shared with other tools can carry it:
//!
//! ```json
//! {
//!   "deploy-git": {
//!     "remote": "git@github.com:user/site.git",
//!     "branch": "gh-pages",
//!     "deploymentFiles": [{ "src": "CNAME", "dest": "CNAME" }]
//!   }
//! }
//! ```

use std::path::{Path, PathBuf};

use super::{ConfigError, PartialOptions};

/// File looked up in the project directory when no file is named explicitly.
pub const DEFAULT_CONFIG_FILE: &str = "deploy-git.json";

/// Key under which the options may be nested.
const SECTION_KEY: &str = "deploy-git";

/// Load the stored option layer.
///
/// With `explicit` set, the file must exist. Otherwise `deploy-git.json` in
/// `project_dir` is used when present and an empty layer is returned when
/// it is not.
pub fn load_stored_options(
    project_dir: &Path,
    explicit: Option<&Path>,
) -> Result<PartialOptions, ConfigError> {
    let path = match explicit {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => project_dir.join(path),
        None => {
            let path = project_dir.join(DEFAULT_CONFIG_FILE);
            if !path.exists() {
                log::debug!("no stored configuration at {}", path.display());
                return Ok(PartialOptions::default());
            }
            path
        }
    };

    log::debug!("loading stored configuration from {}", path.display());
    let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    parse_stored_options(&contents, path)
}

fn parse_stored_options(contents: &str, path: PathBuf) -> Result<PartialOptions, ConfigError> {
    let parse_err = |source| ConfigError::Parse {
        path: path.clone(),
        source,
    };

    let mut value: serde_json::Value = serde_json::from_str(contents).map_err(parse_err)?;
    if let Some(section) = value.get_mut(SECTION_KEY) {
        value = section.take();
    }
    serde_json::from_value(value).map_err(parse_err)
}
