//! Host platform utility functions

use std::{env, path::PathBuf};

/// Environment variable holding the root directory of the software installation.
pub const SW_ROOT_ENV_VAR: &str = "MOTION_BRIDGE_ROOT";

/// Get the root directory of the software, which contains the `params` and `sessions`
/// directories.
pub fn get_sw_root() -> Result<PathBuf, env::VarError> {
    env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}
