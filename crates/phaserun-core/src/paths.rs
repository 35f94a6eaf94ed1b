use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const PHASERUN_DIR: &str = ".phaserun";
pub const CHECKPOINTS_DIR: &str = ".phaserun/checkpoints";
pub const CONFIG_FILE: &str = ".phaserun/config.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn phaserun_dir(root: &Path) -> PathBuf {
    root.join(PHASERUN_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn checkpoints_dir(root: &Path) -> PathBuf {
    root.join(CHECKPOINTS_DIR)
}

pub fn checkpoint_path(root: &Path, id: &str) -> PathBuf {
    checkpoints_dir(root).join(format!("{id}.json"))
}
