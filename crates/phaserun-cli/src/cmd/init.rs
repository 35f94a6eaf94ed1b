use std::path::Path;

use anyhow::Context;
use phaserun_core::{io, paths, Config};

pub fn run(root: &Path, name: Option<&str>, endpoint: Option<&str>) -> anyhow::Result<()> {
    let project_name = name.map(str::to_string).unwrap_or_else(|| {
        root.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string())
    });

    println!("Initializing phaserun in: {}", root.display());

    let checkpoints = paths::checkpoints_dir(root);
    io::ensure_dir(&checkpoints)
        .with_context(|| format!("failed to create {}", checkpoints.display()))?;

    let mut config = Config::new(&project_name);
    if let Some(endpoint) = endpoint {
        config.backend.endpoint = endpoint.to_string();
    }
    let yaml = serde_yaml::to_string(&config)?;
    let created = io::write_if_missing(&paths::config_path(root), yaml.as_bytes())
        .context("failed to write config.yaml")?;
    if created {
        println!("  created: {}", paths::CONFIG_FILE);
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
    }

    Ok(())
}
