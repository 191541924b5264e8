use std::fs;
use std::path::Path;

use anyhow::{Context as AnyhowContext, Result};

use crate::dsl::Collaboration;

pub fn load_collaboration_from_yaml(file_path: impl AsRef<Path>) -> Result<Collaboration> {
    let file_path = file_path.as_ref();
    let yaml_content = fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read YAML file from {}", file_path.display()))?;

    parse_collaboration(&yaml_content)
        .with_context(|| format!("Failed to deserialize YAML content from {}", file_path.display()))
}

pub fn parse_collaboration(yaml: &str) -> Result<Collaboration> {
    let collaboration: Collaboration = serde_yaml::from_str(yaml)?;
    Ok(collaboration)
}
