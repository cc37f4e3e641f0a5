use anyhow::{Result, Context as AnyhowContext};
use std::fs;
use std::path::Path;
use crate::dsl::Process;

pub fn load_process_from_yaml(file_path: impl AsRef<Path>) -> Result<Process> {
    let file_path = file_path.as_ref();
    let yaml_content = fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read YAML file from {}", file_path.display()))?;

    parse_process_from_yaml(&yaml_content)
        .with_context(|| format!("Failed to deserialize YAML content from {}", file_path.display()))
}

pub fn parse_process_from_yaml(yaml_content: &str) -> Result<Process> {
    let process: Process = serde_yaml::from_str(yaml_content)?;
    Ok(process)
}
