//! Version command: write Zephyr VERSION files

use convenient_git::ZephyrVersion;
use std::path::PathBuf;

use super::{CommandResult, GlobalArgs, Project};

/// Write a VERSION file into every path, or into east.yml's `version.paths`
pub async fn execute(global: &GlobalArgs, tag: Option<&str>, paths: &[PathBuf]) -> CommandResult<u8> {
    let root = std::path::absolute(&global.project_dir)?;

    let paths: Vec<PathBuf> = if paths.is_empty() {
        let listed = Project::open(global)
            .await?
            .and_then(|project| project.manifest.version)
            .map(|version| version.paths)
            .unwrap_or_default();
        if listed.is_empty() {
            eprintln!("❌ No paths given and east.yml lists no version.paths");
            return Ok(1);
        }
        listed.iter().map(|p| root.join(p)).collect()
    } else {
        paths.iter().map(|p| root.join(p)).collect()
    };

    if let Some(missing) = paths.iter().find(|p| !p.is_dir()) {
        eprintln!("❌ Cannot create VERSION in {}, the directory does not exist", missing.display());
        return Ok(1);
    }

    let version = match tag {
        Some(tag) => ZephyrVersion::from_tag(tag)?,
        None => ZephyrVersion::detect(&root)?,
    };
    let content = version.to_version_file();

    for dir in &paths {
        let file = dir.join("VERSION");
        let action = if file.is_file() { "Overwritten" } else { "Created" };
        tokio::fs::write(&file, &content).await?;
        println!("📝 {} {}", action, file.display());
    }
    Ok(0)
}
