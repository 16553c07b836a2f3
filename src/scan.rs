//! Loads bundles and classpath entries from disk.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;
use zip::ZipArchive;

use crate::classfile;
use crate::jar::Container;

/// Loads a directory, a `.jar`/`.zip` archive or a single `.class` file.
pub fn load_container(path: &Path) -> Result<Container> {
    let name = path_key(path);
    let mut container = Container::new(name);
    if path.is_dir() {
        load_dir(path, path, &mut container)?;
        debug!(path = %path.display(), resources = container.len(), "loaded directory");
        return Ok(container);
    }

    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    match extension {
        "class" => load_class_file(path, &mut container)?,
        "jar" | "zip" => load_archive(path, &mut container)?,
        _ => anyhow::bail!("unsupported input file: {}", path.display()),
    }
    debug!(path = %path.display(), resources = container.len(), "loaded container");
    Ok(container)
}

/// Loads each classpath entry in the given order.
pub fn load_classpath(classpath: &[PathBuf]) -> Result<Vec<Container>> {
    classpath.iter().map(|entry| load_container(entry)).collect()
}

fn load_dir(root: &Path, dir: &Path, container: &mut Container) -> Result<()> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("failed to read directory {}", dir.display()))?
    {
        let entry = entry.with_context(|| format!("failed to read entry under {}", dir.display()))?;
        entries.push(entry.path());
    }

    // Keep deterministic ordering regardless of the file system.
    entries.sort_by(|a, b| path_key(a).cmp(&path_key(b)));

    for entry in entries {
        if entry.is_dir() {
            load_dir(root, &entry, container)?;
            continue;
        }
        let relative = entry
            .strip_prefix(root)
            .with_context(|| format!("{} is outside {}", entry.display(), root.display()))?;
        let resource = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let data = fs::read(&entry).with_context(|| format!("failed to read {}", entry.display()))?;
        container.put(&resource, data);
    }
    Ok(())
}

/// A lone class file is placed at the path its declared name implies.
fn load_class_file(path: &Path, container: &mut Container) -> Result<()> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let name = classfile::declared_name(&data)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    container.put(&format!("{name}.class"), data);
    Ok(())
}

fn load_archive(path: &Path, container: &mut Container) -> Result<()> {
    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("failed to read {}", path.display()))?;

    let mut entry_names = Vec::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if !entry.is_dir() {
            entry_names.push(entry.name().to_string());
        }
    }
    entry_names.sort();

    for name in entry_names {
        let mut entry = archive
            .by_name(&name)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        container.put(&name, data);
    }
    Ok(())
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
