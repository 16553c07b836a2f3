//! In-memory view of a bundle or classpath entry.

use std::collections::{BTreeMap, BTreeSet};

use crate::manifest::{Manifest, MANIFEST_PATH};

/// Named set of resources keyed by `/`-separated path.
#[derive(Clone, Debug, Default)]
pub struct Container {
    name: String,
    resources: BTreeMap<String, Vec<u8>>,
    /// Directory path to the resources directly inside it. Ancestors of
    /// occupied directories are present with an empty set.
    directories: BTreeMap<String, BTreeSet<String>>,
    manifest: Option<Manifest>,
}

impl Container {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_resources<P, B>(name: impl Into<String>, resources: impl IntoIterator<Item = (P, B)>) -> Self
    where
        P: AsRef<str>,
        B: Into<Vec<u8>>,
    {
        let mut container = Self::new(name);
        for (path, bytes) in resources {
            container.put(path.as_ref(), bytes.into());
        }
        container
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds or replaces a resource. A manifest resource is parsed as well.
    pub fn put(&mut self, path: &str, bytes: Vec<u8>) {
        let path = path.trim_start_matches('/');
        if path == MANIFEST_PATH {
            self.manifest = Some(Manifest::parse(&bytes));
        }

        let parent = parent(path);
        if !self.directories.contains_key(parent) {
            let mut ancestor = parent;
            while let Some(index) = ancestor.rfind('/') {
                ancestor = &ancestor[..index];
                if self.directories.contains_key(ancestor) {
                    break;
                }
                self.directories.insert(ancestor.to_string(), BTreeSet::new());
            }
        }
        self.directories
            .entry(parent.to_string())
            .or_default()
            .insert(path.to_string());
        self.resources.insert(path.to_string(), bytes);
    }

    pub fn resource(&self, path: &str) -> Option<&[u8]> {
        self.resources
            .get(path.trim_start_matches('/'))
            .map(Vec::as_slice)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.resource(path).is_some()
    }

    pub fn resources(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.resources
            .iter()
            .map(|(path, bytes)| (path.as_str(), bytes.as_slice()))
    }

    /// Paths of `.class` resources in sorted order.
    pub fn class_paths(&self) -> impl Iterator<Item = &str> {
        self.resources
            .keys()
            .map(String::as_str)
            .filter(|path| path.ends_with(".class"))
    }

    pub fn directories(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.directories
    }

    /// True when the directory directly holds at least one resource.
    pub fn has_resources_in(&self, directory: &str) -> bool {
        self.directories
            .get(directory)
            .is_some_and(|entries| !entries.is_empty())
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    pub fn set_manifest(&mut self, manifest: Manifest) {
        self.manifest = Some(manifest);
    }

    pub fn bsn(&self) -> Option<String> {
        self.manifest.as_ref().and_then(Manifest::bsn)
    }

    pub fn version(&self) -> Option<&str> {
        self.manifest.as_ref().and_then(Manifest::version)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

fn parent(path: &str) -> &str {
    path.rfind('/').map_or("", |index| &path[..index])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_index_includes_ancestors() {
        let container = Container::with_resources(
            "bundle",
            [
                ("com/acme/impl/Foo.class", b"x".to_vec()),
                ("/com/acme/api/Bar.class", b"y".to_vec()),
                ("top.txt", b"z".to_vec()),
            ],
        );
        let dirs: Vec<_> = container.directories().keys().map(String::as_str).collect();
        assert_eq!(dirs, vec!["", "com", "com/acme", "com/acme/api", "com/acme/impl"]);
        assert!(container.has_resources_in("com/acme/api"));
        assert!(!container.has_resources_in("com/acme"));
        assert!(container.contains("com/acme/api/Bar.class"));
        assert_eq!(
            container.class_paths().collect::<Vec<_>>(),
            vec!["com/acme/api/Bar.class", "com/acme/impl/Foo.class"]
        );
    }

    #[test]
    fn manifest_resource_is_parsed() {
        let container = Container::with_resources(
            "lib.jar",
            [(
                MANIFEST_PATH,
                b"Bundle-SymbolicName: org.lib\nBundle-Version: 1.2.0\n".to_vec(),
            )],
        );
        assert_eq!(container.bsn(), Some("org.lib".to_string()));
        assert_eq!(container.version(), Some("1.2.0"));
        assert!(container.has_resources_in("META-INF"));
    }
}
