//! Package-keyed maps of the package graph.

use std::collections::{BTreeMap, BTreeSet};

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::descriptors::{Descriptors, PackageRef};
use crate::header::Attrs;

/// Packages with their attributes, ordered by dotted name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Packages {
    map: BTreeMap<PackageRef, Attrs>,
}

impl Packages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, package: &PackageRef) -> Option<&Attrs> {
        self.map.get(package)
    }

    pub fn get_mut(&mut self, package: &PackageRef) -> Option<&mut Attrs> {
        self.map.get_mut(package)
    }

    pub fn insert(&mut self, package: PackageRef, attrs: Attrs) -> Option<Attrs> {
        self.map.insert(package, attrs)
    }

    pub fn remove(&mut self, package: &PackageRef) -> Option<Attrs> {
        self.map.remove(package)
    }

    pub fn contains_key(&self, package: &PackageRef) -> bool {
        self.map.contains_key(package)
    }

    pub fn keys(&self) -> impl Iterator<Item = &PackageRef> {
        self.map.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PackageRef, &Attrs)> {
        self.map.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&PackageRef, &mut Attrs)> {
        self.map.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&PackageRef, &mut Attrs) -> bool) {
        self.map.retain(|package, attrs| keep(package, attrs));
    }

    /// Looks a package up by dotted name.
    pub fn by_fqn(&self, fqn: &str) -> Option<(&PackageRef, &Attrs)> {
        self.map.iter().find(|(package, _)| package.fqn() == fqn)
    }

    /// Merges attribute sets into the entry for `package`, earlier values
    /// winning. With `unique` set, an occupied key moves on to its next
    /// duplicate slot so the existing entry is left untouched.
    pub fn merge(
        &mut self,
        registry: &Descriptors,
        package: &PackageRef,
        unique: bool,
        sources: &[Option<&Attrs>],
    ) -> &mut Attrs {
        let mut key = package.clone();
        if unique {
            while self.map.contains_key(&key) {
                key = registry.duplicate(&key);
            }
        }
        let attrs = self.map.entry(key).or_default();
        for source in sources.iter().flatten() {
            attrs.merge_with(source, false);
        }
        attrs
    }
}

impl FromIterator<(PackageRef, Attrs)> for Packages {
    fn from_iter<T: IntoIterator<Item = (PackageRef, Attrs)>>(iter: T) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Packages {
    type Item = (&'a PackageRef, &'a Attrs);
    type IntoIter = std::collections::btree_map::Iter<'a, PackageRef, Attrs>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.iter()
    }
}

impl Serialize for Packages {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.map.len()))?;
        for (package, attrs) in &self.map {
            map.serialize_entry(package.fqn(), attrs)?;
        }
        map.end()
    }
}

/// Package-level dependency edges, self edges excluded.
pub type Uses = BTreeMap<PackageRef, BTreeSet<PackageRef>>;

/// Adds edges from `from` to every package in `to` other than itself.
pub fn add_uses<'a>(uses: &mut Uses, from: &PackageRef, to: impl IntoIterator<Item = &'a PackageRef>) {
    let edges = uses.entry(from.clone()).or_default();
    for package in to {
        if package != from {
            edges.insert(package.clone());
        }
    }
}

/// Serialises a [`Uses`] map with dotted names.
pub(crate) fn uses_to_strings(uses: &Uses) -> BTreeMap<String, Vec<String>> {
    uses.iter()
        .map(|(from, to)| {
            (
                from.fqn().to_string(),
                to.iter().map(|p| p.fqn().to_string()).collect(),
            )
        })
        .collect()
}
