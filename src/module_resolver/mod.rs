pub mod dependency_graph;
pub mod error;

pub use dependency_graph::DependencyGraph;
pub use error::UnitError;

use crate::symbols::{NameKey, UnitId};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::path::{Component, Path, PathBuf};

/// Normalize a path by removing . and .. components. Backslashes are
/// treated as separators since `uses X in '..\X.pas'` is written for
/// Windows.
fn normalize_path(path: &Path) -> PathBuf {
    let text = path.to_string_lossy().replace('\\', "/");
    let mut components: Vec<Component> = Vec::new();

    for component in Path::new(&text).components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => match components.last() {
                Some(Component::Normal(_)) => {
                    components.pop();
                }
                _ => components.push(component),
            },
        }
    }

    components.iter().collect()
}

#[derive(Debug, Clone)]
struct UnitMapEntry {
    name: String,
    path: PathBuf,
}

/// Project-wide unit name to file mapping supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct UnitMap {
    entries: IndexMap<NameKey, UnitMapEntry>,
}

impl UnitMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        let name = name.into();
        self.entries.insert(
            NameKey::new(&name),
            UnitMapEntry {
                name,
                path: path.into(),
            },
        );
    }

    pub fn path_of(&self, name: &str) -> Option<&Path> {
        self.entries
            .get(&NameKey::new(name))
            .map(|e| e.path.as_path())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries
            .values()
            .map(|e| (e.name.as_str(), e.path.as_path()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>, P: Into<PathBuf>> FromIterator<(N, P)> for UnitMap {
    fn from_iter<I: IntoIterator<Item = (N, P)>>(iter: I) -> Self {
        let mut map = UnitMap::new();
        for (name, path) in iter {
            map.insert(name, path);
        }
        map
    }
}

/// Resolves names written in `uses` clauses to analyzed units.
///
/// A name is tried as written, then prefixed with each unit scope name
/// (`SysUtils` -> `System.SysUtils`), first against the analyzed units'
/// own names and then through the caller's unit map.
#[derive(Debug, Clone)]
pub struct UnitNames {
    by_name: FxHashMap<NameKey, UnitId>,
    by_path: FxHashMap<PathBuf, UnitId>,
    scope_names: Vec<String>,
    unit_map: UnitMap,
}

impl UnitNames {
    pub fn new(scope_names: &[String], unit_map: &UnitMap) -> Self {
        Self {
            by_name: FxHashMap::default(),
            by_path: FxHashMap::default(),
            scope_names: scope_names.to_vec(),
            unit_map: unit_map.clone(),
        }
    }

    /// Register an analyzed unit. Later registrations of the same name
    /// shadow earlier ones.
    pub fn register(&mut self, id: UnitId, name: &str, path: &Path) {
        self.by_name.insert(NameKey::new(name), id);
        self.by_path.insert(normalize_path(path), id);
    }

    fn candidates<'a>(&'a self, name: &'a str) -> impl Iterator<Item = String> + 'a {
        std::iter::once(name.to_string()).chain(
            self.scope_names
                .iter()
                .map(move |scope| format!("{}.{}", scope, name)),
        )
    }

    pub fn resolve(&self, name: &str, in_path: Option<&str>) -> Result<UnitId, UnitError> {
        if let Some(path) = in_path {
            let wanted = normalize_path(Path::new(path));
            if let Some(id) = self.find_path(&wanted) {
                return Ok(id);
            }
        }
        for candidate in self.candidates(name) {
            if let Some(id) = self.by_name.get(&NameKey::new(&candidate)) {
                return Ok(*id);
            }
        }
        for candidate in self.candidates(name) {
            if let Some(path) = self.unit_map.path_of(&candidate) {
                if let Some(id) = self.find_path(&normalize_path(path)) {
                    return Ok(id);
                }
            }
        }
        Err(UnitError::NotFound {
            name: name.to_string(),
        })
    }

    fn find_path(&self, wanted: &Path) -> Option<UnitId> {
        if let Some(id) = self.by_path.get(wanted) {
            return Some(*id);
        }
        // Relative `in` paths match the tail of an analyzed path.
        let mut matches: Vec<_> = self
            .by_path
            .iter()
            .filter(|(path, _)| path.ends_with(wanted))
            .map(|(_, id)| *id)
            .collect();
        matches.sort();
        matches.first().copied()
    }
}
