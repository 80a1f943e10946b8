use serde::{Deserialize, Serialize};

/// A variable whose value the engine records for every explored path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedVariable {
    /// Engine object label, e.g. `x`, `ret` or `arr[2]`.
    pub name: String,
    /// Byte width of one element when derivable from the declaration.
    #[serde(default)]
    pub element_size: Option<usize>,
}

/// Watched variables in declaration order. Built by the rewriter and
/// read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedVariableSet {
    entries: Vec<WatchedVariable>,
}

impl WatchedVariableSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry; a name already present keeps its first position.
    pub(crate) fn push(&mut self, name: impl Into<String>, element_size: Option<usize>) {
        let name = name.into();
        if !self.contains(&name) {
            self.entries.push(WatchedVariable { name, element_size });
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&WatchedVariable> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &WatchedVariable> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<WatchedVariable> for WatchedVariableSet {
    fn from_iter<I: IntoIterator<Item = WatchedVariable>>(iter: I) -> Self {
        let mut set = Self::new();
        for entry in iter {
            set.push(entry.name, entry.element_size);
        }
        set
    }
}
