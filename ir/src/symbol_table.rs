use crate::ir_hasher::HashMap;

/// Name → handle table that keeps names unique by appending `.N`.
///
/// Empty names are never entered; such values stay anonymous.
#[derive(Debug, Clone)]
pub struct SymbolTable<T> {
    map: HashMap<String, T>,
    last_unique: u32,
}

impl<T> Default for SymbolTable<T> {
    fn default() -> Self {
        Self { map: HashMap::default(), last_unique: 0 }
    }
}

impl<T: Copy> SymbolTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value` under `name`, or under a uniqued variant of it if the
    /// name is taken. Returns the name actually used.
    pub fn insert_unique(&mut self, name: &str, value: T) -> String {
        if name.is_empty() {
            return String::new();
        }
        let unique = self.make_unique(name);
        self.map.insert(unique.clone(), value);
        unique
    }

    fn make_unique(&mut self, name: &str) -> String {
        if !self.map.contains_key(name) {
            return name.to_owned();
        }
        loop {
            self.last_unique += 1;
            let candidate = format!("{name}.{}", self.last_unique);
            if !self.map.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<T> {
        self.map.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<T> {
        self.map.remove(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Entries sorted by name.
    pub fn sorted(&self) -> Vec<(&str, T)> {
        let mut entries: Vec<_> = self.map.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taken_names_get_numeric_suffixes() {
        let mut table = SymbolTable::new();
        assert_eq!(table.insert_unique("Square", 1), "Square");
        assert_eq!(table.insert_unique("Square", 2), "Square.1");
        assert_eq!(table.insert_unique("Square", 3), "Square.2");
        assert_eq!(table.lookup("Square.1"), Some(2));
    }

    #[test]
    fn empty_names_stay_anonymous() {
        let mut table = SymbolTable::new();
        assert_eq!(table.insert_unique("", 7), "");
        assert!(table.is_empty());
    }

    #[test]
    fn removed_names_can_be_reused() {
        let mut table = SymbolTable::new();
        table.insert_unique("f", 0);
        assert_eq!(table.remove("f"), Some(0));
        assert_eq!(table.insert_unique("f", 1), "f");
    }
}
