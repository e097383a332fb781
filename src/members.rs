/// Insertion-ordered owning container keyed by a stable, never reused id.
///
/// Ids grow monotonically, so the backing vector stays sorted by id and
/// lookups are binary searches.
#[derive(Debug)]
pub(crate) struct Members<T> {
    entries: Vec<(u32, T)>,
    next_id: u32,
}

impl<T> Default for Members<T> {
    fn default() -> Self {
        Self { entries: Vec::new(), next_id: 0 }
    }
}

impl<T> Members<T> {
    pub(crate) fn insert(&mut self, value: T) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, value));
        id
    }

    /// Id the next insertion will receive.
    pub(crate) fn next_id(&self) -> u32 {
        self.next_id
    }

    fn position(&self, id: u32) -> Option<usize> {
        self.entries.binary_search_by_key(&id, |(k, _)| *k).ok()
    }

    pub(crate) fn get(&self, id: u32) -> Option<&T> {
        self.position(id).map(|i| &self.entries[i].1)
    }

    pub(crate) fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        self.position(id).map(|i| &mut self.entries[i].1)
    }

    pub(crate) fn remove(&mut self, id: u32) -> Option<T> {
        self.position(id).map(|i| self.entries.remove(i).1)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }
}
