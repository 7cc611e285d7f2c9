use crate::query::QueryText;

/// deduplicated record of asked questions, newest first.
///
/// only `insert` adds and only `clear` removes; there is no single-entry
/// removal. the owning session is the only writer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryStore {
    entries: Vec<QueryText>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// prepends `query` unless an equal entry already exists anywhere.
    /// an existing entry keeps its position.
    pub fn insert(&mut self, query: QueryText) {
        if self.contains(&query) {
            return;
        }
        self.entries.insert(0, query);
    }

    /// current snapshot, newest first.
    pub fn entries(&self) -> &[QueryText] {
        &self.entries
    }

    pub fn contains(&self, query: &QueryText) -> bool {
        self.entries.iter().any(|q| q == query)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// identity passthrough for re-filling the input from a picked entry.
    pub fn select(&self, query: QueryText) -> QueryText {
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn q(s: &str) -> QueryText {
        QueryText::parse(s).unwrap()
    }

    fn texts(h: &HistoryStore) -> Vec<&str> {
        h.entries().iter().map(QueryText::as_str).collect()
    }

    #[test]
    fn repeated_insert_keeps_one_copy() {
        let mut h = HistoryStore::new();
        h.insert(q("tort"));
        h.insert(q("tort"));
        assert_eq!(texts(&h), vec!["tort"]);
    }

    #[test]
    fn newest_first() {
        let mut h = HistoryStore::new();
        h.insert(q("a"));
        h.insert(q("b"));
        assert_eq!(texts(&h), vec!["b", "a"]);
    }

    #[test]
    fn duplicate_does_not_reorder() {
        let mut h = HistoryStore::new();
        h.insert(q("a"));
        h.insert(q("b"));
        h.insert(q("c"));
        h.insert(q("a"));
        assert_eq!(texts(&h), vec!["c", "b", "a"]);
    }

    #[test]
    fn clear_empties_everything() {
        let mut h = HistoryStore::new();
        h.insert(q("a"));
        h.insert(q("b"));
        h.clear();
        assert!(h.is_empty());
        assert!(h.entries().is_empty());
        // usable again afterwards
        h.insert(q("a"));
        assert_eq!(texts(&h), vec!["a"]);
    }

    #[test]
    fn entries_is_restartable_and_select_is_pure() {
        let mut h = HistoryStore::new();
        h.insert(q("a"));
        h.insert(q("b"));
        assert_eq!(h.entries(), h.entries());
        let picked = h.select(q("a"));
        assert_eq!(picked, q("a"));
        assert_eq!(h.len(), 2);
        assert_eq!(texts(&h), vec!["b", "a"]);
    }
}
