use serde::Serialize;

use crate::domain::NewsItem;

/// Items selected for one source in a single run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceGroup {
    pub source: String,
    pub items: Vec<NewsItem>,
}

/// The transient result of one collection cycle, grouped by source in
/// configuration order. Groups may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunBatch {
    pub groups: Vec<SourceGroup>,
}

impl RunBatch {
    pub fn new(groups: Vec<SourceGroup>) -> Self {
        Self { groups }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.items.is_empty())
    }

    pub fn total(&self) -> usize {
        self.groups.iter().map(|g| g.items.len()).sum()
    }

    pub fn items(&self) -> impl Iterator<Item = &NewsItem> {
        self.groups.iter().flat_map(|g| g.items.iter())
    }

    pub fn group(&self, source: &str) -> Option<&SourceGroup> {
        self.groups.iter().find(|g| g.source == source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_when_all_groups_empty() {
        let batch = RunBatch::new(vec![
            SourceGroup {
                source: "A".into(),
                items: vec![],
            },
            SourceGroup {
                source: "B".into(),
                items: vec![],
            },
        ]);
        assert!(batch.is_empty());
        assert_eq!(batch.total(), 0);
        assert!(RunBatch::default().is_empty());
    }

    #[test]
    fn test_items_flattens_in_group_order() {
        let a = NewsItem::new("a", "A", "First", "https://a/1").unwrap();
        let b = NewsItem::new("b", "B", "Second", "https://b/1").unwrap();
        let batch = RunBatch::new(vec![
            SourceGroup {
                source: "A".into(),
                items: vec![a.clone()],
            },
            SourceGroup {
                source: "B".into(),
                items: vec![b.clone()],
            },
        ]);
        assert!(!batch.is_empty());
        assert_eq!(batch.total(), 2);
        let ids: Vec<_> = batch.items().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec![a.id.as_str(), b.id.as_str()]);
        assert_eq!(batch.group("B").unwrap().items.len(), 1);
    }
}
