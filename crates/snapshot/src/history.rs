//! Newest-first walks over an item's snapshot chain

use crate::diff::DiffSummary;
use crate::error::Result;
use chrono::{DateTime, Utc};
use cw_core::{Blake3Hash, ObjectStore, Signature, Tree};
use std::sync::Arc;

/// One history entry, ready for display
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    pub id: Blake3Hash,
    pub parent: Option<Blake3Hash>,
    pub author: Signature,
    pub message: String,
    /// Upstream update time recorded with the commit
    pub when: DateTime<Utc>,
    /// Human relative age, e.g. "3 hours ago"
    pub age: String,
    /// Changes against the parent (against an empty tree for the first snapshot)
    pub summary: DiffSummary,
}

impl SnapshotInfo {
    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }
}

/// Bounded history of one item
///
/// Nothing is read until iterated; every call to [`History::iter`] starts
/// again from the head captured when the history was opened.
pub struct History {
    store: Arc<ObjectStore>,
    head: Option<Blake3Hash>,
    limit: usize,
}

impl History {
    pub(crate) fn new(store: Arc<ObjectStore>, head: Option<Blake3Hash>, limit: usize) -> Self {
        Self { store, head, limit }
    }

    pub fn iter(&self) -> HistoryIter<'_> {
        HistoryIter {
            store: self.store.as_ref(),
            next: self.head,
            remaining: self.limit,
        }
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = Result<SnapshotInfo>;
    type IntoIter = HistoryIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct HistoryIter<'a> {
    store: &'a ObjectStore,
    next: Option<Blake3Hash>,
    remaining: usize,
}

impl HistoryIter<'_> {
    fn load(&self, id: Blake3Hash) -> Result<SnapshotInfo> {
        let snapshot = self.store.read_snapshot(id)?;
        let tree = self.store.read_tree(snapshot.root_tree)?;
        let parent_tree = match snapshot.parent {
            Some(parent) => {
                let parent = self.store.read_snapshot(parent)?;
                self.store.read_tree(parent.root_tree)?
            }
            None => Arc::new(Tree::new()),
        };
        let summary = DiffSummary::between(self.store.blob_store(), &parent_tree, &tree)?;

        Ok(SnapshotInfo {
            id,
            parent: snapshot.parent,
            when: snapshot.author.when,
            age: format_relative_time(snapshot.author.when, Utc::now()),
            author: snapshot.author,
            message: snapshot.message,
            summary,
        })
    }
}

impl Iterator for HistoryIter<'_> {
    type Item = Result<SnapshotInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let id = self.next.take()?;
        self.remaining -= 1;

        match self.load(id) {
            Ok(info) => {
                self.next = info.parent;
                Some(Ok(info))
            }
            // Stop after surfacing the error; the chain past it is unreachable
            Err(e) => Some(Err(e)),
        }
    }
}

/// Format a timestamp relative to `now` ("2 hours ago")
pub fn format_relative_time(when: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - when).num_seconds();
    if seconds < 0 {
        return "in the future".to_string();
    }

    if seconds < 60 {
        format!("{} seconds ago", seconds)
    } else if seconds < 3600 {
        format!("{} minutes ago", seconds / 60)
    } else if seconds < 86400 {
        format!("{} hours ago", seconds / 3600)
    } else if seconds < 604800 {
        format!("{} days ago", seconds / 86400)
    } else {
        format!("{} weeks ago", seconds / 604800)
    }
}
