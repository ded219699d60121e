//! Flat arena representation of the activity tree.
//!
//! Nodes live in a single map keyed by identifier. Parent and children are
//! identifier lists, so the structure is acyclic by construction and can be
//! serialized as-is for session snapshots.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SequencingError};
use crate::models::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTree {
    root: String,
    /// Identifiers in document pre-order.
    order: Vec<String>,
    activities: HashMap<String, Activity>,
    /// Resume bookmark recorded on the root by `suspendAll`.
    suspended_activity: Option<String>,
}

impl ActivityTree {
    /// Build the tree from the parsed manifest, in document order.
    ///
    /// Fails on empty or duplicated identifiers and on any node that ends up
    /// as its own ancestor.
    pub fn build(root: &ActivityDescriptor) -> Result<Self> {
        let mut order = Vec::new();
        let mut activities = HashMap::new();

        // Explicit stack so deep manifests cannot overflow the call stack.
        let mut stack: Vec<(&ActivityDescriptor, Option<String>, usize)> = vec![(root, None, 0)];
        while let Some((descriptor, parent, depth)) = stack.pop() {
            let id = descriptor.id.trim();
            if id.is_empty() {
                return Err(SequencingError::MalformedTree(format!(
                    "activity '{}' has an empty identifier",
                    descriptor.title
                )));
            }
            if activities.contains_key(id) {
                return Err(SequencingError::MalformedTree(format!(
                    "duplicate activity identifier '{}'",
                    id
                )));
            }

            let children: Vec<String> = descriptor
                .children
                .iter()
                .map(|c| c.id.trim().to_string())
                .collect();

            activities.insert(
                id.to_string(),
                Activity {
                    id: id.to_string(),
                    title: descriptor.title.clone(),
                    resource: descriptor.resource.clone(),
                    parent,
                    children,
                    depth,
                    sequencing: descriptor.sequencing.clone(),
                    tracking: TrackingState::default(),
                },
            );
            order.push(id.to_string());

            for child in descriptor.children.iter().rev() {
                stack.push((child, Some(id.to_string()), depth + 1));
            }
        }

        let tree = Self {
            root: root.id.trim().to_string(),
            order,
            activities,
            suspended_activity: None,
        };
        tree.verify_acyclic()?;

        tracing::debug!(
            root = %tree.root,
            activities = tree.order.len(),
            "Built activity tree"
        );
        Ok(tree)
    }

    fn verify_acyclic(&self) -> Result<()> {
        for id in &self.order {
            let mut seen = HashSet::new();
            let mut cursor = Some(id.as_str());
            while let Some(current) = cursor {
                if !seen.insert(current) {
                    return Err(SequencingError::MalformedTree(format!(
                        "activity '{}' is its own ancestor",
                        current
                    )));
                }
                cursor = self
                    .activities
                    .get(current)
                    .and_then(|a| a.parent.as_deref());
            }
        }
        Ok(())
    }

    // ============================================================
    // Lookups
    // ============================================================

    pub fn root_id(&self) -> &str {
        &self.root
    }

    pub fn root(&self) -> Option<&Activity> {
        self.activities.get(&self.root)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.activities.contains_key(id)
    }

    pub fn find(&self, id: &str) -> Option<&Activity> {
        self.activities.get(id)
    }

    pub(crate) fn find_mut(&mut self, id: &str) -> Option<&mut Activity> {
        self.activities.get_mut(id)
    }

    pub fn parent(&self, id: &str) -> Option<&Activity> {
        self.find(id)
            .and_then(|a| a.parent.as_deref())
            .and_then(|p| self.find(p))
    }

    /// Children in document order.
    pub fn children(&self, id: &str) -> Vec<&Activity> {
        self.find(id)
            .map(|a| a.children.iter().filter_map(|c| self.find(c)).collect())
            .unwrap_or_default()
    }

    /// Ancestors from the parent up to the root.
    pub fn ancestors(&self, id: &str) -> Vec<&Activity> {
        let mut ancestors = Vec::new();
        let mut cursor = self.parent(id);
        while let Some(activity) = cursor {
            ancestors.push(activity);
            cursor = self.parent(&activity.id);
        }
        ancestors
    }

    /// Identifiers from the root down to and including `id`.
    pub fn path_from_root(&self, id: &str) -> Vec<String> {
        if !self.contains(id) {
            return Vec::new();
        }
        let mut path: Vec<String> = self.ancestors(id).iter().map(|a| a.id.clone()).collect();
        path.reverse();
        path.push(id.to_string());
        path
    }

    pub fn is_leaf(&self, id: &str) -> bool {
        self.find(id).is_some_and(Activity::is_leaf)
    }

    /// Whether `id` is `root` or one of its descendants.
    pub fn is_in_subtree(&self, root: &str, id: &str) -> bool {
        id == root || self.ancestors(id).iter().any(|a| a.id == root)
    }

    /// Deepest activity that contains both `a` and `b` (inclusive).
    pub fn common_ancestor(&self, a: &str, b: &str) -> Option<String> {
        let path_a = self.path_from_root(a);
        let path_b = self.path_from_root(b);
        path_a
            .iter()
            .zip(path_b.iter())
            .take_while(|(x, y)| x == y)
            .last()
            .map(|(x, _)| x.clone())
    }

    // ============================================================
    // Document order
    // ============================================================

    pub fn preorder(&self) -> &[String] {
        &self.order
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.order.iter().position(|x| x == id)
    }

    /// Index one past the last descendant of `id` in pre-order.
    pub fn subtree_end(&self, id: &str) -> Option<usize> {
        let start = self.position(id)?;
        let depth = self.find(id)?.depth;
        let end = self.order[start + 1..]
            .iter()
            .position(|x| self.find(x).map_or(true, |a| a.depth <= depth))
            .map_or(self.order.len(), |offset| start + 1 + offset);
        Some(end)
    }

    /// `id` and all of its descendants, in pre-order.
    pub fn subtree_ids(&self, id: &str) -> Vec<String> {
        match (self.position(id), self.subtree_end(id)) {
            (Some(start), Some(end)) => self.order[start..end].to_vec(),
            _ => Vec::new(),
        }
    }

    /// Activities in pre-order.
    pub fn activities(&self) -> impl Iterator<Item = &Activity> {
        self.order.iter().filter_map(|id| self.find(id))
    }

    /// Leaf activities in pre-order.
    pub fn leaves(&self) -> impl Iterator<Item = &Activity> {
        self.activities().filter(|a| a.is_leaf())
    }

    // ============================================================
    // Bookmark and tracking
    // ============================================================

    pub fn suspended_activity(&self) -> Option<&str> {
        self.suspended_activity.as_deref()
    }

    pub(crate) fn set_suspended_activity(&mut self, id: Option<String>) {
        self.suspended_activity = id;
    }

    /// Reset tracking state of `id` and its descendants for a retry.
    pub(crate) fn reset_subtree(&mut self, id: &str) {
        for descendant in self.subtree_ids(id) {
            if let Some(activity) = self.find_mut(&descendant) {
                activity.tracking.reset_for_retry();
            }
        }
    }

    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats::default();
        for activity in self.activities() {
            stats.total_activities += 1;
            if activity.is_leaf() {
                stats.leaf_count += 1;
            }
            if activity.is_tracked_resource() {
                stats.launchable_count += 1;
            }
            if activity.tracking.is_attempted() {
                stats.attempted_count += 1;
            }
            if activity.tracking.completion_status == CompletionStatus::Completed {
                stats.completed_count += 1;
            }
            if activity.tracking.objective_satisfied() == Some(true) {
                stats.satisfied_count += 1;
            }
            stats.max_depth = stats.max_depth.max(activity.depth);
        }
        stats
    }
}
