//! Walks over parent references.
//!
//! # Edge Direction
//!
//! Duplicate chains point `child → parent`. A chain's root is the report
//! reached by following parent references until one is unset. Stored data is
//! treated as an acyclic forest, but every walk carries a visited set and a
//! depth bound so corrupt rows cannot loop forever.

use std::collections::{HashSet, VecDeque};

use anyhow::Result;
use bugsift_core::Store;
use bugsift_core::model::{ClassificationTag, Report};
use tracing::warn;

/// Follow parent references from `id` to the root of its chain.
///
/// Stops early at a missing parent (returning the last report that exists),
/// at a revisited id, or after `max_depth` hops.
///
/// # Errors
///
/// Propagates store read failures.
pub fn resolve_root(store: &dyn Store, id: &str, max_depth: usize) -> Result<String> {
    let mut current = id.to_string();
    let mut visited: HashSet<String> = HashSet::from([current.clone()]);

    for _ in 0..max_depth {
        let Some(report) = store.get_report(&current)? else {
            break;
        };
        let Some(parent) = report.parent_id else {
            return Ok(current);
        };
        if store.get_report(&parent)?.is_none() {
            warn!(report = %current, %parent, "parent reference points at a missing report");
            return Ok(current);
        }
        if !visited.insert(parent.clone()) {
            warn!(report = %current, %parent, "parent chain loops back on itself");
            return Ok(current);
        }
        current = parent;
    }

    if visited.len() > max_depth {
        warn!(start = %id, stopped_at = %current, max_depth, "parent chain exceeds depth bound");
    }
    Ok(current)
}

/// Every report below `root`, breadth-first, each level oldest first.
///
/// # Errors
///
/// Propagates store read failures.
pub fn descendants(store: &dyn Store, root: &str, max_depth: usize) -> Result<Vec<Report>> {
    let mut found = Vec::new();
    let mut visited: HashSet<String> = HashSet::from([root.to_string()]);
    let mut queue: VecDeque<(String, usize)> = VecDeque::from([(root.to_string(), 0)]);

    while let Some((current, depth)) = queue.pop_front() {
        if depth >= max_depth {
            warn!(%root, at = %current, max_depth, "stopping descendant walk at depth bound");
            continue;
        }
        for child in store.children_of(&current)? {
            if visited.insert(child.id.clone()) {
                queue.push_back((child.id.clone(), depth + 1));
                found.push(child);
            }
        }
    }
    Ok(found)
}

/// Count `Duplicate`-tagged reports anywhere below `root`.
///
/// # Errors
///
/// Propagates store read failures.
pub fn count_duplicates(store: &dyn Store, root: &str, max_depth: usize) -> Result<usize> {
    Ok(descendants(store, root, max_depth)?
        .iter()
        .filter(|r| r.tag == ClassificationTag::Duplicate)
        .count())
}

/// Check whether pointing `report_id` at `parent_id` would close a loop.
///
/// Returns the offending path `report_id -> parent_id -> ... -> report_id`
/// when it would. Chains deeper than `max_depth` are refused the same way,
/// since the walk cannot prove them acyclic.
///
/// # Errors
///
/// Propagates store read failures.
pub fn would_create_cycle(
    store: &dyn Store,
    report_id: &str,
    parent_id: &str,
    max_depth: usize,
) -> Result<Option<Vec<String>>> {
    let mut path = vec![report_id.to_string(), parent_id.to_string()];
    if report_id == parent_id {
        return Ok(Some(path));
    }

    let mut current = parent_id.to_string();
    let mut visited: HashSet<String> = HashSet::from([current.clone()]);
    for _ in 0..max_depth {
        let next = match store.get_report(&current)? {
            Some(Report {
                parent_id: Some(next),
                ..
            }) => next,
            _ => return Ok(None),
        };
        path.push(next.clone());
        if next == report_id {
            return Ok(Some(path));
        }
        if !visited.insert(next.clone()) {
            // Existing loop that does not involve `report_id`.
            return Ok(Some(path));
        }
        current = next;
    }
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bugsift_core::MemoryStore;
    use bugsift_core::model::Metadata;

    fn report(id: &str, created: i64, parent: Option<&str>) -> Report {
        let tag = if parent.is_some() {
            ClassificationTag::Duplicate
        } else {
            ClassificationTag::New
        };
        Report {
            id: id.into(),
            title: id.into(),
            description: String::new(),
            repro_steps: None,
            logs: None,
            reporter: None,
            metadata: Metadata::default(),
            embedding: None,
            tag,
            parent_id: parent.map(str::to_string),
            match_confidence: parent.map(|_| 0.8),
            quality_score: None,
            created_at_us: created,
            updated_at_us: created,
            resolved_at_us: None,
        }
    }

    fn store_with(reports: &[Report]) -> MemoryStore {
        let store = MemoryStore::new();
        for r in reports {
            store.save_report(r).expect("save");
        }
        store
    }

    //   root
    //   ├── a
    //   │   └── c
    //   └── b
    fn tree() -> MemoryStore {
        store_with(&[
            report("root", 1, None),
            report("a", 2, Some("root")),
            report("b", 3, Some("root")),
            report("c", 4, Some("a")),
        ])
    }

    #[test]
    fn root_of_deep_child_is_found() {
        let store = tree();
        assert_eq!(resolve_root(&store, "c", 64).expect("walk"), "root");
        assert_eq!(resolve_root(&store, "root", 64).expect("walk"), "root");
    }

    #[test]
    fn descendants_are_breadth_first_and_oldest_first() {
        let store = tree();
        let ids: Vec<String> = descendants(&store, "root", 64)
            .expect("walk")
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(count_duplicates(&store, "root", 64).expect("count"), 3);
    }

    #[test]
    fn depth_bound_limits_descendants() {
        let store = tree();
        assert_eq!(descendants(&store, "root", 1).expect("walk").len(), 2);
    }

    #[test]
    fn cycle_through_self_is_detected() {
        let store = tree();
        let path = would_create_cycle(&store, "a", "c", 64)
            .expect("walk")
            .expect("cycle");
        assert_eq!(path, ["a", "c", "a"]);
        assert!(would_create_cycle(&store, "b", "c", 64).expect("walk").is_none());
        assert!(would_create_cycle(&store, "b", "b", 64).expect("walk").is_some());
    }

    #[test]
    fn corrupt_loop_terminates() {
        // x -> y -> x, written directly to simulate damaged data.
        let store = store_with(&[report("x", 1, Some("y")), report("y", 2, Some("x"))]);
        let root = resolve_root(&store, "x", 64).expect("walk");
        assert!(root == "x" || root == "y");
        assert!(would_create_cycle(&store, "z", "x", 64).expect("walk").is_some());
    }
}
