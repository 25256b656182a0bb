use std::collections::{HashMap, HashSet, VecDeque};

use crate::model::{InternalRef, LineageEdge, RelationshipType};

/// Traversal direction over parent -> child edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Follow outgoing edges (towards children).
    Down,
    /// Follow incoming edges (towards parents).
    Up,
}

/// Breadth-first traversal over the non-deleted edge set, optionally
/// restricted to one relationship type and bounded in depth. Returns
/// the set of reached nodes excluding the start node.
fn traverse(
    edges: &[LineageEdge],
    start: InternalRef,
    direction: Direction,
    relationship_type: Option<RelationshipType>,
    max_depth: Option<usize>,
) -> HashSet<InternalRef> {
    let mut adjacency: HashMap<InternalRef, Vec<InternalRef>> = HashMap::new();
    for edge in edges {
        if edge.is_deleted {
            continue;
        }
        if let Some(rel) = relationship_type {
            if edge.relationship_type != rel {
                continue;
            }
        }
        let (from, to) = match direction {
            Direction::Down => (edge.parent, edge.child),
            Direction::Up => (edge.child, edge.parent),
        };
        adjacency.entry(from).or_default().push(to);
    }

    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back((start, 0usize));
    while let Some((node, depth)) = queue.pop_front() {
        if max_depth.is_some_and(|limit| depth >= limit) {
            continue;
        }
        for &next in adjacency.get(&node).into_iter().flatten() {
            if next != start && seen.insert(next) {
                queue.push_back((next, depth + 1));
            }
        }
    }
    seen
}

/// Whether `target` is reachable from `start` following outgoing
/// non-deleted edges. O(V+E); acceptable because edges arrive one at a
/// time under human/workflow-driven rates.
pub fn is_reachable(edges: &[LineageEdge], start: InternalRef, target: InternalRef) -> bool {
    if start == target {
        return true;
    }
    traverse(edges, start, Direction::Down, None, None).contains(&target)
}

/// Authoritative cycle check: inserting parent -> child closes a cycle
/// exactly when parent is already reachable from child (a self-edge is
/// the degenerate case). Must be evaluated against the committed edge
/// set inside the same transaction that inserts the edge.
pub fn would_create_cycle(
    edges: &[LineageEdge],
    parent: InternalRef,
    child: InternalRef,
) -> bool {
    is_reachable(edges, child, parent)
}

pub fn descendants(
    edges: &[LineageEdge],
    start: InternalRef,
    relationship_type: Option<RelationshipType>,
    max_depth: Option<usize>,
) -> HashSet<InternalRef> {
    traverse(edges, start, Direction::Down, relationship_type, max_depth)
}

pub fn ancestors(
    edges: &[LineageEdge],
    start: InternalRef,
    relationship_type: Option<RelationshipType>,
    max_depth: Option<usize>,
) -> HashSet<InternalRef> {
    traverse(edges, start, Direction::Up, relationship_type, max_depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{new_internal_ref, Euid};
    use chrono::Utc;

    fn edge(parent: InternalRef, child: InternalRef, rel: RelationshipType) -> LineageEdge {
        static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);
        let n = COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        LineageEdge {
            internal: new_internal_ref(),
            euid: Euid::parse(&format!("LN{}", n)).unwrap(),
            parent,
            parent_euid: Euid::parse("AA1").unwrap(),
            child,
            child_euid: Euid::parse("AA2").unwrap(),
            relationship_type: rel,
            is_deleted: false,
            created_by: "test".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn chain_reachability_and_cycle_detection() {
        let (a, b, c) = (new_internal_ref(), new_internal_ref(), new_internal_ref());
        let edges = vec![
            edge(a, b, RelationshipType::Contains),
            edge(b, c, RelationshipType::Contains),
        ];

        assert!(is_reachable(&edges, a, c));
        assert!(!is_reachable(&edges, c, a));
        // closing the chain back to a would cycle
        assert!(would_create_cycle(&edges, c, a));
        // a parallel edge in the existing direction would not
        assert!(!would_create_cycle(&edges, a, c));
    }

    #[test]
    fn self_edge_is_a_cycle() {
        let a = new_internal_ref();
        assert!(would_create_cycle(&[], a, a));
    }

    #[test]
    fn deleted_edges_do_not_carry_traversal() {
        let (a, b, c) = (new_internal_ref(), new_internal_ref(), new_internal_ref());
        let mut middle = edge(b, c, RelationshipType::Contains);
        middle.is_deleted = true;
        let edges = vec![edge(a, b, RelationshipType::Contains), middle];

        assert!(!is_reachable(&edges, a, c));
        assert_eq!(descendants(&edges, a, None, None), HashSet::from([b]));
    }

    #[test]
    fn relationship_filter_and_depth_bound() {
        let (a, b, c) = (new_internal_ref(), new_internal_ref(), new_internal_ref());
        let edges = vec![
            edge(a, b, RelationshipType::Contains),
            edge(b, c, RelationshipType::DerivedFrom),
        ];

        assert_eq!(
            descendants(&edges, a, Some(RelationshipType::Contains), None),
            HashSet::from([b])
        );
        assert_eq!(descendants(&edges, a, None, Some(1)), HashSet::from([b]));
        assert_eq!(descendants(&edges, a, None, Some(2)), HashSet::from([b, c]));
        assert_eq!(ancestors(&edges, c, None, None), HashSet::from([a, b]));
    }
}
