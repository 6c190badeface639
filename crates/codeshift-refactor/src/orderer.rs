//! Dependency ordering for planned changes
//!
//! Changes are ordered with a stable Kahn's algorithm. Edges come from each
//! change's `depends_on` references (a change id or a target path) and from
//! explicitly declared `(before, after)` pairs. Edges with an endpoint
//! outside the plan are ignored. When several changes are ready at once the
//! one with the lower [`ChangeType::rank`] goes first, then the one
//! discovered first.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use crate::error::{RefactorError, Result};
use crate::types::{ChangeId, FileChange};

/// Orders changes so that every dependency is applied first
pub struct DependencyOrderer;

struct Graph {
    /// `successors[i]` lists the changes that must come after change `i`
    successors: Vec<Vec<usize>>,
    in_degree: Vec<usize>,
}

impl DependencyOrderer {
    /// Returns the changes in application order
    ///
    /// # Errors
    ///
    /// Returns [`RefactorError::CyclicDependency`] naming every change left
    /// unordered if the graph has a cycle. No partial order is returned.
    pub fn order(
        changes: Vec<FileChange>,
        declared: &[(ChangeId, ChangeId)],
    ) -> Result<Vec<FileChange>> {
        let order = Self::order_indices(&changes, declared)?;

        let mut slots: Vec<Option<FileChange>> = changes.into_iter().map(Some).collect();
        Ok(order
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect())
    }

    /// Groups changes into topological levels
    ///
    /// Every change in a level depends only on changes in earlier levels, so
    /// the members of one level can be processed concurrently. Within a level
    /// changes keep the tie-break order used by [`Self::order`].
    pub fn levels(
        changes: &[FileChange],
        declared: &[(ChangeId, ChangeId)],
    ) -> Result<Vec<Vec<ChangeId>>> {
        let Graph {
            successors,
            mut in_degree,
        } = Self::build_graph(changes, declared);

        let mut current: Vec<usize> = (0..changes.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut placed = 0;
        let mut levels = Vec::new();

        while !current.is_empty() {
            current.sort_by_key(|&i| (changes[i].change_type.rank(), i));
            let mut next = Vec::new();
            for &node in &current {
                for &succ in &successors[node] {
                    in_degree[succ] -= 1;
                    if in_degree[succ] == 0 {
                        next.push(succ);
                    }
                }
            }
            placed += current.len();
            levels.push(current.iter().map(|&i| changes[i].id.clone()).collect());
            current = next;
        }

        if placed < changes.len() {
            return Err(Self::cycle_error(changes, &in_degree));
        }

        Ok(levels)
    }

    fn order_indices(
        changes: &[FileChange],
        declared: &[(ChangeId, ChangeId)],
    ) -> Result<Vec<usize>> {
        let Graph {
            successors,
            mut in_degree,
        } = Self::build_graph(changes, declared);

        let key = |i: usize| (changes[i].change_type.rank(), i);
        let mut ready: BTreeSet<(u8, usize)> = (0..changes.len())
            .filter(|&i| in_degree[i] == 0)
            .map(key)
            .collect();
        let mut order = Vec::with_capacity(changes.len());

        while let Some((_, node)) = ready.pop_first() {
            order.push(node);
            for &succ in &successors[node] {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    ready.insert(key(succ));
                }
            }
        }

        if order.len() < changes.len() {
            return Err(Self::cycle_error(changes, &in_degree));
        }

        tracing::debug!(changes = order.len(), "Changes ordered");
        Ok(order)
    }

    fn build_graph(changes: &[FileChange], declared: &[(ChangeId, ChangeId)]) -> Graph {
        let by_id: HashMap<&str, usize> = changes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.as_str(), i))
            .collect();
        let by_path: HashMap<&Path, usize> = changes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.path.as_path(), i))
            .collect();

        let resolve = |reference: &str| -> Option<usize> {
            by_id
                .get(reference)
                .or_else(|| by_path.get(Path::new(reference)))
                .copied()
        };

        let mut edges: HashSet<(usize, usize)> = HashSet::new();
        for (after, change) in changes.iter().enumerate() {
            for reference in &change.depends_on {
                match resolve(reference) {
                    Some(before) => {
                        edges.insert((before, after));
                    }
                    None => tracing::debug!(
                        change_id = %change.id,
                        reference = %reference,
                        "Ignoring dependency outside the plan"
                    ),
                }
            }
        }
        for (before, after) in declared {
            if let (Some(&b), Some(&a)) = (by_id.get(before.as_str()), by_id.get(after.as_str())) {
                edges.insert((b, a));
            }
        }

        let mut successors = vec![Vec::new(); changes.len()];
        let mut in_degree = vec![0; changes.len()];
        let mut sorted: Vec<(usize, usize)> = edges.into_iter().collect();
        sorted.sort_unstable();
        for (before, after) in sorted {
            successors[before].push(after);
            in_degree[after] += 1;
        }

        Graph {
            successors,
            in_degree,
        }
    }

    fn cycle_error(changes: &[FileChange], in_degree: &[usize]) -> RefactorError {
        let members: Vec<ChangeId> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &degree)| degree > 0)
            .map(|(i, _)| changes[i].id.clone())
            .collect();

        tracing::warn!(members = members.len(), "Dependency cycle detected");
        RefactorError::CyclicDependency { members }
    }
}
