// tests/library_properties.rs

use std::collections::HashSet;

use proptest::prelude::*;
use taskmux::Library;

mod common;
use common::task;

/// Build an acyclic library of `n` tasks where each task may depend on any
/// earlier task, as chosen by `edges`.
fn arbitrary_library(n: usize, edges: &[(usize, usize)]) -> Library {
    let ids: Vec<String> = (0..n).map(|i| format!("t{i}")).collect();
    Library::new((0..n).map(|i| {
        let deps: Vec<&str> = edges
            .iter()
            .filter(|(to, from)| *to == i && *from < i)
            .map(|(_, from)| ids[*from].as_str())
            .collect();
        task(&ids[i]).with_dependencies(&deps).build()
    }))
}

proptest! {
    #[test]
    fn subtree_is_closed_under_dependencies(
        n in 1usize..12,
        edges in prop::collection::vec((0usize..12, 0usize..12), 0..24),
        root in 0usize..12,
    ) {
        let lib = arbitrary_library(n, &edges);
        let root_id = format!("t{}", root % n);
        let subtree = lib.subtree([&root_id]);

        for id in subtree.ids() {
            let deps = lib.task(id).unwrap().metadata().dependencies.clone();
            for dep in deps {
                prop_assert!(subtree.has(&dep), "{id} is included but its dependency {dep} is not");
            }
        }
    }

    #[test]
    fn subtree_preserves_canonical_order(
        n in 1usize..12,
        edges in prop::collection::vec((0usize..12, 0usize..12), 0..24),
        root in 0usize..12,
    ) {
        let lib = arbitrary_library(n, &edges);
        let root_id = format!("t{}", root % n);
        let subtree = lib.subtree([&root_id]);

        let positions: Vec<usize> = subtree
            .ids()
            .iter()
            .map(|id| lib.ids().iter().position(|x| x == id).unwrap())
            .collect();
        prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn subtree_is_idempotent(
        n in 1usize..12,
        edges in prop::collection::vec((0usize..12, 0usize..12), 0..24),
        root in 0usize..12,
    ) {
        let lib = arbitrary_library(n, &edges);
        let root_id = format!("t{}", root % n);
        let once = lib.subtree([&root_id]);
        let twice: HashSet<String> = once.subtree(once.ids().to_vec()).ids().iter().cloned().collect();
        let once_set: HashSet<String> = once.ids().iter().cloned().collect();
        prop_assert_eq!(once_set, twice);
    }
}
