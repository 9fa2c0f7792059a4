//! Property-based test generators using proptest.
//!
//! Generated paths never collide as file and directory: directory
//! segments are bare names, file names always carry an extension.

use crate::fixtures::Tree;
use proptest::prelude::*;

/// Strategy for `/`-separated relative file paths, up to two directories deep.
pub fn relative_path_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("([a-c]{1,2}/){0,2}[a-e]{1,3}\\.(txt|bin)").expect("Invalid regex")
}

/// Strategy for small file contents, empty files included.
pub fn content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

/// Strategy for a file tree of up to `max_files` entries.
pub fn tree_strategy(max_files: usize) -> impl Strategy<Value = Tree> {
    prop::collection::btree_map(relative_path_strategy(), content_strategy(), 0..=max_files)
}

/// Strategy for a pair of trees that share some paths.
///
/// The second tree starts as a copy of a random subset of the first, with
/// some contents replaced and some extra files added.
pub fn overlapping_trees_strategy(max_files: usize) -> impl Strategy<Value = (Tree, Tree)> {
    (tree_strategy(max_files), tree_strategy(max_files), any::<u64>()).prop_map(
        |(first, extra, seed)| {
            let mut second = Tree::new();
            for (i, (path, data)) in first.iter().enumerate() {
                match (seed >> (i % 64)) & 0b11 {
                    0 => {}
                    1 => {
                        let mut changed = data.clone();
                        changed.push(0xff);
                        second.insert(path.clone(), changed);
                    }
                    _ => {
                        second.insert(path.clone(), data.clone());
                    }
                }
            }
            for (path, data) in extra {
                second.entry(path).or_insert(data);
            }
            (first, second)
        },
    )
}
