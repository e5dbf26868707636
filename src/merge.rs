//! Stage D: inline every user function and merge the per-function graphs
//! into one adjacency matrix over external symbols.
//!
//! Each user symbol occurring in an entry set, exit set, or edge is replaced
//! by that function's own entry/exit set until only externals remain; a
//! visited set per expansion drops recursive self-references. Composition then
//! projects every edge `a → b` to `end(a) × start(b)` where either side is a
//! user function.

use crate::flow::FuncFlow;
use crate::symbols::SymbolIndex;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Entry set, exit set, and internal edges of one user function, by name.
#[derive(Debug, Clone, Default)]
pub struct FuncSummary {
    pub start: BTreeSet<String>,
    pub end: BTreeSet<String>,
    pub edges: BTreeMap<String, BTreeSet<String>>,
}

pub fn summarize(flow: &FuncFlow) -> FuncSummary {
    FuncSummary {
        start: flow.start_set(),
        end: flow.end_set(),
        edges: flow.edges_by_name(),
    }
}

/// The final product: a 0/1 adjacency matrix over external symbols.
#[derive(Debug)]
pub struct MergedGraph {
    pub names: Vec<String>,
    pub matrix: Vec<Vec<u8>>,
    pos: HashMap<String, usize>,
}

impl MergedGraph {
    fn new(names: Vec<String>) -> Self {
        let pos = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        let n = names.len();
        Self {
            names,
            matrix: vec![vec![0; n]; n],
            pos,
        }
    }

    fn set(&mut self, from: &str, to: &str) {
        if let (Some(&a), Some(&b)) = (self.pos.get(from), self.pos.get(to)) {
            self.matrix[a][b] = 1;
        }
    }

    pub fn edge_names(&self) -> BTreeSet<(String, String)> {
        let mut out = BTreeSet::new();
        for (i, row) in self.matrix.iter().enumerate() {
            for (j, &bit) in row.iter().enumerate() {
                if bit != 0 {
                    out.insert((self.names[i].clone(), self.names[j].clone()));
                }
            }
        }
        out
    }
}

/// Replace user symbols in `seed` by their entry (or exit) sets until only
/// external names remain. Recursive references are dropped once visited.
fn expand(
    seed: &BTreeSet<String>,
    originals: &BTreeMap<String, FuncSummary>,
    index: &SymbolIndex,
    pick_end: bool,
) -> BTreeSet<String> {
    let mut cur = seed.clone();
    let mut visited: BTreeSet<String> = BTreeSet::new();
    loop {
        let mut next = BTreeSet::new();
        for name in &cur {
            if index.is_user(name) {
                if visited.insert(name.clone())
                    && let Some(s) = originals.get(name)
                {
                    let sub = if pick_end { &s.end } else { &s.start };
                    next.extend(sub.iter().cloned());
                }
            } else {
                next.insert(name.clone());
            }
        }
        if next == cur {
            return cur;
        }
        cur = next;
    }
}

/// Merge all per-function graphs into one matrix over `externals`.
pub fn merge(flows: &[FuncFlow], index: &SymbolIndex, externals: &[String]) -> MergedGraph {
    let originals: BTreeMap<String, FuncSummary> = flows
        .iter()
        .map(|f| (f.name.clone(), summarize(f)))
        .collect();
    merge_summaries(&originals, index, externals)
}

fn merge_summaries(
    originals: &BTreeMap<String, FuncSummary>,
    index: &SymbolIndex,
    externals: &[String],
) -> MergedGraph {
    // Exit sets expanded once up front; edge composition reads them per source.
    let expanded_ends: BTreeMap<String, BTreeSet<String>> = originals
        .iter()
        .map(|(name, s)| (name.clone(), expand(&s.end, originals, index, true)))
        .collect();

    let mut merged = MergedGraph::new(externals.to_vec());
    for summary in originals.values() {
        for (src, dsts) in &summary.edges {
            let targets = expand(dsts, originals, index, false);
            if index.is_user(src) {
                let Some(sources) = expanded_ends.get(src) else {
                    continue;
                };
                for s in sources {
                    for d in &targets {
                        merged.set(s, d);
                    }
                }
            } else {
                for d in &targets {
                    merged.set(src, d);
                }
            }
        }
    }

    tracing::debug!(
        target: "merge",
        nodes = merged.names.len(),
        edges = merged.edge_names().len(),
        "merged graph assembled"
    );
    merged
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
fn summary(start: &[&str], end: &[&str], edges: &[(&str, &[&str])]) -> FuncSummary {
    FuncSummary {
        start: set(start),
        end: set(end),
        edges: edges
            .iter()
            .map(|(src, dsts)| (src.to_string(), set(dsts)))
            .collect(),
    }
}

#[cfg(test)]
fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn sequential_calls_merge_directly() {
    let originals = BTreeMap::from([(
        "f".to_string(),
        summary(&["a"], &["c"], &[("a", &["b"]), ("b", &["c"])]),
    )]);
    let index = SymbolIndex::for_tests(&["f"], &["a", "b", "c"]);
    let merged = merge_summaries(&originals, &index, &strings(&["a", "b", "c"]));
    assert_eq!(
        merged.edge_names(),
        BTreeSet::from([
            ("a".to_string(), "b".to_string()),
            ("b".to_string(), "c".to_string()),
        ])
    );
}

#[test]
fn branch_join_merges_both_predecessors() {
    let originals = BTreeMap::from([(
        "f".to_string(),
        summary(&["a", "b"], &["c"], &[("a", &["c"]), ("b", &["c"])]),
    )]);
    let index = SymbolIndex::for_tests(&["f"], &["a", "b", "c"]);
    let merged = merge_summaries(&originals, &index, &strings(&["a", "b", "c"]));
    assert_eq!(
        merged.edge_names(),
        BTreeSet::from([
            ("a".to_string(), "c".to_string()),
            ("b".to_string(), "c".to_string()),
        ])
    );
}

#[test]
fn user_callee_is_spliced_through_its_entry_and_exit() {
    // f: b -> u -> c   with   u: { start {x}, end {y}, x -> y }
    let originals = BTreeMap::from([
        (
            "f".to_string(),
            summary(&["b"], &["c"], &[("b", &["u"]), ("u", &["c"])]),
        ),
        (
            "u".to_string(),
            summary(&["x"], &["y"], &[("x", &["y"])]),
        ),
    ]);
    let index = SymbolIndex::for_tests(&["f", "u"], &["b", "c", "x", "y"]);
    let merged = merge_summaries(&originals, &index, &strings(&["b", "c", "x", "y"]));
    assert_eq!(
        merged.edge_names(),
        BTreeSet::from([
            ("b".to_string(), "x".to_string()),
            ("x".to_string(), "y".to_string()),
            ("y".to_string(), "c".to_string()),
        ])
    );
}

#[test]
fn spawned_thread_entry_precedes_the_primitive() {
    // f: g -> pthread_create -> h   with user g: start {k}, end {k}
    let originals = BTreeMap::from([
        (
            "f".to_string(),
            summary(
                &["g"],
                &["h"],
                &[("g", &["pthread_create"]), ("pthread_create", &["h"])],
            ),
        ),
        ("g".to_string(), summary(&["k"], &["k"], &[])),
    ]);
    let index = SymbolIndex::for_tests(&["f", "g"], &["k", "pthread_create", "h"]);
    let merged = merge_summaries(&originals, &index, &strings(&["k", "pthread_create", "h"]));
    assert_eq!(
        merged.edge_names(),
        BTreeSet::from([
            ("k".to_string(), "pthread_create".to_string()),
            ("pthread_create".to_string(), "h".to_string()),
        ])
    );
}

#[test]
fn recursion_drops_the_self_reference() {
    let originals = BTreeMap::from([(
        "u".to_string(),
        summary(&["a", "u"], &["a"], &[("a", &["u"])]),
    )]);
    let index = SymbolIndex::for_tests(&["u"], &["a"]);
    let merged = merge_summaries(&originals, &index, &strings(&["a"]));
    // a -> u expands to a -> start(u) = {a}; the nested u is dropped
    assert_eq!(
        merged.edge_names(),
        BTreeSet::from([("a".to_string(), "a".to_string())])
    );
}

#[test]
fn merging_a_merged_graph_is_a_no_op() {
    // Treat a previous result as a set of external-only summaries: expansion
    // has nothing to substitute, so composition reproduces the same matrix.
    let originals = BTreeMap::from([(
        "f".to_string(),
        summary(&["a"], &["b"], &[("a", &["b"])]),
    )]);
    let index = SymbolIndex::for_tests(&["f"], &["a", "b"]);
    let externals = strings(&["a", "b"]);
    let once = merge_summaries(&originals, &index, &externals);

    let again_src = BTreeMap::from([(
        "f".to_string(),
        FuncSummary {
            start: set(&["a"]),
            end: set(&["b"]),
            edges: {
                let mut m = BTreeMap::new();
                for (x, y) in once.edge_names() {
                    m.entry(x).or_insert_with(BTreeSet::new).insert(y);
                }
                m
            },
        },
    )]);
    let twice = merge_summaries(&again_src, &index, &externals);
    assert_eq!(once.edge_names(), twice.edge_names());
}

#[test]
fn unknown_targets_never_panic() {
    let originals = BTreeMap::from([(
        "f".to_string(),
        summary(&["a"], &["a"], &[("a", &["mystery"])]),
    )]);
    let index = SymbolIndex::for_tests(&["f"], &["a", "mystery"]);
    // "mystery" is not in the node list; the edge is silently dropped
    let merged = merge_summaries(&originals, &index, &strings(&["a"]));
    assert!(merged.edge_names().is_empty());
}
