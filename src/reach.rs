//! Name-level reachability: user functions that can never touch the runtime.
//!
//! Order and control flow are irrelevant here; a plain call multigraph walked
//! depth-first with a visited set decides whether any external symbol is in a
//! function's transitive callee closure.

use crate::events::{Event, Extraction};
use crate::symbols::SymbolIndex;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Dfs;
use std::collections::HashSet;

/// User functions whose transitive call set contains no external symbol.
///
/// Calls to these are pruned everywhere downstream; their own flow graph
/// degenerates to `S → E`.
pub fn never_calls(extraction: &Extraction, index: &SymbolIndex) -> HashSet<String> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for f in &extraction.functions {
        graph.add_node(f.name.as_str());
        for ev in &f.events {
            if let Event::Call(c) = ev
                && !c.synthetic
            {
                graph.add_edge(f.name.as_str(), c.target.as_str(), ());
            }
        }
    }

    let mut quiet = HashSet::new();
    for f in &extraction.functions {
        let mut touches_runtime = false;
        let mut dfs = Dfs::new(&graph, f.name.as_str());
        while let Some(node) = dfs.next(&graph) {
            if index.is_external(node) {
                touches_runtime = true;
                break;
            }
        }
        if !touches_runtime {
            quiet.insert(f.name.clone());
        }
    }
    tracing::debug!(target: "flow", count = quiet.len(), "functions that never reach the runtime");
    quiet
}

#[cfg(test)]
use crate::events::{CallEvent, Context, FunctionEvents};

#[cfg(test)]
fn fe(name: &str, calls: &[&str]) -> FunctionEvents {
    FunctionEvents {
        name: name.into(),
        events: calls
            .iter()
            .map(|t| {
                Event::Call(CallEvent {
                    target: t.to_string(),
                    synthetic: false,
                    ctx: Context::default(),
                })
            })
            .collect(),
    }
}

#[test]
fn direct_external_call_counts() {
    let ex = Extraction {
        functions: vec![fe("f", &["puts"])],
    };
    let index = SymbolIndex::for_tests(&["f"], &["puts"]);
    assert!(never_calls(&ex, &index).is_empty());
}

#[test]
fn transitive_external_call_counts() {
    let ex = Extraction {
        functions: vec![fe("f", &["helper"]), fe("helper", &["puts"])],
    };
    let index = SymbolIndex::for_tests(&["f", "helper"], &["puts"]);
    assert!(never_calls(&ex, &index).is_empty());
}

#[test]
fn pure_computation_is_pruned() {
    let ex = Extraction {
        functions: vec![fe("math", &["square"]), fe("square", &[]), fe("f", &["puts"])],
    };
    let index = SymbolIndex::for_tests(&["math", "square", "f"], &["puts"]);
    let quiet = never_calls(&ex, &index);
    assert_eq!(
        quiet,
        HashSet::from(["math".to_string(), "square".to_string()])
    );
}

#[test]
fn mutual_recursion_terminates() {
    let ex = Extraction {
        functions: vec![fe("ping", &["pong"]), fe("pong", &["ping"])],
    };
    let index = SymbolIndex::for_tests(&["ping", "pong"], &["puts"]);
    let quiet = never_calls(&ex, &index);
    assert_eq!(quiet.len(), 2);
}
