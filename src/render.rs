//! Graphviz DOT emission for per-function graphs and the merged matrix.
//!
//! `dot -Tpdf <name>.dot` reproduces the drawn documents; nothing here is
//! algorithmic.

use crate::errors::CwResult;
use crate::flow::FuncFlow;
use crate::merge::MergedGraph;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const NODE_ATTRS: &str = "node [shape=ellipse, style=filled, fillcolor=lightblue, penwidth=2.5];";

fn header(out: &mut String, title: &str) {
    let _ = writeln!(out, "digraph \"{}\" {{", escape(title));
    let _ = writeln!(out, "  rankdir=TB;");
    let _ = writeln!(out, "  size=\"8,5\";");
    let _ = writeln!(out, "  {NODE_ATTRS}");
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// One document per user function, synthetic entry and exit included.
pub fn render_flow(flow: &FuncFlow) -> String {
    let mut out = String::new();
    header(&mut out, &flow.name);
    let mut labels: Vec<String> = flow
        .graph
        .node_indices()
        .map(|n| match () {
            _ if n == flow.start => "S".to_owned(),
            _ if n == flow.end => "E".to_owned(),
            _ => flow.graph[n].name.clone(),
        })
        .collect();
    labels.sort();
    for l in &labels {
        let _ = writeln!(out, "  \"{}\";", escape(l));
    }
    for (a, b) in flow.edge_pairs() {
        let _ = writeln!(out, "  \"{}\" -> \"{}\";", escape(&a), escape(&b));
    }
    out.push_str("}\n");
    out
}

/// The merged external-symbol graph.
pub fn render_merged(merged: &MergedGraph, title: &str) -> String {
    let mut out = String::new();
    header(&mut out, title);
    for name in &merged.names {
        let _ = writeln!(out, "  \"{}\";", escape(name));
    }
    for (a, b) in merged.edge_names() {
        let _ = writeln!(out, "  \"{}\" -> \"{}\";", escape(&a), escape(&b));
    }
    out.push_str("}\n");
    out
}

pub fn write_graph(dir: &Path, name: &str, dot: &str) -> CwResult<PathBuf> {
    let path = dir.join(format!("{name}.dot"));
    std::fs::write(&path, dot)?;
    Ok(path)
}

#[cfg(test)]
use crate::events::{CallEvent, Context, Event, FunctionEvents};

#[test]
fn flow_document_lists_sentinels_and_edges() {
    let fe = FunctionEvents {
        name: "f".into(),
        events: vec![Event::Call(CallEvent {
            target: "a".into(),
            synthetic: false,
            ctx: Context::default(),
        })],
    };
    let flow = crate::flow::build_function(&fe, &Default::default()).unwrap();
    let dot = render_flow(&flow);
    assert!(dot.starts_with("digraph \"f\""));
    assert!(dot.contains("\"S\" -> \"a\";"));
    assert!(dot.contains("\"a\" -> \"E\";"));
    assert!(dot.contains("fillcolor=lightblue"));
}

#[test]
fn merged_document_renders_matrix_bits() {
    use crate::symbols::SymbolIndex;

    let fe = FunctionEvents {
        name: "f".into(),
        events: ["a", "b"]
            .iter()
            .map(|t| {
                Event::Call(CallEvent {
                    target: t.to_string(),
                    synthetic: false,
                    ctx: Context::default(),
                })
            })
            .collect(),
    };
    let flow = crate::flow::build_function(&fe, &Default::default()).unwrap();
    let index = SymbolIndex::for_tests(&["f"], &["a", "b"]);
    let merged = crate::merge::merge(
        std::slice::from_ref(&flow),
        &index,
        &["a".to_string(), "b".to_string()],
    );
    let dot = render_merged(&merged, "FINAL_GRAPH");
    assert!(dot.contains("\"a\" -> \"b\";"));
    assert!(!dot.contains("\"b\" -> \"a\";"));
}

#[test]
fn graphs_are_written_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_graph(dir.path(), "demo", "digraph \"demo\" {}\n").unwrap();
    assert!(path.is_file());
    assert_eq!(path.extension().unwrap(), "dot");
}
