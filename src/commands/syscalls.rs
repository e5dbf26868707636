use crate::errors::{CwError, CwResult};
use console::style;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

/// Resolve each queried function to the set of syscall leaves it can reach
/// in a `caller: callee` glibc callgraph dump.
pub fn handle(graph_path: &str, names: &[String]) -> CwResult<()> {
    let path = Path::new(graph_path);
    if !path.is_file() {
        return Err(CwError::Input(format!("file '{}' not found", path.display())));
    }
    let text = std::fs::read_to_string(path)?;
    let graph = parse_callgraph(&text);

    for name in names {
        if !graph.contains_key(name.as_str()) {
            println!(
                "{} {} has no call information",
                style("note:").yellow().bold(),
                style(name).bold()
            );
            continue;
        }
        let reached = syscalls_for(name, &graph);
        println!(
            "{} {} ({} syscalls)",
            style(name).white().bold(),
            style(format!("{reached:?}")).dim(),
            reached.len()
        );
    }
    Ok(())
}

/// Parse `caller: callee` lines; blank callees and self-calls are dropped.
fn parse_callgraph(text: &str) -> HashMap<&str, BTreeSet<&str>> {
    let mut graph: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        let Some((caller, callee)) = line.split_once(':') else {
            continue;
        };
        let (caller, callee) = (caller.trim(), callee.trim());
        if callee.is_empty() || caller == callee {
            continue;
        }
        graph.entry(caller).or_default().insert(callee);
    }
    graph
}

fn is_syscall_leaf(name: &str) -> bool {
    name.contains("syscall") && name.contains('(') && name.contains(')')
}

/// Depth-first accumulation of reachable syscall leaves; cycles in the
/// callgraph are cut by the visited set.
fn syscalls_for(name: &str, graph: &HashMap<&str, BTreeSet<&str>>) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack = vec![name];
    while let Some(cur) = stack.pop() {
        if !visited.insert(cur) {
            continue;
        }
        let Some(callees) = graph.get(cur) else {
            continue;
        };
        for &callee in callees {
            if is_syscall_leaf(callee) {
                out.insert(callee.replace(' ', ""));
            } else {
                stack.push(callee);
            }
        }
    }
    out
}

#[test]
fn parser_skips_blank_and_self_calls() {
    let g = parse_callgraph("fopen: malloc\nfopen: fopen\nfree:\nmalloc: syscall (mmap)\n");
    assert_eq!(g["fopen"], BTreeSet::from(["malloc"]));
    assert!(!g.contains_key("free"));
}

#[test]
fn resolution_walks_intermediate_functions() {
    let g = parse_callgraph(
        "fopen: open_helper\nopen_helper: syscall (open)\nopen_helper: syscall (mmap)\n",
    );
    let r = syscalls_for("fopen", &g);
    assert_eq!(
        r,
        BTreeSet::from(["syscall(open)".to_string(), "syscall(mmap)".to_string()])
    );
}

#[test]
fn cycles_do_not_diverge() {
    let g = parse_callgraph("a: b\nb: a\nb: syscall (exit)\n");
    let r = syscalls_for("a", &g);
    assert_eq!(r, BTreeSet::from(["syscall(exit)".to_string()]));
}

#[test]
fn unreachable_names_resolve_to_nothing() {
    let g = parse_callgraph("a: b\n");
    assert!(syscalls_for("missing", &g).is_empty());
}
