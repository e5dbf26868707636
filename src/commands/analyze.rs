use crate::errors::CwResult;
use crate::events;
use crate::flow;
use crate::frontend;
use crate::merge;
use crate::reach;
use crate::render;
use crate::symbols::{SymbolIndex, SymbolTable};
use crate::utils::Config;
use console::style;
use std::path::Path;

/// Entry point called by the CLI.
pub fn handle(
    file: &str,
    graphs: bool,
    merge_graph: bool,
    output: Option<&str>,
    config: &Config,
) -> CwResult<()> {
    let source = Path::new(file);
    let dump = frontend::run_frontend(source, config)?;

    let table = match &config.frontend.symbols_file {
        Some(path) => SymbolTable::from_file(Path::new(path))?,
        None => SymbolTable::from_runtime(config)?,
    };
    tracing::debug!(symbols = table.len(), "runtime symbol table loaded");

    let index = SymbolIndex::classify(&dump, &table);
    let extraction = events::extract(&dump, &index, config.analysis.max_nesting)?;
    println!(
        "{} {} user function(s) in {}\n",
        style("Analyzed").green().bold(),
        extraction.functions.len(),
        style(source.display()).white().bold()
    );

    let never = reach::never_calls(&extraction, &index);
    let flows = flow::build_all(&extraction, &never, config.analysis.abstain_powerset_cap)?;

    let out_dir = Path::new(&config.output.directory);
    if graphs {
        for f in &flows {
            let path = render::write_graph(out_dir, &f.name, &render::render_flow(f))?;
            println!(
                "✔ {} {}",
                style("Graph written:").green(),
                style(path.display()).white().bold()
            );
        }
    }

    if merge_graph {
        let externals = extraction.observed_externals(&index);
        let merged = merge::merge(&flows, &index, &externals);
        let name = output.unwrap_or(&config.output.merged_name);
        let path = render::write_graph(out_dir, name, &render::render_merged(&merged, name))?;
        println!(
            "✔ {} {} ({} symbols, {} edges)",
            style("Merged graph written:").green(),
            style(path.display()).white().bold(),
            merged.names.len(),
            merged.edge_names().len()
        );
    }

    if !graphs && !merge_graph {
        println!(
            "{}: nothing rendered; pass {} and/or {}.",
            style("note").yellow().bold(),
            style("-g").bold(),
            style("-m").bold()
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Pipeline tests over hand-written dumps
// ---------------------------------------------------------------------------

#[cfg(test)]
use crate::frontend::AstDump;
#[cfg(test)]
use crate::merge::MergedGraph;
#[cfg(test)]
use std::collections::BTreeSet;

#[cfg(test)]
fn pipeline(raw: &str, symbols: &str) -> MergedGraph {
    let dump = AstDump::from_output(raw, Path::new("t.c")).unwrap();
    let table = SymbolTable::from_reader_text(symbols);
    let index = SymbolIndex::classify(&dump, &table);
    let extraction = events::extract(&dump, &index, events::MAX_NESTING).unwrap();
    let never = reach::never_calls(&extraction, &index);
    let flows = flow::build_all(&extraction, &never, 8).unwrap();
    let externals = extraction.observed_externals(&index);
    merge::merge(&flows, &index, &externals)
}

#[cfg(test)]
fn edge(a: &str, b: &str) -> (String, String) {
    (a.to_string(), b.to_string())
}

#[test]
fn sequential_program_merges_to_a_chain() {
    let merged = pipeline(events::SEQ_DUMP, "a\nb\nc\n");
    assert_eq!(
        merged.edge_names(),
        BTreeSet::from([edge("a", "b"), edge("b", "c")])
    );
}

#[test]
fn branching_program_merges_both_paths() {
    let merged = pipeline(events::IF_ELSE_DUMP, "a\nb\nc\n");
    assert_eq!(
        merged.edge_names(),
        BTreeSet::from([edge("a", "c"), edge("b", "c")])
    );
}

#[test]
fn looping_program_keeps_the_back_edge() {
    let merged = pipeline(events::WHILE_DUMP, "p\nq\nr\n");
    assert_eq!(
        merged.edge_names(),
        BTreeSet::from([edge("p", "q"), edge("q", "p"), edge("p", "r")])
    );
}

#[test]
fn switch_program_merges_fallthrough_and_default() {
    let merged = pipeline(events::SWITCH_DUMP, "a\nb\nc\nd\n");
    let e = merged.edge_names();
    assert!(e.contains(&edge("a", "b")));
    assert!(e.contains(&edge("b", "d")));
    assert!(e.contains(&edge("c", "d")));
}

#[test]
fn early_return_produces_no_external_successor() {
    let merged = pipeline(events::RETURN_IN_IF_DUMP, "a\nb\n");
    assert!(merged.edge_names().is_empty());
    assert_eq!(merged.names, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn spawned_thread_body_reaches_the_primitive() {
    let merged = pipeline(events::PTHREAD_DUMP, "k\nh\npthread_create\n");
    let e = merged.edge_names();
    assert!(e.contains(&edge("k", "pthread_create")), "{e:?}");
    assert!(e.contains(&edge("pthread_create", "h")), "{e:?}");
}
