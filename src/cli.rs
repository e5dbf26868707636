use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "callweave")]
#[command(about = "Merged libc-symbol call graphs for C translation units")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a C source file and emit call-graph documents
    Analyze {
        /// Path to the C source file
        file: String,

        /// Render one graph document per user function
        #[arg(short = 'g', long)]
        graphs: bool,

        /// Render the merged external-symbol graph
        #[arg(short = 'm', long)]
        merge: bool,

        /// Override the merged graph's output name
        #[arg(short = 'o', long, value_name = "NAME")]
        output: Option<String>,
    },

    /// Resolve functions to the syscalls they reach in a glibc callgraph dump
    Syscalls {
        /// Path to a `caller: callee` callgraph text file
        #[arg(long, value_name = "FILE")]
        graph: String,

        /// Function names to resolve
        #[arg(required = true)]
        names: Vec<String>,
    },
}
