pub mod analyze;
pub mod syscalls;

use crate::cli::Commands;
use crate::errors::CwResult;
use crate::utils::Config;

pub fn handle_command(command: Commands, config: &Config) -> CwResult<()> {
    match command {
        Commands::Analyze {
            file,
            graphs,
            merge,
            output,
        } => analyze::handle(&file, graphs, merge, output.as_deref(), config),
        Commands::Syscalls { graph, names } => syscalls::handle(&graph, &names),
    }
}
