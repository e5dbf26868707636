use crate::errors::CwResult;
use console::style;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

static DEFAULT_CONFIG_TOML: &str = include_str!("../../default-callweave.conf");

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct FrontendConfig {
    /// The C front-end used to produce the AST dump.
    pub clang_path: String,

    /// Extra arguments appended to the front-end invocation.
    pub extra_args: Vec<String>,

    /// Tool used to enumerate the runtime's dynamic symbols.
    pub nm_path: String,

    /// The C runtime shared object whose exports classify external calls.
    pub libc_path: String,

    /// Optional symbol list file used instead of running `nm`.
    pub symbols_file: Option<String>,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            clang_path: "clang".into(),
            extra_args: vec![],
            nm_path: "nm".into(),
            libc_path: "/lib/x86_64-linux-gnu/libc.so.6".into(),
            symbols_file: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Cap on simultaneously open control-flow regions and loop depth while
    /// reading the dump; deeper translation units abort.
    pub max_nesting: usize,

    /// Cap on the may-abstain candidates replayed as a powerset; candidates
    /// beyond it are reported and dropped.
    pub abstain_powerset_cap: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_nesting: crate::events::MAX_NESTING,
            abstain_powerset_cap: 8,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving the .dot documents.
    pub directory: String,

    /// Base name of the merged graph document.
    pub merged_name: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: ".".into(),
            merged_name: "FINAL_GRAPH".into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub frontend: FrontendConfig,
    pub analysis: AnalysisConfig,
    pub output: OutputConfig,
}

impl Config {
    pub fn load(config_dir: &Path) -> CwResult<Self> {
        let config = Config::default();

        let default_config_path = config_dir.join("callweave.conf");
        if !default_config_path.exists() {
            create_example_config(config_dir)?;
        }

        let user_config_path = config_dir.join("callweave.local");
        if user_config_path.exists() {
            let user_config_content = fs::read_to_string(&user_config_path)?;
            let user_config: Config = toml::from_str(&user_config_content)?;

            println!(
                "{}: Loaded user config from: {}\n",
                style("note").green().bold(),
                style(user_config_path.display()).underlined().white().bold()
            );
            return Ok(merge_configs(config, user_config));
        }

        Ok(config)
    }
}

fn create_example_config(config_dir: &Path) -> CwResult<()> {
    let example_path = config_dir.join("callweave.conf");
    if !example_path.exists() {
        fs::write(&example_path, DEFAULT_CONFIG_TOML)?;
        tracing::debug!("Example config created at: {}", example_path.display());
    }
    Ok(())
}

/// Merge user config into default config; user values win field by field,
/// except extra front-end args which accumulate.
fn merge_configs(mut default: Config, user: Config) -> Config {
    default.frontend.clang_path = user.frontend.clang_path;
    default.frontend.nm_path = user.frontend.nm_path;
    default.frontend.libc_path = user.frontend.libc_path;
    default.frontend.symbols_file = user.frontend.symbols_file;
    default.frontend.extra_args.extend(user.frontend.extra_args);
    default.frontend.extra_args.sort_unstable();
    default.frontend.extra_args.dedup();

    default.analysis.max_nesting = user.analysis.max_nesting;
    default.analysis.abstain_powerset_cap = user.analysis.abstain_powerset_cap;

    default.output.directory = user.output.directory;
    default.output.merged_name = user.output.merged_name;

    default
}

#[test]
fn merge_prefers_user_values() {
    let base = Config::default();
    let mut user = Config::default();
    user.frontend.clang_path = "clang-18".into();
    user.analysis.max_nesting = 32;
    user.analysis.abstain_powerset_cap = 4;
    user.output.merged_name = "deps".into();

    let merged = merge_configs(base, user);
    assert_eq!(merged.frontend.clang_path, "clang-18");
    assert_eq!(merged.analysis.max_nesting, 32);
    assert_eq!(merged.analysis.abstain_powerset_cap, 4);
    assert_eq!(merged.output.merged_name, "deps");
}

#[test]
fn merge_accumulates_and_dedupes_extra_args() {
    let mut base = Config::default();
    base.frontend.extra_args = vec!["-I/usr/include".into()];
    let mut user = Config::default();
    user.frontend.extra_args = vec!["-DX".into(), "-I/usr/include".into()];

    let merged = merge_configs(base, user);
    assert_eq!(merged.frontend.extra_args, vec!["-DX", "-I/usr/include"]);
}

#[test]
fn load_creates_example_and_reads_user_overrides() {
    let cfg_dir = tempfile::tempdir().unwrap();
    let cfg_path = cfg_dir.path();

    let user_toml = r#"
        [frontend]
        clang_path = "clang-17"

        [output]
        merged_name = "calls"
    "#;
    fs::write(cfg_path.join("callweave.local"), user_toml).unwrap();

    let cfg = Config::load(cfg_path).expect("Config::load should succeed");

    assert!(cfg_path.join("callweave.conf").is_file());
    assert_eq!(cfg.frontend.clang_path, "clang-17");
    assert_eq!(cfg.output.merged_name, "calls");
    assert_eq!(cfg.analysis.max_nesting, crate::events::MAX_NESTING);
    assert_eq!(cfg.analysis.abstain_powerset_cap, 8);
}
