//! Stage 0 plus the line scanner: run the C front-end, capture its AST dump,
//! and expose the restartable line view the later stages consume.
//!
//! The only structural signals taken from a dump line are two column
//! measurements: the first alphabetic character (or `<`), and the first
//! backtick. Everything else is substring matching done by the callers.

use crate::errors::{CwError, CwResult};
use crate::utils::Config;
use std::path::Path;
use std::process::Command;

/// Column of the first ASCII-alphabetic character or `<` in `line`.
pub fn alpha_col(line: &str) -> Option<usize> {
    line.bytes()
        .position(|b| b.is_ascii_alphabetic() || b == b'<')
}

/// Column of the first backtick in `line`.
pub fn tick_col(line: &str) -> Option<usize> {
    line.bytes().position(|b| b == b'`')
}

/// The captured front-end output, trimmed to the translation unit's body.
///
/// `lines` starts at the first line that references the analyzed source file;
/// the preamble (builtin typedefs, header decls) carries no calls we track.
#[derive(Debug)]
pub struct AstDump {
    lines: Vec<String>,
}

impl AstDump {
    /// Build a dump view from raw front-end output.
    pub fn from_output(raw: &str, source_path: &Path) -> CwResult<Self> {
        let marker = format!("<{}", source_path.display());
        let all: Vec<&str> = raw.lines().collect();
        let body_start = all
            .iter()
            .position(|l| l.contains(&marker))
            .ok_or_else(|| {
                CwError::Input(format!(
                    "could not locate the body of '{}' in the AST dump",
                    source_path.display()
                ))
            })?;

        tracing::debug!(body_start, total = all.len(), "AST dump captured");
        Ok(Self {
            lines: all[body_start..].iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Restartable view over the body lines. Each caller scans independently.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// Invoke the external C front-end synchronously and capture its dump.
pub fn run_frontend(source: &Path, config: &Config) -> CwResult<AstDump> {
    if !source.is_file() {
        return Err(CwError::Input(format!(
            "file '{}' not found",
            source.display()
        )));
    }

    let mut cmd = Command::new(&config.frontend.clang_path);
    cmd.arg("-Xclang").arg("-ast-dump").arg("-fsyntax-only");
    for extra in &config.frontend.extra_args {
        cmd.arg(extra);
    }
    cmd.arg(source);

    tracing::debug!(?cmd, "invoking C front-end");
    let out = cmd.output().map_err(|e| {
        CwError::Input(format!(
            "failed to run '{}': {e}",
            config.frontend.clang_path
        ))
    })?;

    // clang writes diagnostics to stderr but still dumps on recoverable
    // errors; only an empty dump is fatal.
    if out.stdout.is_empty() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        return Err(CwError::Input(format!(
            "front-end produced no AST dump: {}",
            stderr.trim()
        )));
    }

    AstDump::from_output(&String::from_utf8_lossy(&out.stdout), source)
}

#[test]
fn alpha_col_prefers_first_alpha_or_angle() {
    assert_eq!(alpha_col("|-FunctionDecl"), Some(2));
    assert_eq!(alpha_col("| `-DeclRefExpr"), Some(4));
    assert_eq!(alpha_col("  <<<NULL>>>"), Some(2));
    assert_eq!(alpha_col("|-| ~~"), None);
    assert_eq!(alpha_col(""), None);
}

#[test]
fn tick_col_finds_first_backtick() {
    assert_eq!(tick_col("| `-CompoundStmt"), Some(2));
    assert_eq!(tick_col("`-CompoundStmt"), Some(0));
    assert_eq!(tick_col("|-IfStmt"), None);
}

#[test]
fn dump_starts_at_file_marker() {
    let raw = "TranslationUnitDecl 0x1\n\
               |-TypedefDecl 0x2 <<invalid sloc>>\n\
               |-FunctionDecl 0x3 <t.c:1:1, col:10> col:6 f 'void ()'\n\
               | `-CompoundStmt 0x4";
    let dump = AstDump::from_output(raw, Path::new("t.c")).unwrap();
    assert_eq!(dump.lines().len(), 2);
    assert!(dump.lines()[0].contains("FunctionDecl"));
}

#[test]
fn missing_file_marker_is_an_input_error() {
    let raw = "TranslationUnitDecl 0x1\n|-TypedefDecl 0x2";
    let err = AstDump::from_output(raw, Path::new("t.c")).unwrap_err();
    assert!(matches!(err, CwError::Input(_)));
}
