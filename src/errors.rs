use std::fmt;
use thiserror::Error;

pub type CwResult<T, E = CwError> = Result<T, E>;

/// A few lines of dump surrounding a failure, pre-rendered for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct LineContext {
    pub line_no: usize,
    pub line: String,
    pub window: Vec<String>,
}

impl LineContext {
    pub fn new(lines: &[String], index: usize) -> Self {
        const WINDOW: usize = 5;
        let lo = index.saturating_sub(WINDOW);
        let hi = (index + WINDOW + 1).min(lines.len());
        Self {
            line_no: index,
            line: lines.get(index).cloned().unwrap_or_default(),
            window: lines[lo..hi].to_vec(),
        }
    }
}

impl fmt::Display for LineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "at dump line {}: {}", self.line_no, self.line)?;
        for l in &self.window {
            writeln!(f, "    {l}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum CwError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("input error: {0}")]
    Input(String),

    #[error("malformed AST structure: {reason}\n{context}")]
    ParseStructure { reason: String, context: LineContext },

    #[error("unsupported construct: {reason}\n{context}")]
    Unsupported { reason: String, context: LineContext },

    #[error("internal invariant violated in {stage}: {reason}")]
    Invariant { stage: &'static str, reason: String },

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),

    #[error("{0}")]
    Msg(String),
}

impl CwError {
    pub fn structure(reason: impl Into<String>, lines: &[String], index: usize) -> Self {
        CwError::ParseStructure {
            reason: reason.into(),
            context: LineContext::new(lines, index),
        }
    }

    pub fn unsupported(reason: impl Into<String>, lines: &[String], index: usize) -> Self {
        CwError::Unsupported {
            reason: reason.into(),
            context: LineContext::new(lines, index),
        }
    }

    pub fn invariant(stage: &'static str, reason: impl Into<String>) -> Self {
        CwError::Invariant {
            stage,
            reason: reason.into(),
        }
    }
}

impl From<&str> for CwError {
    fn from(s: &str) -> Self {
        CwError::Msg(s.to_owned())
    }
}

impl From<String> for CwError {
    fn from(s: String) -> Self {
        CwError::Msg(s)
    }
}

#[test]
fn io_conversion_retains_message() {
    let e = std::io::Error::other("boom!");
    let c: CwError = e.into();
    assert!(matches!(c, CwError::Io(_)));
    assert!(c.to_string().contains("boom"));
}

#[test]
fn structure_error_carries_context_window() {
    let lines: Vec<String> = (0..10).map(|i| format!("line {i}")).collect();
    let err = CwError::structure("goto detected", &lines, 7);
    let msg = err.to_string();
    assert!(msg.contains("goto detected"));
    assert!(msg.contains("at dump line 7"));
    assert!(msg.contains("line 2"));
    assert!(msg.contains("line 9"));
}

#[test]
fn context_window_clamps_at_bounds() {
    let lines: Vec<String> = vec!["only".into()];
    let ctx = LineContext::new(&lines, 0);
    assert_eq!(ctx.window.len(), 1);
}

#[test]
fn simple_string_into_msg() {
    let c: CwError = "plain msg".into();
    assert!(matches!(c, CwError::Msg(s) if s == "plain msg"));
}
