//! Symbol classification: which names are user functions (defined in the
//! analyzed translation unit) and which resolve to the C runtime.

use crate::errors::{CwError, CwResult};
use crate::frontend::{AstDump, alpha_col};
use crate::utils::Config;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::process::Command;

/// `FunctionDecl 0x… <…> … NAME 'type'`
static FUNCTION_DECL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"FunctionDecl\s+[^']+\s([a-zA-Z_][a-zA-Z0-9_]*)\s*'").expect("static regex")
});

/// `DeclRefExpr 0x… <…> … Function 0x… 'NAME' 'type'`
static DECL_REF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"DeclRefExpr.*Function\s+0x[0-9a-f]+\s+'([a-zA-Z_][a-zA-Z0-9_]*)'")
        .expect("static regex")
});

/// Function name declared on a `FunctionDecl` line, if any.
pub fn function_decl_name(line: &str) -> Option<&str> {
    FUNCTION_DECL_RE
        .captures(line)
        .map(|c| c.get(1).unwrap().as_str())
}

/// Function name referenced on a `DeclRefExpr` line, if any.
pub fn decl_ref_target(line: &str) -> Option<&str> {
    DECL_REF_RE
        .captures(line)
        .map(|c| c.get(1).unwrap().as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolClass {
    User,
    External,
}

/// The set of dynamic symbols exported by the C runtime.
#[derive(Debug, Default)]
pub struct SymbolTable {
    names: HashSet<String>,
}

impl SymbolTable {
    /// Parse `nm -D` output: symbols sit in the third whitespace column.
    /// A plain one-name-per-line file parses through the same path.
    pub fn from_reader_text(text: &str) -> Self {
        let mut names = HashSet::new();
        for line in text.lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            match parts.len() {
                0 => {}
                1 => {
                    names.insert(parts[0].to_owned());
                }
                _ if parts.len() >= 3 => {
                    names.insert(parts[2].to_owned());
                }
                _ => {}
            }
        }
        Self { names }
    }

    pub fn from_file(path: &Path) -> CwResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_reader_text(&text))
    }

    /// Enumerate libc's dynamic symbols with `nm -D`.
    pub fn from_runtime(config: &Config) -> CwResult<Self> {
        let out = Command::new(&config.frontend.nm_path)
            .arg("-D")
            .arg(&config.frontend.libc_path)
            .output()
            .map_err(|e| {
                CwError::Input(format!("failed to run '{}': {e}", config.frontend.nm_path))
            })?;
        if !out.status.success() {
            return Err(CwError::Input(format!(
                "'{} -D {}' failed: {}",
                config.frontend.nm_path,
                config.frontend.libc_path,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        Ok(Self::from_reader_text(&String::from_utf8_lossy(&out.stdout)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Name → class lookup for every function the dump mentions.
#[derive(Debug, Default)]
pub struct SymbolIndex {
    users: HashSet<String>,
    runtime: HashSet<String>,
}

impl SymbolIndex {
    /// Classify every declared function in the dump.
    ///
    /// A `FunctionDecl` followed by a `CompoundStmt` before the next
    /// declaration at the same or an outer column has a body and is a user
    /// function. Any other referenced name is external when the runtime
    /// table lists it, otherwise it is unknown and ignored downstream.
    pub fn classify(dump: &AstDump, table: &SymbolTable) -> Self {
        let lines = dump.lines();
        let mut users = HashSet::new();

        let mut current: Option<(String, usize)> = None;
        for line in lines {
            if line.contains("FunctionDecl") && !line.contains("implicit used") {
                current = function_decl_name(line)
                    .map(|name| (name.to_owned(), alpha_col(line).unwrap_or(0)));
                continue;
            }
            if let Some((name, decl_col)) = current.take() {
                match alpha_col(line) {
                    Some(c) if c > decl_col => {
                        if line.contains("CompoundStmt") {
                            users.insert(name);
                        } else {
                            current = Some((name, decl_col));
                        }
                    }
                    // Back at or above the declaration column: body-less.
                    _ => {}
                }
            }
        }

        let index = Self {
            users,
            runtime: table.names.iter().cloned().collect(),
        };
        tracing::debug!(users = index.users.len(), "classified translation unit");
        index
    }

    pub fn class_of(&self, name: &str) -> Option<SymbolClass> {
        if self.users.contains(name) {
            Some(SymbolClass::User)
        } else if self.runtime.contains(name) {
            Some(SymbolClass::External)
        } else {
            None
        }
    }

    pub fn is_user(&self, name: &str) -> bool {
        self.users.contains(name)
    }

    pub fn is_external(&self, name: &str) -> bool {
        self.class_of(name) == Some(SymbolClass::External)
    }

    pub fn users(&self) -> &HashSet<String> {
        &self.users
    }

    #[cfg(test)]
    pub fn for_tests(users: &[&str], externals: &[&str]) -> Self {
        Self {
            users: users.iter().map(|s| s.to_string()).collect(),
            runtime: externals.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[test]
fn nm_output_parses_third_column() {
    let text = "0000000000027490 T abort\n\
                                 w __cxa_finalize\n\
                0000000000086a70 W acct\n\
                bad line";
    let table = SymbolTable::from_reader_text(text);
    assert!(table.contains("abort"));
    assert!(table.contains("acct"));
    assert!(!table.contains("__cxa_finalize"));
    assert!(!table.contains("T"));
}

#[test]
fn plain_symbol_list_parses_too() {
    let table = SymbolTable::from_reader_text("puts\nprintf\n");
    assert_eq!(table.len(), 2);
    assert!(table.contains("puts"));
}

#[test]
fn decl_patterns_extract_names() {
    assert_eq!(
        function_decl_name("|-FunctionDecl 0x5a3 <t.c:1:1, line:3:1> line:1:6 used work 'void ()'"),
        Some("work")
    );
    assert_eq!(
        decl_ref_target(
            "| | `-DeclRefExpr 0x5f2 <col:3> 'void ()' Function 0x5a3 'work' 'void ()'"
        ),
        Some("work")
    );
    assert_eq!(decl_ref_target("| `-DeclRefExpr 0x1 <col:7> 'int' lvalue Var 0x2 'k' 'int'"), None);
}

#[cfg(test)]
fn classify_fixture() -> (AstDump, SymbolTable) {
    let raw = "\
|-FunctionDecl 0x10 <t.c:1:1, col:12> col:6 proto 'void ()'
|-FunctionDecl 0x20 <line:2:1, line:4:1> line:2:6 work 'void ()'
| `-CompoundStmt 0x21 <col:13, line:4:1>
|   `-CallExpr 0x30 <line:3:3, col:9> 'int'
|     `-ImplicitCastExpr 0x31 <col:3> 'int (*)()' <FunctionToPointerDecay>
|       `-DeclRefExpr 0x32 <col:3> 'int ()' Function 0x40 'puts' 'int ()'
`-FunctionDecl 0x50 <line:6:1, col:14> col:6 tail 'void ()'";
    let dump = AstDump::from_output(raw, Path::new("t.c")).unwrap();
    let table = SymbolTable::from_reader_text("puts\nprintf\n");
    (dump, table)
}

#[test]
fn bodied_decl_is_user_prototype_is_not() {
    let (dump, table) = classify_fixture();
    let index = SymbolIndex::classify(&dump, &table);
    assert!(index.is_user("work"));
    assert_eq!(index.class_of("proto"), None);
    assert_eq!(index.class_of("tail"), None);
    assert_eq!(index.class_of("puts"), Some(SymbolClass::External));
    assert_eq!(index.class_of("unheard_of"), None);
}
