//! Stage B: turn the AST dump's line stream into per-function event lists.
//!
//! The extractor is a single pass over the dump. Nesting is inferred purely
//! from the two column measurements of each line: a region marker records its
//! own column, the line immediately after it fixes the region's condition
//! column, and `tick_col + 2 == condition column` announces the structural
//! point where the region's body (or its else branch) begins. A region closes
//! when the cursor retreats to the marker's column or above.

use crate::errors::{CwError, CwResult};
use crate::frontend::{AstDump, alpha_col, tick_col};
use crate::symbols::{SymbolIndex, decl_ref_target, function_decl_name};

/// Default cap on simultaneously open regions and on loop-anchor depth;
/// tunable through `[analysis] max_nesting`.
pub const MAX_NESTING: usize = 100;

/// Lookahead window, in lines, for resolving a call's target reference.
const CALL_LOOKAHEAD: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    If,
    Conditional,
    ElseIf,
    Else,
    Switch,
    Case,
    Default,
    WhileCondition,
    While,
    ForCondition1,
    ForCondition2,
    For,
    DoWhile,
    DoWhileCondition,
    Break,
    Continue,
    Return,
}

/// Branch coordinates sampled when a call is observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Context {
    pub column: usize,
    pub line: usize,
    pub if_level: usize,
    pub if_branch: usize,
    pub if_epoch: u32,
    pub switch_level: usize,
    pub case_index: usize,
    pub switch_epoch: u32,
    pub loop_level: usize,
    pub loop_epoch: u32,
    pub do_level: usize,
    pub do_epoch: u32,
    pub after_break: bool,
    pub after_continue: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEvent {
    pub target: String,
    /// Iteration anchors synthesized at loop entry; removed again in Stage C.
    pub synthetic: bool,
    pub ctx: Context,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub kind: ControlKind,
    pub level: usize,
    pub epoch: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Call(CallEvent),
    Start(Marker),
    End(Marker),
}

#[derive(Debug)]
pub struct FunctionEvents {
    pub name: String,
    pub events: Vec<Event>,
}

#[derive(Debug, Default)]
pub struct Extraction {
    /// User functions in dump order.
    pub functions: Vec<FunctionEvents>,
}

impl Extraction {
    pub fn get(&self, name: &str) -> Option<&FunctionEvents> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// External call targets in first-observation order across the dump.
    pub fn observed_externals(&self, index: &SymbolIndex) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for f in &self.functions {
            for ev in &f.events {
                if let Event::Call(c) = ev
                    && !c.synthetic
                    && index.is_external(&c.target)
                    && seen.insert(c.target.clone())
                {
                    out.push(c.target.clone());
                }
            }
        }
        out
    }
}

pub fn anchor_name(depth: usize) -> String {
    format!("iteration anchor {depth}")
}

// ---------------------------------------------------------------------------
// Extractor internals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopKind {
    While,
    For,
}

#[derive(Debug)]
enum RegionKind {
    If {
        cond_col: usize,
        has_else: bool,
        /// An `else if` re-armed this frame; the next then-head detection
        /// must not open a new level.
        chained: bool,
        started: bool,
    },
    Conditional {
        head_col: usize,
        traversals: u8,
        started: bool,
    },
    Loop {
        kind: LoopKind,
        cond_col: usize,
        /// Lines seen so far at the header column (`for` clause heads).
        clause_hits: u8,
        started: bool,
    },
    DoWhile {
        body_col: usize,
        cond_seen: bool,
    },
    Switch {
        cond_col: usize,
        started: bool,
    },
    Return,
}

impl RegionKind {
    fn describe(&self) -> &'static str {
        match self {
            RegionKind::If { .. } => "if",
            RegionKind::Conditional { .. } => "conditional",
            RegionKind::Loop {
                kind: LoopKind::While,
                ..
            } => "while",
            RegionKind::Loop {
                kind: LoopKind::For,
                ..
            } => "for",
            RegionKind::DoWhile { .. } => "do-while",
            RegionKind::Switch { .. } => "switch",
            RegionKind::Return => "return",
        }
    }
}

#[derive(Debug)]
struct Region {
    kind: RegionKind,
    /// Marker column: the region closes when the cursor retreats to it.
    outer_col: usize,
    level: usize,
    epoch: u32,
    /// Lines until the condition-column capture fires.
    capture_in: u8,
}

/// One call expression whose events are emitted when the cursor retreats
/// back to its column; spawned thread entry points ride along in front.
#[derive(Debug)]
struct PendingCall {
    column: usize,
    calls: Vec<CallEvent>,
}

struct Extractor<'a> {
    lines: &'a [String],
    index: &'a SymbolIndex,
    max_nesting: usize,

    functions: Vec<FunctionEvents>,
    current: Option<usize>,

    pending: Vec<PendingCall>,
    regions: Vec<Region>,

    if_level: usize,
    if_epoch: u32,
    if_branch: Vec<usize>,
    switch_level: usize,
    switch_epoch: u32,
    case_index: Vec<usize>,
    loop_level: usize,
    loop_epoch: u32,
    do_level: usize,
    do_epoch: u32,
    anchor_depth: usize,
    after_break: bool,
    after_continue: bool,
}

pub fn extract(dump: &AstDump, index: &SymbolIndex, max_nesting: usize) -> CwResult<Extraction> {
    let mut ex = Extractor {
        lines: dump.lines(),
        index,
        max_nesting,
        functions: Vec::new(),
        current: None,
        pending: Vec::new(),
        regions: Vec::new(),
        if_level: 0,
        if_epoch: 0,
        if_branch: vec![0],
        switch_level: 0,
        switch_epoch: 0,
        case_index: vec![0],
        loop_level: 0,
        loop_epoch: 0,
        do_level: 0,
        do_epoch: 0,
        anchor_depth: 0,
        after_break: false,
        after_continue: false,
    };
    ex.run()?;
    Ok(Extraction {
        functions: ex.functions,
    })
}

impl<'a> Extractor<'a> {
    fn run(&mut self) -> CwResult<()> {
        for i in 0..self.lines.len() {
            self.step(i)?;
        }
        // Virtual end-of-dump cursor at column zero flushes everything.
        self.unwind_pending(0);
        self.close_regions(0)?;
        Ok(())
    }

    fn emit(&mut self, ev: Event) {
        if let Some(f) = self.current {
            tracing::trace!(target: "events", func = %self.functions[f].name, ?ev, "emit");
            self.functions[f].events.push(ev);
        }
    }

    fn start(&mut self, kind: ControlKind, level: usize, epoch: u32) {
        self.emit(Event::Start(Marker { kind, level, epoch }));
    }

    fn end(&mut self, kind: ControlKind, level: usize, epoch: u32) {
        self.emit(Event::End(Marker { kind, level, epoch }));
    }

    fn context(&self, column: usize, line: usize) -> Context {
        Context {
            column,
            line,
            if_level: self.if_level,
            if_branch: self.if_branch.get(self.if_level).copied().unwrap_or(0),
            if_epoch: self.if_epoch,
            switch_level: self.switch_level,
            case_index: self.case_index.get(self.switch_level).copied().unwrap_or(0),
            switch_epoch: self.switch_epoch,
            loop_level: self.loop_level,
            loop_epoch: self.loop_epoch,
            do_level: self.do_level,
            do_epoch: self.do_epoch,
            after_break: self.after_break,
            after_continue: self.after_continue,
        }
    }

    /// Topmost region matching `pred`, if any.
    fn topmost(&self, pred: fn(&RegionKind) -> bool) -> Option<usize> {
        self.regions.iter().rposition(|r| pred(&r.kind))
    }

    fn step(&mut self, i: usize) -> CwResult<()> {
        let lines = self.lines;
        let line = lines[i].as_str();
        let alpha = alpha_col(line);
        let tick = tick_col(line);

        if let Some(depth) = alpha {
            self.unwind_pending(depth);
            self.close_regions(depth)?;
        }

        self.loop_machine(i, line, alpha, tick)?;
        self.do_while_machine(i, line, alpha, tick)?;
        self.conditional_machine(i, line, alpha)?;
        self.if_machine(i, line, alpha, tick)?;
        self.switch_machine(i, line, alpha, tick)?;

        if line.contains("GotoStmt") {
            return Err(CwError::unsupported("goto", self.lines, i));
        }
        if line.contains("BreakStmt") {
            self.end(ControlKind::Break, 1, 0);
            self.after_break = true;
        }
        if line.contains("ContinueStmt") {
            self.end(ControlKind::Continue, 1, 0);
            self.after_continue = true;
        }
        if line.contains("ReturnStmt") {
            self.push_region(
                Region {
                    kind: RegionKind::Return,
                    outer_col: alpha.unwrap_or(0),
                    level: 1,
                    epoch: 0,
                    capture_in: 0,
                },
                i,
            )?;
        }

        if line.contains("FunctionDecl") && !line.contains("implicit used") {
            self.begin_function(i)?;
        }

        if line.contains("CallExpr") && self.current.is_some() {
            self.record_call(i, alpha.unwrap_or(0));
        }
        Ok(())
    }

    // -- call expressions ---------------------------------------------------

    /// Emit every pending call whose column the cursor has retreated to.
    fn unwind_pending(&mut self, depth: usize) {
        while let Some(top) = self.pending.last() {
            if depth > top.column {
                break;
            }
            let entry = self.pending.pop().unwrap();
            for call in entry.calls {
                self.emit(Event::Call(call));
            }
        }
    }

    fn record_call(&mut self, i: usize, column: usize) {
        let lines = self.lines;
        let ctx = self.context(column, i);

        let mut primary = None;
        for j in i + 1..(i + 1 + CALL_LOOKAHEAD).min(lines.len()) {
            if lines[j].contains("DeclRefExpr") {
                primary = decl_ref_target(&lines[j]).map(|n| (n.to_owned(), j));
                break;
            }
        }
        let Some((target, j)) = primary else {
            tracing::debug!(target: "events", line = i, "call without a direct target, dropped");
            return;
        };
        if self.index.class_of(&target).is_none() {
            tracing::debug!(target: "events", callee = %target, "call target unknown to the symbol table");
            return;
        }

        let mut calls = Vec::with_capacity(2);
        if target == "clone" || target == "pthread_create" {
            // The spawned routine is the interesting successor; it goes in
            // front of the primitive.
            if let Some(spawned) = self.harvest_spawn_target(j) {
                calls.push(CallEvent {
                    target: spawned,
                    synthetic: false,
                    ctx,
                });
            }
        }
        calls.push(CallEvent {
            target,
            synthetic: false,
            ctx,
        });
        self.after_break = false;
        self.after_continue = false;
        self.pending.push(PendingCall { column, calls });
    }

    /// The next function reference after a `clone`/`pthread_create` callee.
    /// Targets reached through a pointer variable are dropped.
    fn harvest_spawn_target(&self, j: usize) -> Option<String> {
        let lines = self.lines;
        for k in j + 1..(j + 1 + CALL_LOOKAHEAD).min(lines.len()) {
            if let Some(name) = decl_ref_target(&lines[k]) {
                if self.index.class_of(name).is_some() {
                    return Some(name.to_owned());
                }
                tracing::debug!(target: "events", spawned = name, "spawn target unknown, dropped");
                return None;
            }
        }
        None
    }

    // -- region plumbing ----------------------------------------------------

    fn push_region(&mut self, region: Region, i: usize) -> CwResult<()> {
        if self.regions.len() >= self.max_nesting {
            return Err(CwError::structure(
                format!("nesting exceeds {} regions", self.max_nesting),
                self.lines,
                i,
            ));
        }
        self.regions.push(region);
        Ok(())
    }

    fn close_regions(&mut self, depth: usize) -> CwResult<()> {
        while let Some(top) = self.regions.last() {
            if depth > top.outer_col {
                break;
            }
            let region = self.regions.pop().unwrap();
            if region.level == 0 && !matches!(region.kind, RegionKind::Return) {
                return Err(CwError::invariant(
                    "events",
                    format!("{} region closed before its body began", region.kind.describe()),
                ));
            }
            match region.kind {
                RegionKind::If { .. } => {
                    self.end(ControlKind::If, region.level, self.if_epoch);
                    self.if_branch.pop();
                    self.if_level -= 1;
                    self.if_epoch += 1;
                }
                RegionKind::Conditional { .. } => {
                    self.end(ControlKind::Conditional, region.level, self.if_epoch);
                    self.if_branch.pop();
                    self.if_level -= 1;
                    self.if_epoch += 1;
                }
                RegionKind::Loop { kind, .. } => {
                    let k = match kind {
                        LoopKind::While => ControlKind::While,
                        LoopKind::For => ControlKind::For,
                    };
                    self.end(k, region.level, self.loop_epoch);
                    self.loop_level -= 1;
                    self.loop_epoch += 1;
                    self.anchor_depth = self.anchor_depth.saturating_sub(1);
                }
                RegionKind::DoWhile { .. } => {
                    self.end(ControlKind::DoWhile, region.level, self.do_epoch);
                    self.do_level -= 1;
                    self.do_epoch += 1;
                    self.anchor_depth = self.anchor_depth.saturating_sub(1);
                }
                RegionKind::Switch { .. } => {
                    self.end(ControlKind::Switch, region.level, self.switch_epoch);
                    self.case_index.pop();
                    self.switch_level -= 1;
                }
                RegionKind::Return => {
                    self.end(ControlKind::Return, 1, 0);
                }
            }
        }
        Ok(())
    }

    fn emit_anchor(&mut self, i: usize) -> CwResult<()> {
        if self.anchor_depth >= self.max_nesting {
            return Err(CwError::structure(
                format!("loop nesting exceeds {}", self.max_nesting),
                self.lines,
                i,
            ));
        }
        let ctx = self.context(0, i);
        let name = anchor_name(self.anchor_depth);
        self.anchor_depth += 1;
        self.emit(Event::Call(CallEvent {
            target: name,
            synthetic: true,
            ctx,
        }));
        Ok(())
    }

    // -- while / for --------------------------------------------------------

    fn loop_machine(
        &mut self,
        i: usize,
        line: &str,
        alpha: Option<usize>,
        tick: Option<usize>,
    ) -> CwResult<()> {
        // Advance the innermost loop first: a new loop marker on this very
        // line may be the body head of the enclosing one.
        if let Some(pos) = self.topmost(|k| matches!(k, RegionKind::Loop { .. })) {
            self.advance_loop(pos, alpha, tick, i)?;
        }

        if line.contains("WhileStmt") || line.contains("ForStmt") {
            let kind = if line.contains("WhileStmt") {
                LoopKind::While
            } else {
                LoopKind::For
            };
            self.push_region(
                Region {
                    kind: RegionKind::Loop {
                        kind,
                        cond_col: 0,
                        clause_hits: 0,
                        started: false,
                    },
                    outer_col: alpha.unwrap_or(0),
                    level: 0,
                    epoch: 0,
                    capture_in: 1,
                },
                i,
            )?;
        }
        Ok(())
    }

    fn advance_loop(
        &mut self,
        pos: usize,
        alpha: Option<usize>,
        tick: Option<usize>,
        i: usize,
    ) -> CwResult<()> {
        if self.regions[pos].capture_in > 0 {
            self.regions[pos].capture_in -= 1;
            if self.regions[pos].capture_in > 0 {
                return Ok(());
            }
            // Header column: the line right after the marker.
            let col = alpha.unwrap_or(0);
            self.loop_level += 1;
            self.regions[pos].level = self.loop_level;
            let is_while = matches!(
                self.regions[pos].kind,
                RegionKind::Loop {
                    kind: LoopKind::While,
                    ..
                }
            );
            if let RegionKind::Loop {
                cond_col,
                clause_hits,
                ..
            } = &mut self.regions[pos].kind
            {
                *cond_col = col;
                *clause_hits = 1;
            }
            if is_while {
                self.loop_epoch += 1;
                self.regions[pos].epoch = self.loop_epoch;
                self.start(ControlKind::WhileCondition, self.loop_level, self.loop_epoch);
                self.emit_anchor(i)?;
            }
            return Ok(());
        }

        let (kind, cond_col, started, level) = match &self.regions[pos].kind {
            RegionKind::Loop {
                kind,
                cond_col,
                started,
                ..
            } => (*kind, *cond_col, *started, self.regions[pos].level),
            _ => return Ok(()),
        };
        if started {
            return Ok(());
        }

        if tick.map(|t| t + 2) == Some(cond_col) {
            let epoch = self.regions[pos].epoch;
            match kind {
                LoopKind::While => {
                    self.end(ControlKind::WhileCondition, level, epoch);
                    self.start(ControlKind::While, level, epoch);
                }
                LoopKind::For => {
                    self.end(ControlKind::ForCondition2, level, epoch);
                    self.start(ControlKind::For, level, epoch);
                }
            }
            if let RegionKind::Loop { started, .. } = &mut self.regions[pos].kind {
                *started = true;
            }
            return Ok(());
        }

        if kind == LoopKind::For && alpha == Some(cond_col) {
            let hits = {
                let RegionKind::Loop { clause_hits, .. } = &mut self.regions[pos].kind else {
                    unreachable!()
                };
                *clause_hits += 1;
                *clause_hits
            };
            match hits {
                // init clause and the condition-variable slot pass silently
                3 => {
                    self.loop_epoch += 1;
                    self.regions[pos].epoch = self.loop_epoch;
                    self.start(ControlKind::ForCondition1, level, self.loop_epoch);
                    self.emit_anchor(i)?;
                }
                4 => {
                    let epoch = self.regions[pos].epoch;
                    self.end(ControlKind::ForCondition1, level, epoch);
                    self.start(ControlKind::ForCondition2, level, epoch);
                }
                _ => {}
            }
        }
        Ok(())
    }

    // -- do / while ---------------------------------------------------------

    fn do_while_machine(
        &mut self,
        i: usize,
        line: &str,
        alpha: Option<usize>,
        tick: Option<usize>,
    ) -> CwResult<()> {
        if let Some(pos) = self.topmost(|k| matches!(k, RegionKind::DoWhile { .. })) {
            if self.regions[pos].capture_in > 0 {
                self.regions[pos].capture_in -= 1;
                if self.regions[pos].capture_in == 0 {
                    let col = alpha.unwrap_or(0);
                    self.do_level += 1;
                    self.do_epoch += 1;
                    self.regions[pos].level = self.do_level;
                    self.regions[pos].epoch = self.do_epoch;
                    if let RegionKind::DoWhile { body_col, .. } = &mut self.regions[pos].kind {
                        *body_col = col;
                    }
                    self.start(ControlKind::DoWhile, self.do_level, self.do_epoch);
                    self.emit_anchor(i)?;
                }
            } else {
                let (body_col, cond_seen) = match &self.regions[pos].kind {
                    RegionKind::DoWhile {
                        body_col,
                        cond_seen,
                    } => (*body_col, *cond_seen),
                    _ => unreachable!(),
                };
                if !cond_seen && tick.map(|t| t + 2) == Some(body_col) {
                    let (level, epoch) = (self.regions[pos].level, self.regions[pos].epoch);
                    self.start(ControlKind::DoWhileCondition, level, epoch);
                    if let RegionKind::DoWhile { cond_seen, .. } = &mut self.regions[pos].kind {
                        *cond_seen = true;
                    }
                }
            }
        }

        if line.contains("DoStmt") {
            self.push_region(
                Region {
                    kind: RegionKind::DoWhile {
                        body_col: 0,
                        cond_seen: false,
                    },
                    outer_col: alpha.unwrap_or(0),
                    level: 0,
                    epoch: 0,
                    capture_in: 1,
                },
                i,
            )?;
        }
        Ok(())
    }

    // -- ternary ------------------------------------------------------------

    fn conditional_machine(&mut self, i: usize, line: &str, alpha: Option<usize>) -> CwResult<()> {
        if let Some(pos) = self.topmost(|k| matches!(k, RegionKind::Conditional { .. })) {
            if self.regions[pos].capture_in > 0 {
                self.regions[pos].capture_in -= 1;
                if self.regions[pos].capture_in == 0
                    && let RegionKind::Conditional { head_col, .. } = &mut self.regions[pos].kind
                {
                    *head_col = alpha.unwrap_or(0);
                }
            } else {
                let (head_col, traversals) = match &self.regions[pos].kind {
                    RegionKind::Conditional {
                        head_col,
                        traversals,
                        ..
                    } => (*head_col, *traversals),
                    _ => unreachable!(),
                };
                if alpha == Some(head_col) {
                    match traversals {
                        0 => {
                            // Second child of the operator: the true branch.
                            self.if_level += 1;
                            self.regions[pos].level = self.if_level;
                            let epoch = self.regions[pos].epoch;
                            self.start(ControlKind::Conditional, self.if_level, epoch);
                            if let RegionKind::Conditional {
                                traversals,
                                started,
                                ..
                            } = &mut self.regions[pos].kind
                            {
                                *traversals = 1;
                                *started = true;
                            }
                        }
                        1 => {
                            let level = self.regions[pos].level;
                            let epoch = self.regions[pos].epoch;
                            if let Some(b) = self.if_branch.get_mut(level) {
                                *b += 1;
                            }
                            self.start(ControlKind::Else, level, epoch);
                            if let RegionKind::Conditional { traversals, .. } =
                                &mut self.regions[pos].kind
                            {
                                *traversals = 2;
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        if line.contains("ConditionalOperator") {
            self.if_epoch += 1;
            self.if_branch.push(0);
            let epoch = self.if_epoch;
            self.push_region(
                Region {
                    kind: RegionKind::Conditional {
                        head_col: 0,
                        traversals: 0,
                        started: false,
                    },
                    outer_col: alpha.unwrap_or(0),
                    level: 0,
                    epoch,
                    capture_in: 1,
                },
                i,
            )?;
        }
        Ok(())
    }

    // -- if / else if / else ------------------------------------------------

    fn if_machine(
        &mut self,
        i: usize,
        line: &str,
        alpha: Option<usize>,
        tick: Option<usize>,
    ) -> CwResult<()> {
        let is_if_marker = line.contains("IfStmt");
        let mut chained_marker = false;

        // Else boundary: the closing backtick two columns left of the
        // condition column of the innermost open if announces the branch.
        if let Some(pos) = self.topmost(|k| matches!(k, RegionKind::If { .. }))
            && self.regions[pos].capture_in == 0
            && let RegionKind::If {
                cond_col,
                has_else: true,
                chained: false,
                started: true,
            } = self.regions[pos].kind
            && tick.map(|t| t + 2) == Some(cond_col)
        {
            let level = self.regions[pos].level;
            if let Some(b) = self.if_branch.get_mut(level) {
                *b += 1;
            }
            if is_if_marker {
                self.start(ControlKind::ElseIf, level, self.if_epoch);
                chained_marker = true;
                self.regions[pos].outer_col = alpha.unwrap_or(0);
                self.regions[pos].capture_in = 1;
                if let RegionKind::If {
                    chained, has_else, ..
                } = &mut self.regions[pos].kind
                {
                    *chained = true;
                    *has_else = line.contains("has_else");
                }
            } else {
                self.start(ControlKind::Else, level, self.if_epoch);
                if let RegionKind::If { has_else, .. } = &mut self.regions[pos].kind {
                    *has_else = false;
                }
            }
        }
        if chained_marker {
            return Ok(());
        }

        // Advance the innermost if before a nested marker is pushed: a bare
        // `if (x) if (y) …` puts the outer then-head on the inner's line.
        if let Some(pos) = self.topmost(|k| matches!(k, RegionKind::If { .. })) {
            if self.regions[pos].capture_in > 0 {
                self.regions[pos].capture_in -= 1;
                if self.regions[pos].capture_in == 0
                    && let RegionKind::If { cond_col, .. } = &mut self.regions[pos].kind
                {
                    *cond_col = alpha.unwrap_or(0);
                }
            } else {
                let (cond_col, started, chained) = match &self.regions[pos].kind {
                    RegionKind::If {
                        cond_col,
                        started,
                        chained,
                        ..
                    } => (*cond_col, *started, *chained),
                    _ => unreachable!(),
                };
                if (!started || chained) && alpha == Some(cond_col) {
                    if chained {
                        if let RegionKind::If { chained, .. } = &mut self.regions[pos].kind {
                            *chained = false;
                        }
                    } else {
                        self.if_level += 1;
                        self.regions[pos].level = self.if_level;
                        let epoch = self.regions[pos].epoch;
                        self.start(ControlKind::If, self.if_level, epoch);
                        if let RegionKind::If { started, .. } = &mut self.regions[pos].kind {
                            *started = true;
                        }
                    }
                }
            }
        }

        if is_if_marker {
            self.if_epoch += 1;
            self.if_branch.push(0);
            let epoch = self.if_epoch;
            self.push_region(
                Region {
                    kind: RegionKind::If {
                        cond_col: 0,
                        has_else: line.contains("has_else"),
                        chained: false,
                        started: false,
                    },
                    outer_col: alpha.unwrap_or(0),
                    level: 0,
                    epoch,
                    capture_in: 1,
                },
                i,
            )?;
        }
        Ok(())
    }

    // -- switch -------------------------------------------------------------

    fn switch_machine(
        &mut self,
        i: usize,
        line: &str,
        alpha: Option<usize>,
        tick: Option<usize>,
    ) -> CwResult<()> {
        if let Some(pos) = self.topmost(|k| matches!(k, RegionKind::Switch { .. })) {
            if self.regions[pos].capture_in > 0 {
                self.regions[pos].capture_in -= 1;
                if self.regions[pos].capture_in == 0
                    && let RegionKind::Switch { cond_col, .. } = &mut self.regions[pos].kind
                {
                    *cond_col = alpha.unwrap_or(0);
                }
            } else {
                let (cond_col, started) = match &self.regions[pos].kind {
                    RegionKind::Switch { cond_col, started } => (*cond_col, *started),
                    _ => unreachable!(),
                };
                if !started && tick == Some(cond_col) {
                    self.switch_level += 1;
                    self.regions[pos].level = self.switch_level;
                    let epoch = self.regions[pos].epoch;
                    self.start(ControlKind::Switch, self.switch_level, epoch);
                    if let RegionKind::Switch { started, .. } = &mut self.regions[pos].kind {
                        *started = true;
                    }
                }
            }
        }

        if line.contains("SwitchStmt") {
            self.switch_epoch += 1;
            self.case_index.push(0);
            let epoch = self.switch_epoch;
            self.push_region(
                Region {
                    kind: RegionKind::Switch {
                        cond_col: 0,
                        started: false,
                    },
                    outer_col: alpha.unwrap_or(0),
                    level: 0,
                    epoch,
                    capture_in: 1,
                },
                i,
            )?;
            return Ok(());
        }

        if (line.contains("CaseStmt") || line.contains("DefaultStmt")) && self.switch_level >= 1 {
            let kind = if line.contains("CaseStmt") {
                ControlKind::Case
            } else {
                ControlKind::Default
            };
            if let Some(c) = self.case_index.get_mut(self.switch_level) {
                *c += 1;
            }
            self.start(kind, self.switch_level, self.switch_epoch);
        }
        Ok(())
    }

    // -- function boundaries ------------------------------------------------

    fn begin_function(&mut self, i: usize) -> CwResult<()> {
        if !self.regions.is_empty() {
            return Err(CwError::structure(
                "regions left open at function boundary",
                self.lines,
                i,
            ));
        }
        let name = match function_decl_name(&self.lines[i]) {
            Some(n) => n.to_owned(),
            None => return Ok(()),
        };
        if self.index.is_user(&name) {
            // A prototype may precede the definition; the body seen last wins.
            if let Some(pos) = self.functions.iter().position(|f| f.name == name) {
                self.functions[pos].events.clear();
                self.current = Some(pos);
            } else {
                self.functions.push(FunctionEvents {
                    name,
                    events: Vec::new(),
                });
                self.current = Some(self.functions.len() - 1);
            }
            self.if_epoch = 0;
            self.switch_epoch = 0;
            self.loop_epoch = 0;
            self.do_epoch = 0;
            self.after_break = false;
            self.after_continue = false;
            self.if_branch = vec![0];
            self.case_index = vec![0];
            self.anchor_depth = 0;
        } else {
            self.current = None;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) fn extract_fixture(raw: &str, users: &[&str], externals: &[&str]) -> Extraction {
    use std::path::Path;
    let dump = AstDump::from_output(raw, Path::new("t.c")).unwrap();
    let index = SymbolIndex::for_tests(users, externals);
    extract(&dump, &index, MAX_NESTING).unwrap()
}

#[cfg(test)]
pub(crate) fn call_names(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Call(c) => Some(c.target.clone()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
fn kinds(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .map(|e| match e {
            Event::Call(c) => format!("call:{}", c.target),
            Event::Start(m) => format!("start:{:?}", m.kind),
            Event::End(m) => format!("end:{:?}", m.kind),
        })
        .collect()
}

#[cfg(test)]
pub(crate) const SEQ_DUMP: &str = "\
|-FunctionDecl 0x200 <t.c:4:1, line:8:1> line:4:6 f 'void ()'
| `-CompoundStmt 0x201 <col:10, line:8:1>
|   |-CallExpr 0x210 <line:5:3, col:5> 'void'
|   | `-ImplicitCastExpr 0x211 <col:3> 'void (*)()' <FunctionToPointerDecay>
|   |   `-DeclRefExpr 0x212 <col:3> 'void ()' Function 0x110 'a' 'void ()'
|   |-CallExpr 0x220 <line:6:3, col:5> 'void'
|   | `-ImplicitCastExpr 0x221 <col:3> 'void (*)()' <FunctionToPointerDecay>
|   |   `-DeclRefExpr 0x222 <col:3> 'void ()' Function 0x120 'b' 'void ()'
|   `-CallExpr 0x230 <line:7:3, col:5> 'void'
|     `-ImplicitCastExpr 0x231 <col:3> 'void (*)()' <FunctionToPointerDecay>
|       `-DeclRefExpr 0x232 <col:3> 'void ()' Function 0x130 'c' 'void ()'
";

#[test]
fn sequential_calls_in_source_order() {
    let ex = extract_fixture(SEQ_DUMP, &["f"], &["a", "b", "c"]);
    let f = ex.get("f").unwrap();
    assert_eq!(call_names(&f.events), ["a", "b", "c"]);
}

#[cfg(test)]
pub(crate) const IF_ELSE_DUMP: &str = "\
|-FunctionDecl 0x300 <t.c:1:1, line:5:1> line:1:6 f 'void ()'
| `-CompoundStmt 0x301 <col:10, line:5:1>
|   |-IfStmt 0x310 <line:2:3, line:3:15> has_else
|   | |-ImplicitCastExpr 0x311 <col:7> 'int' <LValueToRValue>
|   | | `-DeclRefExpr 0x312 <col:7> 'int' lvalue Var 0x50 'x' 'int'
|   | |-CallExpr 0x320 <col:10, col:12> 'void'
|   | | `-ImplicitCastExpr 0x321 <col:10> 'void (*)()' <FunctionToPointerDecay>
|   | |   `-DeclRefExpr 0x322 <col:10> 'void ()' Function 0x110 'a' 'void ()'
|   | `-CallExpr 0x330 <line:3:10, col:12> 'void'
|   |   `-ImplicitCastExpr 0x331 <col:10> 'void (*)()' <FunctionToPointerDecay>
|   |     `-DeclRefExpr 0x332 <col:10> 'void ()' Function 0x120 'b' 'void ()'
|   `-CallExpr 0x340 <line:4:3, col:5> 'void'
|     `-ImplicitCastExpr 0x341 <col:3> 'void (*)()' <FunctionToPointerDecay>
|       `-DeclRefExpr 0x342 <col:3> 'void ()' Function 0x130 'c' 'void ()'
";

#[test]
fn if_else_emits_branch_markers_around_calls() {
    let ex = extract_fixture(IF_ELSE_DUMP, &["f"], &["a", "b", "c"]);
    let f = ex.get("f").unwrap();
    assert_eq!(
        kinds(&f.events),
        [
            "start:If",
            "call:a",
            "start:Else",
            "call:b",
            "end:If",
            "call:c",
        ]
    );
}

#[cfg(test)]
pub(crate) const WHILE_DUMP: &str = "\
|-FunctionDecl 0x400 <t.c:1:1, line:4:1> line:1:6 f 'void ()'
| `-CompoundStmt 0x401 <col:10, line:4:1>
|   |-WhileStmt 0x410 <line:2:3, col:20>
|   | |-CallExpr 0x420 <col:10, col:12> 'int'
|   | | `-ImplicitCastExpr 0x421 <col:10> 'int (*)()' <FunctionToPointerDecay>
|   | |   `-DeclRefExpr 0x422 <col:10> 'int ()' Function 0x140 'p' 'int ()'
|   | `-CompoundStmt 0x430 <col:14, col:20>
|   |   `-CallExpr 0x440 <col:16, col:18> 'void'
|   |     `-ImplicitCastExpr 0x441 <col:16> 'void (*)()' <FunctionToPointerDecay>
|   |       `-DeclRefExpr 0x442 <col:16> 'void ()' Function 0x150 'q' 'void ()'
|   `-CallExpr 0x450 <line:3:3, col:5> 'void'
|     `-ImplicitCastExpr 0x451 <col:3> 'void (*)()' <FunctionToPointerDecay>
|       `-DeclRefExpr 0x452 <col:3> 'void ()' Function 0x160 'r' 'void ()'
";

#[test]
fn while_loop_brackets_condition_and_body() {
    let ex = extract_fixture(WHILE_DUMP, &["f"], &["p", "q", "r"]);
    let f = ex.get("f").unwrap();
    assert_eq!(
        kinds(&f.events),
        [
            "start:WhileCondition",
            format!("call:{}", anchor_name(0)).as_str(),
            "call:p",
            "end:WhileCondition",
            "start:While",
            "call:q",
            "end:While",
            "call:r",
        ]
    );
    let anchors: Vec<_> = f
        .events
        .iter()
        .filter(|e| matches!(e, Event::Call(c) if c.synthetic))
        .collect();
    assert_eq!(anchors.len(), 1);
}

#[cfg(test)]
pub(crate) const SWITCH_DUMP: &str = "\
|-FunctionDecl 0x500 <t.c:1:1, line:9:1> line:1:6 f 'void ()'
| `-CompoundStmt 0x501 <col:10, line:9:1>
|   |-SwitchStmt 0x510 <line:2:3, line:7:3>
|   | |-ImplicitCastExpr 0x511 <col:11> 'int' <LValueToRValue>
|   | | `-DeclRefExpr 0x512 <col:11> 'int' lvalue Var 0x60 'k' 'int'
|   | `-CompoundStmt 0x513 <col:14, line:7:3>
|   |   |-CaseStmt 0x520 <line:3:5, col:17>
|   |   | |-ConstantExpr 0x521 <col:10> 'int'
|   |   | | `-IntegerLiteral 0x522 <col:10> 'int' 1
|   |   | `-CallExpr 0x530 <col:13, col:15> 'void'
|   |   |   `-ImplicitCastExpr 0x531 <col:13> 'void (*)()' <FunctionToPointerDecay>
|   |   |     `-DeclRefExpr 0x532 <col:13> 'void ()' Function 0x110 'a' 'void ()'
|   |   |-CaseStmt 0x540 <line:4:5, col:17>
|   |   | |-ConstantExpr 0x541 <col:10> 'int'
|   |   | | `-IntegerLiteral 0x542 <col:10> 'int' 2
|   |   | `-CallExpr 0x550 <col:13, col:15> 'void'
|   |   |   `-ImplicitCastExpr 0x551 <col:13> 'void (*)()' <FunctionToPointerDecay>
|   |   |     `-DeclRefExpr 0x552 <col:13> 'void ()' Function 0x120 'b' 'void ()'
|   |   |-BreakStmt 0x560 <line:5:5>
|   |   `-DefaultStmt 0x570 <line:6:5, col:16>
|   |     `-CallExpr 0x580 <col:12, col:14> 'void'
|   |       `-ImplicitCastExpr 0x581 <col:12> 'void (*)()' <FunctionToPointerDecay>
|   |         `-DeclRefExpr 0x582 <col:12> 'void ()' Function 0x130 'c' 'void ()'
|   `-CallExpr 0x590 <line:8:3, col:5> 'void'
|     `-ImplicitCastExpr 0x591 <col:3> 'void (*)()' <FunctionToPointerDecay>
|       `-DeclRefExpr 0x592 <col:3> 'void ()' Function 0x135 'd' 'void ()'
";

#[test]
fn switch_emits_cases_and_break() {
    let ex = extract_fixture(SWITCH_DUMP, &["f"], &["a", "b", "c", "d"]);
    let f = ex.get("f").unwrap();
    assert_eq!(
        kinds(&f.events),
        [
            "start:Switch",
            "start:Case",
            "call:a",
            "start:Case",
            "call:b",
            "end:Break",
            "start:Default",
            "call:c",
            "end:Switch",
            "call:d",
        ]
    );
}

#[cfg(test)]
pub(crate) const RETURN_IN_IF_DUMP: &str = "\
|-FunctionDecl 0x600 <t.c:1:1, line:5:1> line:1:6 f 'void ()'
| `-CompoundStmt 0x601 <col:10, line:5:1>
|   |-IfStmt 0x610 <line:2:3, col:26>
|   | |-ImplicitCastExpr 0x611 <col:7> 'int' <LValueToRValue>
|   | | `-DeclRefExpr 0x612 <col:7> 'int' lvalue Var 0x50 'x' 'int'
|   | `-CompoundStmt 0x613 <col:10, col:26>
|   |   |-CallExpr 0x620 <col:12, col:14> 'void'
|   |   | `-ImplicitCastExpr 0x621 <col:12> 'void (*)()' <FunctionToPointerDecay>
|   |   |   `-DeclRefExpr 0x622 <col:12> 'void ()' Function 0x110 'a' 'void ()'
|   |   `-ReturnStmt 0x630 <col:17>
|   `-CallExpr 0x640 <line:4:3, col:5> 'void'
|     `-ImplicitCastExpr 0x641 <col:3> 'void (*)()' <FunctionToPointerDecay>
|       `-DeclRefExpr 0x642 <col:3> 'void ()' Function 0x120 'b' 'void ()'
";

#[test]
fn early_return_closes_inside_the_if() {
    let ex = extract_fixture(RETURN_IN_IF_DUMP, &["f"], &["a", "b"]);
    let f = ex.get("f").unwrap();
    assert_eq!(
        kinds(&f.events),
        [
            "start:If",
            "call:a",
            "end:Return",
            "end:If",
            "call:b",
        ]
    );
}

#[cfg(test)]
pub(crate) const PTHREAD_DUMP: &str = "\
|-FunctionDecl 0x700 <t.c:1:1, line:4:1> line:1:6 g 'void *(void *)'
| `-CompoundStmt 0x701 <col:20, line:4:1>
|   `-CallExpr 0x710 <line:2:3, col:5> 'void'
|     `-ImplicitCastExpr 0x711 <col:3> 'void (*)()' <FunctionToPointerDecay>
|       `-DeclRefExpr 0x712 <col:3> 'void ()' Function 0x115 'k' 'void ()'
|-FunctionDecl 0x720 <line:6:1, line:9:1> line:6:6 f 'void ()'
| `-CompoundStmt 0x721 <col:10, line:9:1>
|   |-CallExpr 0x730 <line:7:3, col:40> 'int'
|   | |-ImplicitCastExpr 0x731 <col:3> 'int (*)()' <FunctionToPointerDecay>
|   | | `-DeclRefExpr 0x732 <col:3> 'int ()' Function 0x140 'pthread_create' 'int ()'
|   | |-ImplicitCastExpr 0x733 <col:18> 'void *' <NullToPointer>
|   | | `-IntegerLiteral 0x734 <col:18> 'int' 0
|   | |-ImplicitCastExpr 0x735 <col:21> 'void *' <NullToPointer>
|   | | `-IntegerLiteral 0x736 <col:21> 'int' 0
|   | `-ImplicitCastExpr 0x737 <col:24> 'void *(*)(void *)' <FunctionToPointerDecay>
|   |   `-DeclRefExpr 0x738 <col:24> 'void *(void *)' Function 0x700 'g' 'void *(void *)'
|   `-CallExpr 0x740 <line:8:3, col:5> 'void'
|     `-ImplicitCastExpr 0x741 <col:3> 'void (*)()' <FunctionToPointerDecay>
|       `-DeclRefExpr 0x742 <col:3> 'void ()' Function 0x150 'h' 'void ()'
";

#[test]
fn spawned_routine_precedes_the_primitive() {
    let ex = extract_fixture(PTHREAD_DUMP, &["f", "g"], &["k", "h", "pthread_create"]);
    let f = ex.get("f").unwrap();
    assert_eq!(call_names(&f.events), ["g", "pthread_create", "h"]);
    let g = ex.get("g").unwrap();
    assert_eq!(call_names(&g.events), ["k"]);
}

#[test]
fn goto_is_fatal() {
    use std::path::Path;
    let raw = "\
|-FunctionDecl 0x800 <t.c:1:1, line:3:1> line:1:6 f 'void ()'
| `-CompoundStmt 0x801 <col:10, line:3:1>
|   `-GotoStmt 0x810 <line:2:3, col:8>
";
    let dump = AstDump::from_output(raw, Path::new("t.c")).unwrap();
    let index = SymbolIndex::for_tests(&["f"], &[]);
    let err = extract(&dump, &index, MAX_NESTING).unwrap_err();
    assert!(matches!(err, CwError::Unsupported { .. }));
}

#[test]
fn unknown_targets_are_dropped() {
    let ex = extract_fixture(SEQ_DUMP, &["f"], &["a", "c"]);
    let f = ex.get("f").unwrap();
    assert_eq!(call_names(&f.events), ["a", "c"]);
}

#[cfg(test)]
pub(crate) const ELSE_IF_DUMP: &str = "\
|-FunctionDecl 0x900 <t.c:1:1, line:7:1> line:1:6 f 'void ()'
| `-CompoundStmt 0x901 <col:10, line:7:1>
|   `-IfStmt 0x910 <line:2:3, line:6:13> has_else
|     |-ImplicitCastExpr 0x911 <col:7> 'int' <LValueToRValue>
|     | `-DeclRefExpr 0x912 <col:7> 'int' lvalue Var 0x50 'v' 'int'
|     |-CompoundStmt 0x913 <col:10, line:3:3>
|     | `-CallExpr 0x920 <col:12, col:14> 'void'
|     |   `-ImplicitCastExpr 0x921 <col:12> 'void (*)()' <FunctionToPointerDecay>
|     |     `-DeclRefExpr 0x922 <col:12> 'void ()' Function 0x110 'a' 'void ()'
|     `-IfStmt 0x930 <line:4:8, line:6:13> has_else
|       |-ImplicitCastExpr 0x931 <col:12> 'int' <LValueToRValue>
|       | `-DeclRefExpr 0x932 <col:12> 'int' lvalue Var 0x52 'w' 'int'
|       |-CompoundStmt 0x933 <col:15, line:5:3>
|       | `-CallExpr 0x940 <col:17, col:19> 'void'
|       |   `-ImplicitCastExpr 0x941 <col:17> 'void (*)()' <FunctionToPointerDecay>
|       |     `-DeclRefExpr 0x942 <col:17> 'void ()' Function 0x120 'b' 'void ()'
|       `-CompoundStmt 0x943 <line:6:8, col:13>
|         `-CallExpr 0x950 <col:10, col:12> 'void'
|           `-ImplicitCastExpr 0x951 <col:10> 'void (*)()' <FunctionToPointerDecay>
|             `-DeclRefExpr 0x952 <col:10> 'void ()' Function 0x130 'c' 'void ()'
";

#[test]
fn else_if_chain_stays_on_one_level() {
    let ex = extract_fixture(ELSE_IF_DUMP, &["f"], &["a", "b", "c"]);
    let f = ex.get("f").unwrap();
    assert_eq!(
        kinds(&f.events),
        [
            "start:If",
            "call:a",
            "start:ElseIf",
            "call:b",
            "start:Else",
            "call:c",
            "end:If",
        ]
    );
    // one shared level for the whole chain
    let levels: Vec<usize> = f
        .events
        .iter()
        .filter_map(|e| match e {
            Event::Start(m) => Some(m.level),
            _ => None,
        })
        .collect();
    assert_eq!(levels, [1, 1, 1]);
}

#[cfg(test)]
pub(crate) const FOR_DUMP: &str = "\
|-FunctionDecl 0xa00 <t.c:1:1, line:4:1> line:1:6 f 'void ()'
| `-CompoundStmt 0xa01 <col:10, line:4:1>
|   |-ForStmt 0xa10 <line:2:3, col:40>
|   | |-BinaryOperator 0xa11 <col:8, col:12> 'int' '='
|   | | |-DeclRefExpr 0xa12 <col:8> 'int' lvalue Var 0x50 'i' 'int'
|   | | `-IntegerLiteral 0xa13 <col:12> 'int' 0
|   | |-<<<NULL>>>
|   | |-CallExpr 0xa20 <col:15, col:17> 'int'
|   | | `-ImplicitCastExpr 0xa21 <col:15> 'int (*)()' <FunctionToPointerDecay>
|   | |   `-DeclRefExpr 0xa22 <col:15> 'int ()' Function 0x140 'p' 'int ()'
|   | |-UnaryOperator 0xa30 <col:20, col:21> 'int' postfix '++'
|   | | `-DeclRefExpr 0xa31 <col:20> 'int' lvalue Var 0x50 'i' 'int'
|   | `-CompoundStmt 0xa40 <col:26, col:40>
|   |   `-CallExpr 0xa50 <col:28, col:30> 'void'
|   |     `-ImplicitCastExpr 0xa51 <col:28> 'void (*)()' <FunctionToPointerDecay>
|   |       `-DeclRefExpr 0xa52 <col:28> 'void ()' Function 0x150 'q' 'void ()'
|   `-CallExpr 0xa60 <line:3:3, col:5> 'void'
|     `-ImplicitCastExpr 0xa61 <col:3> 'void (*)()' <FunctionToPointerDecay>
|       `-DeclRefExpr 0xa62 <col:3> 'void ()' Function 0x160 'r' 'void ()'
";

#[test]
fn for_loop_separates_header_clauses() {
    let ex = extract_fixture(FOR_DUMP, &["f"], &["p", "q", "r"]);
    let f = ex.get("f").unwrap();
    assert_eq!(
        kinds(&f.events),
        [
            "start:ForCondition1",
            format!("call:{}", anchor_name(0)).as_str(),
            "call:p",
            "end:ForCondition1",
            "start:ForCondition2",
            "end:ForCondition2",
            "start:For",
            "call:q",
            "end:For",
            "call:r",
        ]
    );
}

#[cfg(test)]
pub(crate) const DO_WHILE_DUMP: &str = "\
|-FunctionDecl 0xb00 <t.c:1:1, line:4:1> line:1:6 f 'void ()'
| `-CompoundStmt 0xb01 <col:10, line:4:1>
|   |-DoStmt 0xb10 <line:2:3, col:30>
|   | |-CompoundStmt 0xb11 <col:6, col:16>
|   | | `-CallExpr 0xb20 <col:8, col:10> 'void'
|   | |   `-ImplicitCastExpr 0xb21 <col:8> 'void (*)()' <FunctionToPointerDecay>
|   | |     `-DeclRefExpr 0xb22 <col:8> 'void ()' Function 0x150 'q' 'void ()'
|   | `-CallExpr 0xb30 <col:25, col:27> 'int'
|   |   `-ImplicitCastExpr 0xb31 <col:25> 'int (*)()' <FunctionToPointerDecay>
|   |     `-DeclRefExpr 0xb32 <col:25> 'int ()' Function 0x140 'p' 'int ()'
|   `-CallExpr 0xb40 <line:3:3, col:5> 'void'
|     `-ImplicitCastExpr 0xb41 <col:3> 'void (*)()' <FunctionToPointerDecay>
|       `-DeclRefExpr 0xb42 <col:3> 'void ()' Function 0x160 'r' 'void ()'
";

#[test]
fn do_while_condition_follows_body() {
    let ex = extract_fixture(DO_WHILE_DUMP, &["f"], &["p", "q", "r"]);
    let f = ex.get("f").unwrap();
    assert_eq!(
        kinds(&f.events),
        [
            "start:DoWhile",
            format!("call:{}", anchor_name(0)).as_str(),
            "call:q",
            "start:DoWhileCondition",
            "call:p",
            "end:DoWhile",
            "call:r",
        ]
    );
}

#[cfg(test)]
pub(crate) const TERNARY_DUMP: &str = "\
|-FunctionDecl 0xc00 <t.c:1:1, line:4:1> line:1:6 f 'void ()'
| `-CompoundStmt 0xc01 <col:10, line:4:1>
|   |-ConditionalOperator 0xc10 <line:2:3, col:22> 'void'
|   | |-ImplicitCastExpr 0xc11 <col:3> 'int' <LValueToRValue>
|   | | `-DeclRefExpr 0xc12 <col:3> 'int' lvalue Var 0x50 'x' 'int'
|   | |-CallExpr 0xc20 <col:7, col:9> 'void'
|   | | `-ImplicitCastExpr 0xc21 <col:7> 'void (*)()' <FunctionToPointerDecay>
|   | |   `-DeclRefExpr 0xc22 <col:7> 'void ()' Function 0x110 'a' 'void ()'
|   | `-CallExpr 0xc30 <col:14, col:16> 'void'
|   |   `-ImplicitCastExpr 0xc31 <col:14> 'void (*)()' <FunctionToPointerDecay>
|   |     `-DeclRefExpr 0xc32 <col:14> 'void ()' Function 0x120 'b' 'void ()'
|   `-CallExpr 0xc40 <line:3:3, col:5> 'void'
|     `-ImplicitCastExpr 0xc41 <col:3> 'void (*)()' <FunctionToPointerDecay>
|       `-DeclRefExpr 0xc42 <col:3> 'void ()' Function 0x130 'c' 'void ()'
";

#[test]
fn ternary_behaves_like_if_else() {
    let ex = extract_fixture(TERNARY_DUMP, &["f"], &["a", "b", "c"]);
    let f = ex.get("f").unwrap();
    assert_eq!(
        kinds(&f.events),
        [
            "start:Conditional",
            "call:a",
            "start:Else",
            "call:b",
            "end:Conditional",
            "call:c",
        ]
    );
}

#[cfg(test)]
pub(crate) const BREAK_IN_WHILE_DUMP: &str = "\
|-FunctionDecl 0xd00 <t.c:1:1, line:4:1> line:1:6 f 'void ()'
| `-CompoundStmt 0xd01 <col:10, line:4:1>
|   |-WhileStmt 0xd10 <line:2:3, col:30>
|   | |-ImplicitCastExpr 0xd11 <col:10> 'int' <LValueToRValue>
|   | | `-DeclRefExpr 0xd12 <col:10> 'int' lvalue Var 0x50 'x' 'int'
|   | `-CompoundStmt 0xd13 <col:13, col:30>
|   |   |-CallExpr 0xd20 <col:15, col:17> 'void'
|   |   | `-ImplicitCastExpr 0xd21 <col:15> 'void (*)()' <FunctionToPointerDecay>
|   |   |   `-DeclRefExpr 0xd22 <col:15> 'void ()' Function 0x150 'q' 'void ()'
|   |   `-BreakStmt 0xd30 <col:22>
|   `-CallExpr 0xd40 <line:3:3, col:5> 'void'
|     `-ImplicitCastExpr 0xd41 <col:3> 'void (*)()' <FunctionToPointerDecay>
|       `-DeclRefExpr 0xd42 <col:3> 'void ()' Function 0x160 'r' 'void ()'
";

#[test]
fn nesting_beyond_the_cap_fails() {
    use std::path::Path;
    let mut raw = String::from(
        "|-FunctionDecl 0x1 <t.c:1:1, line:2:1> line:1:6 f 'void ()'\n\
         | `-CompoundStmt 0x2 <col:10, col:12>\n",
    );
    for depth in 0..=MAX_NESTING {
        raw.push_str(&" ".repeat(4 + depth));
        raw.push_str("|-ReturnStmt 0x3 <col:3>\n");
    }
    let dump = AstDump::from_output(&raw, Path::new("t.c")).unwrap();
    let index = SymbolIndex::for_tests(&["f"], &[]);
    let err = extract(&dump, &index, MAX_NESTING).unwrap_err();
    assert!(matches!(err, CwError::ParseStructure { .. }));
}

#[test]
fn break_is_emitted_inside_the_loop_body() {
    let ex = extract_fixture(BREAK_IN_WHILE_DUMP, &["f"], &["q", "r"]);
    let f = ex.get("f").unwrap();
    assert_eq!(
        kinds(&f.events),
        [
            "start:WhileCondition",
            format!("call:{}", anchor_name(0)).as_str(),
            "end:WhileCondition",
            "start:While",
            "call:q",
            "end:Break",
            "end:While",
            "call:r",
        ]
    );
}
