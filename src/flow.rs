//! Stage C: materialize each function's control-flow-aware call graph.
//!
//! The builder consumes one event list and maintains a frontier (`prev`): the
//! set of nodes whose successor is whatever call comes next. Region frames
//! stacked on Start/End markers carry the per-kind work lists; loop back-edges
//! rendezvous on the iteration anchor, which is removed by re-routing when the
//! loop closes.

use crate::errors::{CwError, CwResult, LineContext};
use crate::events::{ControlKind, Event, Extraction, FunctionEvents};
use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Start,
    End,
    Callee,
    Anchor,
}

#[derive(Debug, Clone)]
pub struct FlowNode {
    pub name: String,
    pub role: NodeRole,
}

pub type FlowGraph = StableDiGraph<FlowNode, ()>;

/// Per-function flow graph over `{S, E} ∪ callees`.
#[derive(Debug)]
pub struct FuncFlow {
    pub name: String,
    pub graph: FlowGraph,
    pub start: NodeIndex,
    pub end: NodeIndex,
}

impl FuncFlow {
    /// Callee names reachable directly from the synthetic entry.
    pub fn start_set(&self) -> BTreeSet<String> {
        self.graph
            .neighbors_directed(self.start, Direction::Outgoing)
            .filter(|&n| n != self.end)
            .map(|n| self.graph[n].name.clone())
            .collect()
    }

    /// Callee names that feed the synthetic exit directly.
    pub fn end_set(&self) -> BTreeSet<String> {
        self.graph
            .neighbors_directed(self.end, Direction::Incoming)
            .filter(|&n| n != self.start)
            .map(|n| self.graph[n].name.clone())
            .collect()
    }

    /// Callee-to-callee successor map (entry and exit edges excluded).
    pub fn edges_by_name(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut out: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for e in self.graph.edge_indices() {
            let (a, b) = self.graph.edge_endpoints(e).unwrap();
            if a == self.start || a == self.end || b == self.start || b == self.end {
                continue;
            }
            out.entry(self.graph[a].name.clone())
                .or_default()
                .insert(self.graph[b].name.clone());
        }
        out
    }

    pub fn has_direct_start_end(&self) -> bool {
        self.graph.find_edge(self.start, self.end).is_some()
    }

    /// All edges as name pairs, sentinels rendered as `S`/`E`.
    pub fn edge_pairs(&self) -> BTreeSet<(String, String)> {
        self.graph
            .edge_indices()
            .map(|e| {
                let (a, b) = self.graph.edge_endpoints(e).unwrap();
                (self.label(a), self.label(b))
            })
            .collect()
    }

    fn label(&self, n: NodeIndex) -> String {
        match self.graph[n].role {
            NodeRole::Start => "S".to_owned(),
            NodeRole::End => "E".to_owned(),
            _ => self.graph[n].name.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipClass {
    IfLike,
    SwitchLike,
    LoopLike,
    DoCond,
    DoEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Skip {
    ToFunctionEnd,
    ToBoundary { class: SkipClass, level: usize },
}

#[derive(Debug, Default)]
struct BranchResult {
    end: Vec<NodeIndex>,
    called: bool,
    returned: bool,
    jumped: bool,
}

#[derive(Debug)]
struct BranchFrame {
    level: usize,
    pre: Vec<NodeIndex>,
    saved_pending: Option<bool>,
    branches: Vec<BranchResult>,
    cur_end: Vec<NodeIndex>,
    cur_called: bool,
    cur_returned: bool,
    cur_jumped: bool,
    has_else: bool,
    returns_cur: Vec<Vec<NodeIndex>>,
    returns_all: Vec<Vec<NodeIndex>>,
    worked: bool,
}

#[derive(Debug, Default)]
struct GroupResult {
    end: Vec<NodeIndex>,
    returned: bool,
}

#[derive(Debug)]
struct SwitchFrame {
    level: usize,
    pre: Vec<NodeIndex>,
    saved_pending: Option<bool>,
    groups: Vec<GroupResult>,
    cur_end: Vec<NodeIndex>,
    case_called: bool,
    seen_case: bool,
    after_break: bool,
    chain_returned: bool,
    any_group_empty: bool,
    has_default: bool,
    break_sets: Vec<Vec<NodeIndex>>,
    returns_cur: Vec<Vec<NodeIndex>>,
    returns_all: Vec<Vec<NodeIndex>>,
    worked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopMode {
    Cond,
    Second,
    Idle,
    Body,
}

#[derive(Debug)]
struct LoopFrame {
    level: usize,
    is_for: bool,
    pre: Vec<NodeIndex>,
    saved_pending: Option<bool>,
    mode: LoopMode,
    cond: Vec<NodeIndex>,
    second: Vec<NodeIndex>,
    body_start: Vec<NodeIndex>,
    body_end: Vec<NodeIndex>,
    breaks: Vec<Vec<NodeIndex>>,
    continues: Vec<Vec<NodeIndex>>,
    broke_last: bool,
    anchor: Option<NodeIndex>,
    worked: bool,
}

#[derive(Debug)]
struct DoFrame {
    level: usize,
    pre: Vec<NodeIndex>,
    saved_pending: Option<bool>,
    in_cond: bool,
    cond: Vec<NodeIndex>,
    body_start: Vec<NodeIndex>,
    body_end: Vec<NodeIndex>,
    breaks: Vec<Vec<NodeIndex>>,
    continues: Vec<Vec<NodeIndex>>,
    broke: bool,
    any_call: bool,
    anchor: Option<NodeIndex>,
    worked: bool,
}

#[derive(Debug)]
enum Frame {
    Branch(BranchFrame),
    Switch(SwitchFrame),
    Loop(LoopFrame),
    Do(DoFrame),
}

struct Builder<'a> {
    func: &'a str,
    g: FlowGraph,
    by_name: HashMap<String, NodeIndex>,
    start: NodeIndex,
    end: NodeIndex,
    prev: Vec<NodeIndex>,
    frames: Vec<Frame>,
    skip: Option<Skip>,
    /// `Some(mandatory)` right after a nested region closed having produced
    /// calls; consumed by the enclosing frame at its next boundary.
    pending: Option<bool>,
    skip_names: &'a HashSet<String>,
}

fn union_into(dst: &mut Vec<NodeIndex>, src: &[NodeIndex]) {
    for &n in src {
        if !dst.contains(&n) {
            dst.push(n);
        }
    }
}

fn structure(func: &str, reason: impl Into<String>) -> CwError {
    CwError::ParseStructure {
        reason: reason.into(),
        context: LineContext {
            line_no: 0,
            line: format!("in function '{func}'"),
            window: Vec::new(),
        },
    }
}

impl<'a> Builder<'a> {
    fn new(func: &'a str, skip_names: &'a HashSet<String>) -> Self {
        let mut g = FlowGraph::with_capacity(16, 32);
        let start = g.add_node(FlowNode {
            name: "S".into(),
            role: NodeRole::Start,
        });
        let end = g.add_node(FlowNode {
            name: "E".into(),
            role: NodeRole::End,
        });
        Self {
            func,
            g,
            by_name: HashMap::new(),
            start,
            end,
            prev: vec![start],
            frames: Vec::new(),
            skip: None,
            pending: None,
            skip_names,
        }
    }

    fn node_for(&mut self, name: &str, synthetic: bool) -> NodeIndex {
        if let Some(&n) = self.by_name.get(name) {
            return n;
        }
        let n = self.g.add_node(FlowNode {
            name: name.to_owned(),
            role: if synthetic {
                NodeRole::Anchor
            } else {
                NodeRole::Callee
            },
        });
        self.by_name.insert(name.to_owned(), n);
        n
    }

    fn connect(&mut self, from: &[NodeIndex], to: NodeIndex) {
        for &f in from {
            tracing::trace!(target: "flow", func = %self.func, "edge {} -> {}", f.index(), to.index());
            self.g.update_edge(f, to, ());
        }
    }

    fn connect_to_end(&mut self, sets: &[Vec<NodeIndex>]) {
        for set in sets {
            let set = set.clone();
            self.connect(&set, self.end);
        }
    }

    // -- skip handling ------------------------------------------------------

    /// True when `ev` lifts the active skip; the event is then processed.
    fn lifts_skip(&self, ev: &Event) -> bool {
        let Some(Skip::ToBoundary { class, level }) = self.skip else {
            return false;
        };
        let m = match ev {
            Event::Start(m) | Event::End(m) => m,
            Event::Call(_) => return false,
        };
        if m.level != level {
            return false;
        }
        match class {
            SkipClass::IfLike => matches!(
                (ev, m.kind),
                (Event::Start(_), ControlKind::Else | ControlKind::ElseIf)
                    | (Event::End(_), ControlKind::If | ControlKind::Conditional)
            ),
            SkipClass::SwitchLike => matches!(
                (ev, m.kind),
                (Event::Start(_), ControlKind::Case | ControlKind::Default)
                    | (Event::End(_), ControlKind::Switch)
            ),
            SkipClass::LoopLike => matches!(
                (ev, m.kind),
                (Event::End(_), ControlKind::While | ControlKind::For)
            ),
            SkipClass::DoCond => {
                matches!((ev, m.kind), (Event::Start(_), ControlKind::DoWhileCondition))
            }
            SkipClass::DoEnd => matches!((ev, m.kind), (Event::End(_), ControlKind::DoWhile)),
        }
    }

    // -- event dispatch -----------------------------------------------------

    fn feed(&mut self, ev: &Event) -> CwResult<()> {
        if self.skip.is_some() {
            if self.lifts_skip(ev) {
                self.skip = None;
            } else {
                tracing::trace!(target: "flow", func = %self.func, ?ev, "skipped");
                return Ok(());
            }
        }

        match ev {
            Event::Call(c) => self.on_call(&c.target, c.synthetic),
            Event::Start(m) => match m.kind {
                ControlKind::If | ControlKind::Conditional => {
                    self.frames.push(Frame::Branch(BranchFrame {
                        level: m.level,
                        pre: self.prev.clone(),
                        saved_pending: self.pending.take(),
                        branches: Vec::new(),
                        cur_end: Vec::new(),
                        cur_called: false,
                        cur_returned: false,
                        cur_jumped: false,
                        has_else: false,
                        returns_cur: Vec::new(),
                        returns_all: Vec::new(),
                        worked: false,
                    }));
                    Ok(())
                }
                ControlKind::ElseIf | ControlKind::Else => self.on_branch_boundary(m.kind),
                ControlKind::Switch => {
                    self.frames.push(Frame::Switch(SwitchFrame {
                        level: m.level,
                        pre: self.prev.clone(),
                        saved_pending: self.pending.take(),
                        groups: Vec::new(),
                        cur_end: Vec::new(),
                        case_called: false,
                        seen_case: false,
                        after_break: false,
                        chain_returned: false,
                        any_group_empty: false,
                        has_default: false,
                        break_sets: Vec::new(),
                        returns_cur: Vec::new(),
                        returns_all: Vec::new(),
                        worked: false,
                    }));
                    Ok(())
                }
                ControlKind::Case | ControlKind::Default => self.on_case(m.kind),
                ControlKind::WhileCondition | ControlKind::ForCondition1 => {
                    self.frames.push(Frame::Loop(LoopFrame {
                        level: m.level,
                        is_for: m.kind == ControlKind::ForCondition1,
                        pre: self.prev.clone(),
                        saved_pending: self.pending.take(),
                        mode: LoopMode::Cond,
                        cond: Vec::new(),
                        second: Vec::new(),
                        body_start: Vec::new(),
                        body_end: Vec::new(),
                        breaks: Vec::new(),
                        continues: Vec::new(),
                        broke_last: false,
                        anchor: None,
                        worked: false,
                    }));
                    Ok(())
                }
                ControlKind::ForCondition2 => self.loop_mode(LoopMode::Second),
                ControlKind::While | ControlKind::For => self.on_loop_body(),
                ControlKind::DoWhile => {
                    self.frames.push(Frame::Do(DoFrame {
                        level: m.level,
                        pre: self.prev.clone(),
                        saved_pending: self.pending.take(),
                        in_cond: false,
                        cond: Vec::new(),
                        body_start: Vec::new(),
                        body_end: Vec::new(),
                        breaks: Vec::new(),
                        continues: Vec::new(),
                        broke: false,
                        any_call: false,
                        anchor: None,
                        worked: false,
                    }));
                    Ok(())
                }
                ControlKind::DoWhileCondition => self.on_do_condition(),
                _ => Err(CwError::invariant(
                    "flow",
                    format!("unexpected start marker {:?}", m.kind),
                )),
            },
            Event::End(m) => match m.kind {
                ControlKind::If | ControlKind::Conditional => self.close_branch(),
                ControlKind::Switch => self.close_switch(),
                ControlKind::WhileCondition | ControlKind::ForCondition1 => {
                    self.loop_mode(LoopMode::Idle)
                }
                ControlKind::ForCondition2 => self.loop_mode(LoopMode::Idle),
                ControlKind::While | ControlKind::For => self.close_loop(),
                ControlKind::DoWhile => self.close_do(),
                ControlKind::Break => self.on_break(),
                ControlKind::Continue => self.on_continue(),
                ControlKind::Return => self.on_return(),
                _ => Err(CwError::invariant(
                    "flow",
                    format!("unexpected end marker {:?}", m.kind),
                )),
            },
        }
    }

    // -- calls --------------------------------------------------------------

    fn on_call(&mut self, target: &str, synthetic: bool) -> CwResult<()> {
        if !synthetic && self.skip_names.contains(target) {
            return Ok(());
        }
        self.pending = None;
        let node = self.node_for(target, synthetic);

        // Increment step of a `for` header: evaluated only on the back edge,
        // never linked from the frontier here.
        if let Some(Frame::Loop(l)) = self.frames.last_mut()
            && l.mode == LoopMode::Second
        {
            l.second.push(node);
            l.worked = true;
            return Ok(());
        }

        let prev = std::mem::take(&mut self.prev);
        self.connect(&prev, node);

        match self.frames.last_mut() {
            Some(Frame::Branch(b)) => {
                b.cur_called = true;
                b.worked = true;
                b.cur_end = vec![node];
            }
            Some(Frame::Switch(s)) => {
                s.case_called = true;
                s.worked = true;
                s.cur_end = vec![node];
            }
            Some(Frame::Loop(l)) => {
                l.worked = true;
                match l.mode {
                    LoopMode::Cond => {
                        l.cond.push(node);
                        if synthetic {
                            l.anchor = Some(node);
                        }
                    }
                    LoopMode::Body => {
                        if l.body_start.len() < 2 {
                            l.body_start.push(node);
                        }
                        l.body_end = vec![node];
                    }
                    LoopMode::Idle => {
                        l.body_end = vec![node];
                    }
                    LoopMode::Second => unreachable!(),
                }
            }
            Some(Frame::Do(d)) => {
                d.worked = true;
                d.any_call = true;
                if d.in_cond {
                    if d.cond.is_empty() {
                        d.cond.push(node);
                    }
                } else {
                    if d.body_start.len() < 2 {
                        d.body_start.push(node);
                    }
                    if synthetic {
                        d.anchor = Some(node);
                    }
                }
                d.body_end = vec![node];
            }
            None => {}
        }
        self.prev = vec![node];
        Ok(())
    }

    // -- if / conditional ---------------------------------------------------

    fn finalize_branch(&mut self) -> CwResult<()> {
        let pending = self.pending.take();
        let Some(Frame::Branch(b)) = self.frames.last_mut() else {
            return Err(CwError::invariant("flow", "branch boundary without an if frame"));
        };
        if let Some(mandatory) = pending {
            b.cur_end = self.prev.clone();
            b.worked = true;
            if mandatory {
                b.cur_called = true;
            }
        }
        let returns = std::mem::take(&mut b.returns_cur);
        if !returns.is_empty() {
            b.cur_returned = true;
            b.cur_called = true;
            b.worked = true;
            b.returns_all.extend(returns.iter().cloned());
        }
        let result = BranchResult {
            end: if b.cur_returned {
                Vec::new()
            } else {
                std::mem::take(&mut b.cur_end)
            },
            called: b.cur_called,
            returned: b.cur_returned,
            jumped: b.cur_jumped,
        };
        b.cur_end = Vec::new();
        b.cur_called = false;
        b.cur_returned = false;
        b.cur_jumped = false;
        b.branches.push(result);
        self.connect_to_end(&returns);
        Ok(())
    }

    fn on_branch_boundary(&mut self, kind: ControlKind) -> CwResult<()> {
        self.finalize_branch()?;
        let Some(Frame::Branch(b)) = self.frames.last_mut() else {
            unreachable!()
        };
        if kind == ControlKind::Else {
            b.has_else = true;
        }
        self.prev = b.pre.clone();
        Ok(())
    }

    fn close_branch(&mut self) -> CwResult<()> {
        self.finalize_branch()?;
        let Some(Frame::Branch(b)) = self.frames.pop() else {
            unreachable!()
        };
        let all_returned =
            b.has_else && !b.branches.is_empty() && b.branches.iter().all(|r| r.returned);
        let mandatory = b.has_else
            && b.branches
                .iter()
                .all(|r| r.called && !r.returned && !r.jumped);

        if all_returned {
            let mut prev = Vec::new();
            for set in &b.returns_all {
                union_into(&mut prev, set);
            }
            self.prev = prev;
            self.pending = if b.worked { Some(mandatory) } else { b.saved_pending };
            // Every arm left the function: the enclosing region must see the
            // same termination.
            return self.on_return();
        }

        let mut prev = Vec::new();
        for r in &b.branches {
            union_into(&mut prev, &r.end);
        }
        if !mandatory {
            union_into(&mut prev, &b.pre);
        }
        self.prev = prev;
        self.pending = if b.worked { Some(mandatory) } else { b.saved_pending };
        Ok(())
    }

    // -- switch -------------------------------------------------------------

    fn on_case(&mut self, kind: ControlKind) -> CwResult<()> {
        let pending = self.pending.take();
        let Some(Frame::Switch(s)) = self.frames.last_mut() else {
            return Err(CwError::invariant("flow", "case marker without a switch frame"));
        };
        if let Some(mandatory) = pending {
            s.cur_end = self.prev.clone();
            s.worked = true;
            if mandatory {
                s.case_called = true;
            }
        }
        let returns = std::mem::take(&mut s.returns_cur);
        if !returns.is_empty() {
            s.chain_returned = true;
            s.returns_all.extend(returns.iter().cloned());
        }

        if s.after_break || s.chain_returned {
            if s.after_break && !s.case_called && s.seen_case {
                // the last case before the break made no call: the switch can
                // be crossed silently by entering there
                s.any_group_empty = true;
            }
            s.groups.push(GroupResult {
                end: std::mem::take(&mut s.cur_end),
                returned: s.chain_returned,
            });
            s.after_break = false;
            s.chain_returned = false;
            self.prev = s.pre.clone();
        } else {
            let mut prev = s.pre.clone();
            union_into(&mut prev, &s.cur_end);
            self.prev = prev;
        }
        s.case_called = false;
        s.seen_case = true;
        if kind == ControlKind::Default {
            s.has_default = true;
        }
        self.connect_to_end(&returns);
        Ok(())
    }

    fn close_switch(&mut self) -> CwResult<()> {
        let pending = self.pending.take();
        let Some(Frame::Switch(s)) = self.frames.last_mut() else {
            return Err(CwError::invariant("flow", "switch end without a switch frame"));
        };
        if let Some(mandatory) = pending {
            s.cur_end = self.prev.clone();
            s.worked = true;
            if mandatory {
                s.case_called = true;
            }
        }
        let returns = std::mem::take(&mut s.returns_cur);
        if !returns.is_empty() {
            s.chain_returned = true;
            s.returns_all.extend(returns.iter().cloned());
        }
        self.connect_to_end(&returns);

        let Some(Frame::Switch(mut s)) = self.frames.pop() else {
            unreachable!()
        };
        let final_empty = s.seen_case && !s.case_called && !s.chain_returned;
        s.groups.push(GroupResult {
            end: std::mem::take(&mut s.cur_end),
            returned: s.chain_returned,
        });

        let all_returned =
            s.has_default && !s.groups.is_empty() && s.groups.iter().all(|g| g.returned);
        let mandatory = s.has_default && !s.any_group_empty && !final_empty;

        if all_returned {
            let mut prev = Vec::new();
            for set in &s.returns_all {
                union_into(&mut prev, set);
            }
            self.prev = prev;
            self.pending = if s.worked { Some(mandatory) } else { s.saved_pending };
            return self.on_return();
        }

        let mut prev = Vec::new();
        for g in &s.groups {
            union_into(&mut prev, &g.end);
        }
        if !mandatory {
            union_into(&mut prev, &s.pre);
        }
        for set in &s.break_sets {
            union_into(&mut prev, set);
        }
        self.prev = prev;
        self.pending = if s.worked { Some(mandatory) } else { s.saved_pending };
        Ok(())
    }

    // -- loops --------------------------------------------------------------

    fn loop_mode(&mut self, mode: LoopMode) -> CwResult<()> {
        let Some(Frame::Loop(l)) = self.frames.last_mut() else {
            return Err(CwError::invariant("flow", "loop header marker without a loop frame"));
        };
        l.mode = mode;
        Ok(())
    }

    fn on_loop_body(&mut self) -> CwResult<()> {
        let Some(Frame::Loop(l)) = self.frames.last_mut() else {
            return Err(CwError::invariant("flow", "loop body marker without a loop frame"));
        };
        l.mode = LoopMode::Body;
        if !l.cond.is_empty() {
            l.body_start.push(l.cond[0]);
            if l.cond.len() > 1 && l.body_start.len() < 2 {
                l.body_start.push(l.cond[1]);
            }
            l.body_end = vec![*l.cond.last().unwrap()];
        }
        Ok(())
    }

    /// Re-route every edge through the anchor and drop the node. All frame
    /// lists referencing it are purged as well.
    fn remove_anchor(frame_lists: &mut [&mut Vec<NodeIndex>], g: &mut FlowGraph, anchor: NodeIndex) {
        let ins: Vec<NodeIndex> = g
            .neighbors_directed(anchor, Direction::Incoming)
            .filter(|&n| n != anchor)
            .collect();
        let outs: Vec<NodeIndex> = g
            .neighbors_directed(anchor, Direction::Outgoing)
            .filter(|&n| n != anchor)
            .collect();
        for &i in &ins {
            for &o in &outs {
                g.update_edge(i, o, ());
            }
        }
        g.remove_node(anchor);
        for list in frame_lists {
            list.retain(|&n| n != anchor);
        }
    }

    fn close_loop(&mut self) -> CwResult<()> {
        let pending = self.pending.take();
        let prev_snapshot = self.prev.clone();
        let Some(Frame::Loop(mut l)) = self.frames.pop() else {
            return Err(CwError::invariant("flow", "loop end without a loop frame"));
        };

        if pending.is_some() {
            l.worked = true;
            l.body_end = prev_snapshot.clone();
            if l.body_start.len() < 2 {
                for &p in &prev_snapshot {
                    if !l.body_start.contains(&p) && l.body_start.len() < 2 {
                        l.body_start.push(p);
                    }
                }
            }
        }

        // continue exits re-enter at the header
        let continue_target = if l.is_for {
            if !l.second.is_empty() {
                Some(l.second[0])
            } else if !l.cond.is_empty() {
                Some(l.cond[0])
            } else {
                None
            }
        } else if !l.body_start.is_empty() {
            Some(l.body_start[0])
        } else {
            None
        };
        if let Some(t) = continue_target {
            for set in l.continues.clone() {
                self.connect(&set, t);
            }
        }

        if !l.broke_last {
            if l.is_for {
                self.for_back_edges(&l)?;
            } else if !l.body_end.is_empty() && !l.body_start.is_empty() {
                let (end, head) = (l.body_end.clone(), l.body_start[0]);
                self.connect(&end, head);
            }
        } else if l.is_for && !l.continues.is_empty() {
            // a trailing break still leaves the continue paths looping
            self.for_back_edges_reduced(&l)?;
        }

        if let Some(anchor) = l.anchor.take() {
            Self::remove_anchor(
                &mut [
                    &mut l.cond,
                    &mut l.second,
                    &mut l.body_start,
                    &mut l.body_end,
                ],
                &mut self.g,
                anchor,
            );
            for set in l.breaks.iter_mut().chain(l.continues.iter_mut()) {
                set.retain(|&n| n != anchor);
            }
        }

        if l.cond.is_empty() && l.second.is_empty() && l.body_start.is_empty() && l.body_end.is_empty()
        {
            l.worked = false;
        }

        let mut prev = Vec::new();
        let effectful_header = !l.cond.is_empty();
        if effectful_header {
            prev.push(*l.cond.last().unwrap());
        } else if l.is_for && !l.second.is_empty() {
            prev.push(*l.second.last().unwrap());
            union_into(&mut prev, &l.pre);
        } else {
            union_into(&mut prev, &l.body_end);
            union_into(&mut prev, &l.pre);
        }
        if prev.is_empty() {
            union_into(&mut prev, &l.pre);
        }
        for set in &l.breaks {
            union_into(&mut prev, set);
        }
        if !effectful_header && (!l.is_for || l.second.is_empty()) {
            for set in &l.continues {
                union_into(&mut prev, set);
            }
        }
        self.prev = prev;
        self.pending = if l.worked {
            Some(effectful_header)
        } else {
            l.saved_pending
        };
        Ok(())
    }

    fn for_back_edges(&mut self, l: &LoopFrame) -> CwResult<()> {
        let have_body = !l.body_end.is_empty() && !l.body_start.is_empty();
        if !l.second.is_empty() {
            for w in l.second.windows(2) {
                self.connect(&[w[0]], w[1]);
            }
        }
        match (!l.cond.is_empty(), !l.second.is_empty()) {
            (true, true) => {
                if have_body {
                    let end = l.body_end.clone();
                    self.connect(&end, l.second[0]);
                    self.connect(&[*l.second.last().unwrap()], l.cond[0]);
                } else {
                    return Err(CwError::invariant("flow", "for loop lost its header anchor"));
                }
            }
            (true, false) => {
                if have_body {
                    let end = l.body_end.clone();
                    self.connect(&end, l.cond[0]);
                } else {
                    return Err(CwError::invariant("flow", "for loop lost its header anchor"));
                }
            }
            (false, true) => {
                if have_body {
                    let end = l.body_end.clone();
                    self.connect(&end, l.second[0]);
                    for &s in &l.body_start {
                        self.connect(&[*l.second.last().unwrap()], s);
                    }
                }
            }
            (false, false) => {
                if have_body {
                    for &s in &l.body_start.clone() {
                        let end = l.body_end.clone();
                        self.connect(&end, s);
                    }
                }
            }
        }
        Ok(())
    }

    fn for_back_edges_reduced(&mut self, l: &LoopFrame) -> CwResult<()> {
        if !l.second.is_empty() {
            for w in l.second.windows(2) {
                self.connect(&[w[0]], w[1]);
            }
            if !l.cond.is_empty() {
                self.connect(&[*l.second.last().unwrap()], l.cond[0]);
            } else {
                for &s in &l.body_start.clone() {
                    self.connect(&[*l.second.last().unwrap()], s);
                }
            }
        } else if l.cond.is_empty()
            && !l.body_start.is_empty()
            && !l.body_end.is_empty()
        {
            for &s in &l.body_start.clone() {
                let end = l.body_end.clone();
                self.connect(&end, s);
            }
        }
        Ok(())
    }

    // -- do / while ---------------------------------------------------------

    fn on_do_condition(&mut self) -> CwResult<()> {
        let pending = self.pending.take();
        let Some(Frame::Do(d)) = self.frames.last_mut() else {
            return Err(CwError::invariant("flow", "do-while condition without a frame"));
        };
        d.in_cond = true;
        if let Some(mandatory) = pending {
            d.worked = true;
            if mandatory {
                d.any_call = true;
            }
            d.body_end = self.prev.clone();
            if d.body_start.is_empty() {
                d.body_start = self.prev.clone();
            }
        }
        if d.broke && !d.continues.is_empty() {
            let mut prev = Vec::new();
            for set in &d.continues {
                union_into(&mut prev, set);
            }
            self.prev = prev;
        }
        Ok(())
    }

    fn close_do(&mut self) -> CwResult<()> {
        if self.pending.is_some() {
            return Err(CwError::invariant(
                "flow",
                "unconsumed nested region at do-while close",
            ));
        }
        let Some(Frame::Do(mut d)) = self.frames.pop() else {
            return Err(CwError::invariant("flow", "do-while end without a frame"));
        };

        if !d.cond.is_empty() {
            for set in d.continues.clone() {
                self.connect(&set, d.cond[0]);
            }
        }

        if !d.cond.is_empty() {
            if !d.body_start.is_empty() && !d.body_end.is_empty() {
                for &s in &d.body_start.clone() {
                    let end = d.body_end.clone();
                    self.connect(&end, s);
                }
            } else if d.body_start.is_empty() && !d.body_end.is_empty() {
                let last = *d.body_end.last().unwrap();
                self.connect(&[last], d.cond[0]);
            } else if d.worked {
                return Err(CwError::invariant("flow", "do-while lost its body entries"));
            }
        } else if !d.body_start.is_empty() && !d.body_end.is_empty() {
            for &s in &d.body_start.clone() {
                let end = d.body_end.clone();
                self.connect(&end, s);
            }
        } else if !(d.body_start.is_empty() && d.body_end.is_empty()) {
            return Err(CwError::invariant("flow", "do-while body tracking out of sync"));
        }

        if let Some(anchor) = d.anchor.take() {
            Self::remove_anchor(
                &mut [&mut d.cond, &mut d.body_start, &mut d.body_end],
                &mut self.g,
                anchor,
            );
            for set in d.breaks.iter_mut().chain(d.continues.iter_mut()) {
                set.retain(|&n| n != anchor);
            }
        }

        if d.cond.is_empty() && d.body_start.is_empty() && d.body_end.is_empty() {
            d.worked = false;
        }

        let mut prev = Vec::new();
        if d.body_start.is_empty() && d.body_end.is_empty() {
            union_into(&mut prev, &d.pre);
        } else {
            union_into(&mut prev, &d.body_end);
        }
        for set in &d.breaks {
            union_into(&mut prev, set);
        }
        if d.cond.is_empty() {
            for set in &d.continues {
                union_into(&mut prev, set);
            }
        }
        self.prev = prev;
        self.pending = if d.worked { Some(d.any_call) } else { d.saved_pending };
        Ok(())
    }

    // -- jumps --------------------------------------------------------------

    fn on_break(&mut self) -> CwResult<()> {
        let prev = self.prev.clone();
        let top = self.frames.len().checked_sub(1);
        let mut target = None;
        for idx in (0..self.frames.len()).rev() {
            match &mut self.frames[idx] {
                Frame::Loop(l) => {
                    l.breaks.push(prev.clone());
                    if Some(idx) == top {
                        l.broke_last = true;
                        self.skip = Some(Skip::ToBoundary {
                            class: SkipClass::LoopLike,
                            level: l.level,
                        });
                    }
                    target = Some(idx);
                    break;
                }
                Frame::Do(d) => {
                    d.breaks.push(prev.clone());
                    if Some(idx) == top {
                        d.broke = true;
                        self.skip = Some(if d.continues.is_empty() {
                            Skip::ToBoundary {
                                class: SkipClass::DoEnd,
                                level: d.level,
                            }
                        } else {
                            Skip::ToBoundary {
                                class: SkipClass::DoCond,
                                level: d.level,
                            }
                        });
                    }
                    target = Some(idx);
                    break;
                }
                Frame::Switch(s) => {
                    s.break_sets.push(prev.clone());
                    s.after_break = true;
                    if Some(idx) == top {
                        self.skip = Some(Skip::ToBoundary {
                            class: SkipClass::SwitchLike,
                            level: s.level,
                        });
                    }
                    target = Some(idx);
                    break;
                }
                Frame::Branch(_) => {}
            }
        }
        let Some(t) = target else {
            return Err(structure(self.func, "break outside any loop or switch"));
        };
        for idx in t + 1..self.frames.len() {
            if let Frame::Branch(b) = &mut self.frames[idx] {
                b.cur_jumped = true;
            }
        }
        Ok(())
    }

    fn on_continue(&mut self) -> CwResult<()> {
        let prev = self.prev.clone();
        let top = self.frames.len().checked_sub(1);
        let mut target = None;
        for idx in (0..self.frames.len()).rev() {
            match &mut self.frames[idx] {
                Frame::Loop(l) => {
                    l.continues.push(prev.clone());
                    if Some(idx) == top {
                        self.skip = Some(Skip::ToBoundary {
                            class: SkipClass::LoopLike,
                            level: l.level,
                        });
                    }
                    target = Some(idx);
                    break;
                }
                Frame::Do(d) => {
                    d.continues.push(prev.clone());
                    if Some(idx) == top {
                        self.skip = Some(Skip::ToBoundary {
                            class: SkipClass::DoCond,
                            level: d.level,
                        });
                    }
                    target = Some(idx);
                    break;
                }
                _ => {}
            }
        }
        let Some(t) = target else {
            return Err(structure(self.func, "continue outside any loop"));
        };
        for idx in t + 1..self.frames.len() {
            if let Frame::Branch(b) = &mut self.frames[idx] {
                b.cur_jumped = true;
            }
        }
        Ok(())
    }

    fn on_return(&mut self) -> CwResult<()> {
        let prev = self.prev.clone();
        match self.frames.last_mut() {
            Some(Frame::Branch(b)) => {
                b.returns_cur.push(prev);
                self.skip = Some(Skip::ToBoundary {
                    class: SkipClass::IfLike,
                    level: b.level,
                });
                Ok(())
            }
            Some(Frame::Switch(s)) => {
                s.returns_cur.push(prev);
                self.skip = Some(Skip::ToBoundary {
                    class: SkipClass::SwitchLike,
                    level: s.level,
                });
                Ok(())
            }
            Some(Frame::Loop(_)) | Some(Frame::Do(_)) => Err(structure(
                self.func,
                "return directly inside a loop body is unsupported",
            )),
            None => {
                self.skip = Some(Skip::ToFunctionEnd);
                Ok(())
            }
        }
    }

    // -- wrap-up ------------------------------------------------------------

    fn finish(mut self) -> CwResult<FuncFlow> {
        self.skip = None;
        if !self.frames.is_empty() {
            return Err(CwError::invariant(
                "flow",
                format!("{} region frames left open", self.frames.len()),
            ));
        }
        let prev = std::mem::take(&mut self.prev);
        self.connect(&prev, self.end);

        let flow = FuncFlow {
            name: self.func.to_owned(),
            graph: self.g,
            start: self.start,
            end: self.end,
        };
        validate(&flow)?;
        Ok(flow)
    }
}

fn validate(flow: &FuncFlow) -> CwResult<()> {
    for n in flow.graph.node_indices() {
        if flow.graph[n].role == NodeRole::Anchor {
            return Err(CwError::invariant(
                "flow",
                format!("iteration anchor survived in '{}'", flow.name),
            ));
        }
    }
    if flow
        .graph
        .neighbors_directed(flow.start, Direction::Incoming)
        .next()
        .is_some()
    {
        return Err(CwError::invariant("flow", "entry node acquired an in-edge"));
    }
    if flow
        .graph
        .neighbors_directed(flow.end, Direction::Outgoing)
        .next()
        .is_some()
    {
        return Err(CwError::invariant("flow", "exit node acquired an out-edge"));
    }
    if cfg!(debug_assertions) {
        let mut reached = 0usize;
        let mut bfs = petgraph::visit::Bfs::new(&flow.graph, flow.start);
        while bfs.next(&flow.graph).is_some() {
            reached += 1;
        }
        tracing::debug!(
            target: "flow",
            func = %flow.name,
            nodes = flow.graph.node_count(),
            edges = flow.graph.edge_count(),
            reached,
            "flow graph built"
        );
    }
    Ok(())
}

/// Build one function's flow graph from its event list.
pub fn build_function(events: &FunctionEvents, skip_names: &HashSet<String>) -> CwResult<FuncFlow> {
    let mut b = Builder::new(&events.name, skip_names);
    for ev in &events.events {
        b.feed(ev)?;
    }
    b.finish()
}

/// A function that never reaches an external symbol: `S → E` only.
fn trivial_flow(name: &str) -> FuncFlow {
    let mut g = FlowGraph::with_capacity(2, 1);
    let start = g.add_node(FlowNode {
        name: "S".into(),
        role: NodeRole::Start,
    });
    let end = g.add_node(FlowNode {
        name: "E".into(),
        role: NodeRole::End,
    });
    g.update_edge(start, end, ());
    FuncFlow {
        name: name.to_owned(),
        graph: g,
        start,
        end,
    }
}

/// Stage C driver: the abstain fixed point plus the capped powerset union.
///
/// Functions whose entry can reach their exit without touching an external
/// symbol may contribute nothing at a call site; every subset of that
/// candidate set is replayed and the edges are unioned, so optional paths
/// surface alongside the mandatory ones.
pub fn build_all(
    extraction: &Extraction,
    never_calls: &HashSet<String>,
    powerset_cap: usize,
) -> CwResult<Vec<FuncFlow>> {
    let run = |skips: &HashSet<String>| -> CwResult<Vec<FuncFlow>> {
        extraction
            .functions
            .iter()
            .map(|f| {
                if never_calls.contains(&f.name) {
                    Ok(trivial_flow(&f.name))
                } else {
                    build_function(f, skips)
                }
            })
            .collect()
    };

    // Fixed point of the may-abstain candidate set.
    let mut abstain: HashSet<String> = HashSet::new();
    loop {
        let mut skips = never_calls.clone();
        skips.extend(abstain.iter().cloned());
        let flows = run(&skips)?;
        let found: HashSet<String> = flows
            .iter()
            .filter(|g| g.has_direct_start_end() && !never_calls.contains(&g.name))
            .map(|g| g.name.clone())
            .collect();
        if found == abstain {
            break;
        }
        abstain = found;
    }

    let mut candidates: Vec<String> = abstain.into_iter().collect();
    candidates.sort();
    if candidates.len() > powerset_cap {
        tracing::warn!(
            target: "flow",
            dropped = ?&candidates[powerset_cap..],
            "may-abstain candidates over the powerset cap were not replayed"
        );
        candidates.truncate(powerset_cap);
    }

    let mut base = run(never_calls)?;
    let name_to_pos: HashMap<String, usize> = base
        .iter()
        .enumerate()
        .map(|(i, g)| (g.name.clone(), i))
        .collect();

    for mask in 1u64..(1u64 << candidates.len()) {
        let mut skips = never_calls.clone();
        for (bit, name) in candidates.iter().enumerate() {
            if mask & (1 << bit) != 0 {
                skips.insert(name.clone());
            }
        }
        let variant = run(&skips)?;
        for v in &variant {
            let Some(&pos) = name_to_pos.get(&v.name) else {
                continue;
            };
            merge_edges(&mut base[pos], v);
        }
    }

    for flow in &base {
        validate(flow)?;
    }
    Ok(base)
}

/// Union `src`'s edges into `dst` by node name.
fn merge_edges(dst: &mut FuncFlow, src: &FuncFlow) {
    let mut by_name: HashMap<String, NodeIndex> = dst
        .graph
        .node_indices()
        .map(|n| (dst.graph[n].name.clone(), n))
        .collect();
    for e in src.graph.edge_indices() {
        let (a, b) = src.graph.edge_endpoints(e).unwrap();
        let resolve = |flow: &mut FuncFlow,
                       by_name: &mut HashMap<String, NodeIndex>,
                       node: &FlowNode,
                       idx_src: NodeIndex,
                       src: &FuncFlow|
         -> NodeIndex {
            if idx_src == src.start {
                return flow.start;
            }
            if idx_src == src.end {
                return flow.end;
            }
            *by_name.entry(node.name.clone()).or_insert_with(|| {
                flow.graph.add_node(FlowNode {
                    name: node.name.clone(),
                    role: node.role,
                })
            })
        };
        let da = resolve(dst, &mut by_name, &src.graph[a], a, src);
        let db = resolve(dst, &mut by_name, &src.graph[b], b, src);
        dst.graph.update_edge(da, db, ());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
use crate::events::{CallEvent, Context, Marker};

#[cfg(test)]
fn call(t: &str) -> Event {
    Event::Call(CallEvent {
        target: t.into(),
        synthetic: false,
        ctx: Context::default(),
    })
}

#[cfg(test)]
fn anchor(i: usize) -> Event {
    Event::Call(CallEvent {
        target: crate::events::anchor_name(i),
        synthetic: true,
        ctx: Context::default(),
    })
}

#[cfg(test)]
fn st(kind: ControlKind, level: usize) -> Event {
    Event::Start(Marker {
        kind,
        level,
        epoch: 0,
    })
}

#[cfg(test)]
fn en(kind: ControlKind, level: usize) -> Event {
    Event::End(Marker {
        kind,
        level,
        epoch: 0,
    })
}

#[cfg(test)]
fn flow_of(events: Vec<Event>) -> FuncFlow {
    let fe = FunctionEvents {
        name: "f".into(),
        events,
    };
    build_function(&fe, &HashSet::new()).unwrap()
}

#[cfg(test)]
fn edges(flow: &FuncFlow) -> BTreeSet<(String, String)> {
    flow.edge_pairs()
}

#[cfg(test)]
fn pairs(list: &[(&str, &str)]) -> BTreeSet<(String, String)> {
    list.iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect()
}

#[test]
fn sequential_calls_chain() {
    let f = flow_of(vec![call("a"), call("b"), call("c")]);
    assert_eq!(
        edges(&f),
        pairs(&[("S", "a"), ("a", "b"), ("b", "c"), ("c", "E")])
    );
    assert_eq!(f.start_set(), BTreeSet::from(["a".to_string()]));
    assert_eq!(f.end_set(), BTreeSet::from(["c".to_string()]));
}

#[test]
fn if_else_joins_branches() {
    use ControlKind::*;
    let f = flow_of(vec![
        st(If, 1),
        call("a"),
        st(Else, 1),
        call("b"),
        en(If, 1),
        call("c"),
    ]);
    assert_eq!(
        edges(&f),
        pairs(&[
            ("S", "a"),
            ("S", "b"),
            ("a", "c"),
            ("b", "c"),
            ("c", "E"),
        ])
    );
}

#[test]
fn if_without_else_keeps_the_bypass() {
    use ControlKind::*;
    let f = flow_of(vec![st(If, 1), call("a"), en(If, 1), call("c")]);
    assert_eq!(
        edges(&f),
        pairs(&[("S", "a"), ("S", "c"), ("a", "c"), ("c", "E")])
    );
}

#[test]
fn while_loop_back_edge_and_exit() {
    use ControlKind::*;
    let f = flow_of(vec![
        st(WhileCondition, 1),
        anchor(0),
        call("p"),
        en(WhileCondition, 1),
        st(While, 1),
        call("q"),
        en(While, 1),
        call("r"),
    ]);
    assert_eq!(
        edges(&f),
        pairs(&[
            ("S", "p"),
            ("p", "q"),
            ("q", "p"),
            ("p", "r"),
            ("r", "E"),
        ])
    );
}

#[test]
fn empty_condition_loop_may_be_skipped() {
    use ControlKind::*;
    let f = flow_of(vec![
        st(WhileCondition, 1),
        anchor(0),
        en(WhileCondition, 1),
        st(While, 1),
        call("q"),
        en(While, 1),
        call("r"),
    ]);
    assert_eq!(
        edges(&f),
        pairs(&[
            ("S", "q"),
            ("q", "q"),
            ("q", "r"),
            ("S", "r"),
            ("r", "E"),
        ])
    );
}

#[test]
fn switch_fallthrough_break_and_default() {
    use ControlKind::*;
    let f = flow_of(vec![
        st(Switch, 1),
        st(Case, 1),
        call("a"),
        st(Case, 1),
        call("b"),
        en(Break, 1),
        st(Default, 1),
        call("c"),
        en(Switch, 1),
        call("d"),
    ]);
    assert_eq!(
        edges(&f),
        pairs(&[
            ("S", "a"),
            ("S", "b"),
            ("a", "b"),
            ("S", "c"),
            ("b", "d"),
            ("c", "d"),
            ("d", "E"),
        ])
    );
}

#[test]
fn early_return_splits_the_exit() {
    use ControlKind::*;
    let f = flow_of(vec![
        st(If, 1),
        call("a"),
        en(Return, 1),
        en(If, 1),
        call("b"),
    ]);
    assert_eq!(
        edges(&f),
        pairs(&[("S", "a"), ("a", "E"), ("S", "b"), ("b", "E")])
    );
}

#[test]
fn do_while_body_precedes_condition() {
    use ControlKind::*;
    let f = flow_of(vec![
        st(DoWhile, 1),
        anchor(0),
        call("q"),
        st(DoWhileCondition, 1),
        call("p"),
        en(DoWhile, 1),
        call("r"),
    ]);
    assert_eq!(
        edges(&f),
        pairs(&[
            ("S", "q"),
            ("q", "p"),
            ("p", "q"),
            ("p", "r"),
            ("r", "E"),
        ])
    );
}

#[test]
fn for_loop_routes_through_both_header_clauses() {
    use ControlKind::*;
    let f = flow_of(vec![
        st(ForCondition1, 1),
        anchor(0),
        call("p"),
        en(ForCondition1, 1),
        st(ForCondition2, 1),
        call("step"),
        en(ForCondition2, 1),
        st(For, 1),
        call("q"),
        en(For, 1),
        call("r"),
    ]);
    assert_eq!(
        edges(&f),
        pairs(&[
            ("S", "p"),
            ("p", "q"),
            ("q", "step"),
            ("step", "p"),
            ("p", "r"),
            ("r", "E"),
        ])
    );
}

#[test]
fn break_skips_the_back_edge() {
    use ControlKind::*;
    let f = flow_of(vec![
        st(WhileCondition, 1),
        anchor(0),
        en(WhileCondition, 1),
        st(While, 1),
        call("q"),
        en(Break, 1),
        en(While, 1),
        call("r"),
    ]);
    assert_eq!(
        edges(&f),
        pairs(&[("S", "q"), ("q", "r"), ("S", "r"), ("r", "E")])
    );
}

#[test]
fn continue_loops_back_to_the_condition() {
    use ControlKind::*;
    // while (p()) { if (x) { a(); continue; } b(); } r();
    let f = flow_of(vec![
        st(WhileCondition, 1),
        anchor(0),
        call("p"),
        en(WhileCondition, 1),
        st(While, 1),
        st(If, 1),
        call("a"),
        en(Continue, 1),
        en(If, 1),
        call("b"),
        en(While, 1),
        call("r"),
    ]);
    let e = edges(&f);
    assert!(e.contains(&("a".to_string(), "p".to_string())), "continue re-enters the condition: {e:?}");
    assert!(e.contains(&("b".to_string(), "p".to_string())));
    assert!(e.contains(&("p".to_string(), "a".to_string())));
    assert!(e.contains(&("p".to_string(), "r".to_string())));
}

#[test]
fn all_branches_returning_terminate_the_region() {
    use ControlKind::*;
    // if (x) { a(); return; } else { b(); return; } c();  (c is dead)
    let f = flow_of(vec![
        st(If, 1),
        call("a"),
        en(Return, 1),
        st(Else, 1),
        call("b"),
        en(Return, 1),
        en(If, 1),
        call("c"),
    ]);
    let e = edges(&f);
    assert!(e.contains(&("a".to_string(), "E".to_string())));
    assert!(e.contains(&("b".to_string(), "E".to_string())));
    assert!(!e.iter().any(|(_, b)| b == "c"), "dead code got linked: {e:?}");
}

#[test]
fn no_calls_yields_direct_start_to_end() {
    let f = flow_of(vec![]);
    assert!(f.has_direct_start_end());
}

#[test]
fn break_outside_loop_is_a_structure_error() {
    use ControlKind::*;
    let fe = FunctionEvents {
        name: "f".into(),
        events: vec![en(Break, 1)],
    };
    let err = build_function(&fe, &HashSet::new()).unwrap_err();
    assert!(matches!(err, CwError::ParseStructure { .. }));
}

#[test]
fn return_directly_in_a_loop_is_rejected() {
    use ControlKind::*;
    let fe = FunctionEvents {
        name: "f".into(),
        events: vec![
            st(WhileCondition, 1),
            anchor(0),
            en(WhileCondition, 1),
            st(While, 1),
            en(Return, 1),
            en(While, 1),
        ],
    };
    let err = build_function(&fe, &HashSet::new()).unwrap_err();
    assert!(matches!(err, CwError::ParseStructure { .. }));
}

#[test]
fn skipped_callees_are_transparent() {
    let fe = FunctionEvents {
        name: "f".into(),
        events: vec![call("a"), call("u"), call("b")],
    };
    let skips: HashSet<String> = ["u".to_string()].into();
    let f = build_function(&fe, &skips).unwrap();
    assert_eq!(
        edges(&f),
        pairs(&[("S", "a"), ("a", "b"), ("b", "E")])
    );
}

#[test]
fn nested_if_frontier_flows_outward() {
    use ControlKind::*;
    // if (p) { if (a) x(); } z();
    let f = flow_of(vec![
        st(If, 1),
        st(If, 2),
        call("x"),
        en(If, 2),
        en(If, 1),
        call("z"),
    ]);
    assert_eq!(
        edges(&f),
        pairs(&[("S", "x"), ("x", "z"), ("S", "z"), ("z", "E")])
    );
}

#[test]
fn may_abstain_powerset_adds_optional_edges() {
    use ControlKind::*;
    // u() { if (x) a(); } may run without any external call
    // f() { b(); u(); c(); }
    let extraction = Extraction {
        functions: vec![
            FunctionEvents {
                name: "u".into(),
                events: vec![st(If, 1), call("a"), en(If, 1)],
            },
            FunctionEvents {
                name: "f".into(),
                events: vec![call("b"), call("u"), call("c")],
            },
        ],
    };
    let flows = build_all(&extraction, &HashSet::new(), 8).unwrap();
    let f = flows.iter().find(|g| g.name == "f").unwrap();
    let e = edges(f);
    assert!(e.contains(&("b".to_string(), "u".to_string())));
    assert!(e.contains(&("u".to_string(), "c".to_string())));
    // replay with u abstaining adds the bypass
    assert!(e.contains(&("b".to_string(), "c".to_string())), "{e:?}");
}

#[test]
fn never_calls_functions_reduce_to_start_end() {
    let extraction = Extraction {
        functions: vec![FunctionEvents {
            name: "quiet".into(),
            events: vec![call("helper")],
        }],
    };
    let never: HashSet<String> = ["quiet".to_string()].into();
    let flows = build_all(&extraction, &never, 8).unwrap();
    assert!(flows[0].has_direct_start_end());
    assert_eq!(flows[0].graph.node_count(), 2);
}
