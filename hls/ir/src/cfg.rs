use crate::{Function, InstrIdx, Opcode};
use hls_utils::IndexRef;
use petgraph::{
    graph::{DiGraph, NodeIndex},
    visit::{DfsEvent, depth_first_search},
};
use std::{
    cmp::Reverse,
    collections::{BTreeSet, BinaryHeap, HashSet},
    ops::Range,
};

/// A maximal straight-line run of instructions.
#[derive(Clone, Debug)]
pub struct BasicBlock {
    pub index: usize,
    /// Positions of the instructions in the function.
    pub range: Range<usize>,
    pub succs: Vec<usize>,
    pub preds: Vec<usize>,
}

impl BasicBlock {
    pub fn contains(&self, instr: InstrIdx) -> bool {
        self.range.contains(&instr.index())
    }

    pub fn instrs(&self) -> impl Iterator<Item = InstrIdx> + '_ {
        self.range.clone().map(InstrIdx::new)
    }

    pub fn last(&self) -> InstrIdx {
        InstrIdx::new(self.range.end - 1)
    }
}

/// Control-flow graph over the instructions of a [Function].
pub struct ControlFlowGraph {
    blocks: Vec<BasicBlock>,
    block_of: Vec<usize>,
    back_edges: HashSet<(usize, usize)>,
    order: Vec<usize>,
}

impl ControlFlowGraph {
    pub fn build(func: &Function) -> Self {
        let n = func.len();
        let mut leaders = BTreeSet::from([0]);
        for instr in func.iter() {
            if let Some(target) = instr.opcode.branch_target() {
                leaders.insert(target.index());
                if instr.index.index() + 1 < n {
                    leaders.insert(instr.index.index() + 1);
                }
            }
        }
        let starts: Vec<usize> = leaders.into_iter().filter(|s| *s < n).collect();

        let mut block_of = vec![0; n];
        let mut blocks = Vec::with_capacity(starts.len());
        for (b, &start) in starts.iter().enumerate() {
            let end = starts.get(b + 1).copied().unwrap_or(n);
            block_of[start..end].fill(b);
            blocks.push(BasicBlock {
                index: b,
                range: start..end,
                succs: Vec::new(),
                preds: Vec::new(),
            });
        }

        for b in 0..blocks.len() {
            let end = blocks[b].range.end;
            let fallthrough = (end < n).then(|| block_of[end]);
            let succs: Vec<usize> = match &func.instrs[end - 1].opcode {
                Opcode::Goto(t) => vec![block_of[t.index()]],
                Opcode::BranchIfTrue(t) | Opcode::BranchIfFalse(t) => {
                    let mut succs = vec![block_of[t.index()]];
                    succs.extend(fallthrough.filter(|f| !succs.contains(f)));
                    succs
                }
                _ => fallthrough.into_iter().collect(),
            };
            for s in &succs {
                blocks[*s].preds.push(b);
            }
            blocks[b].succs = succs;
        }

        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        for b in &blocks {
            graph.add_node(b.index);
        }
        for b in &blocks {
            for s in &b.succs {
                graph.add_edge(NodeIndex::new(b.index), NodeIndex::new(*s), ());
            }
        }
        let mut back_edges = HashSet::new();
        depth_first_search(&graph, graph.node_indices(), |event| {
            if let DfsEvent::BackEdge(u, v) = event {
                back_edges.insert((u.index(), v.index()));
            }
        });

        let order = Self::forward_order(&blocks, &back_edges);
        log::debug!(
            "{}: {} basic blocks, {} back edges",
            func.name,
            blocks.len(),
            back_edges.len()
        );
        Self {
            blocks,
            block_of,
            back_edges,
            order,
        }
    }

    /// Topological order of the blocks once back edges are removed. Among the
    /// blocks ready at the same time, program order wins.
    fn forward_order(
        blocks: &[BasicBlock],
        back_edges: &HashSet<(usize, usize)>,
    ) -> Vec<usize> {
        let mut pending: Vec<usize> = blocks
            .iter()
            .map(|b| {
                b.preds
                    .iter()
                    .filter(|p| !back_edges.contains(&(**p, b.index)))
                    .count()
            })
            .collect();
        let mut ready: BinaryHeap<Reverse<usize>> = pending
            .iter()
            .enumerate()
            .filter(|(_, n)| **n == 0)
            .map(|(b, _)| Reverse(b))
            .collect();
        let mut order = Vec::with_capacity(blocks.len());
        while let Some(Reverse(b)) = ready.pop() {
            order.push(b);
            for s in &blocks[b].succs {
                if back_edges.contains(&(b, *s)) {
                    continue;
                }
                pending[*s] -= 1;
                if pending[*s] == 0 {
                    ready.push(Reverse(*s));
                }
            }
        }
        order
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn block(&self, b: usize) -> &BasicBlock {
        &self.blocks[b]
    }

    pub fn block_of(&self, instr: InstrIdx) -> usize {
        self.block_of[instr.index()]
    }

    /// Blocks in the order they are scheduled.
    pub fn schedule_order(&self) -> &[usize] {
        &self.order
    }

    pub fn is_back_edge(&self, from: usize, to: usize) -> bool {
        self.back_edges.contains(&(from, to))
    }

    pub fn num_back_edges(&self) -> usize {
        self.back_edges.len()
    }

    /// Predecessors of `b` not reached through a back edge.
    pub fn forward_preds(&self, b: usize) -> impl Iterator<Item = usize> + '_ {
        self.blocks[b]
            .preds
            .iter()
            .copied()
            .filter(move |p| !self.is_back_edge(*p, b))
    }
}
