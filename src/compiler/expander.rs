use crate::dsl::{Branch, Edge, Node, NodeType, Process};
use anyhow::{Result, bail};

/// Rewrites authoring sugar into plain nodes and edges before compilation.
pub struct Expander;

impl Default for Expander {
    fn default() -> Self {
        Self::new()
    }
}

impl Expander {
    pub fn new() -> Self {
        Self
    }

    pub fn expand(&self, process: Process) -> Result<Process> {
        let (nodes, edges) = self.expand_graph(process.nodes, process.edges)?;
        Ok(Process { nodes, edges, ..process })
    }

    /// 并行块 -> split/join 网关
    ///
    /// Branch nodes may themselves be blocks, so they go back on the worklist.
    fn expand_graph(&self, nodes: Vec<Node>, edges: Vec<Edge>) -> Result<(Vec<Node>, Vec<Edge>)> {
        let mut new_nodes = Vec::new();
        let mut new_edges = edges;
        let mut worklist = nodes;
        worklist.reverse();

        while let Some(mut node) = worklist.pop() {
            match node.kind {
                NodeType::ParallelBlock { branches } => {
                    let branch_nodes = self.expand_parallel(&node.id, branches, &mut new_nodes, &mut new_edges)?;
                    worklist.extend(branch_nodes.into_iter().rev());
                }
                NodeType::SubProcess { nodes, edges } => {
                    let (nodes, edges) = self.expand_graph(nodes, edges)?;
                    node.kind = NodeType::SubProcess { nodes, edges };
                    new_nodes.push(node);
                }
                NodeType::Transaction { nodes, edges } => {
                    let (nodes, edges) = self.expand_graph(nodes, edges)?;
                    node.kind = NodeType::Transaction { nodes, edges };
                    new_nodes.push(node);
                }
                kind => {
                    node.kind = kind;
                    new_nodes.push(node);
                }
            }
        }
        Ok((new_nodes, new_edges))
    }

    /// Emits the gateways and edges for one block and returns the branch
    /// nodes still to be expanded.
    fn expand_parallel(
        &self,
        block_id: &str,
        branches: Vec<Branch>,
        new_nodes: &mut Vec<Node>,
        new_edges: &mut Vec<Edge>,
    ) -> Result<Vec<Node>> {
        let split_id = format!("{}_split", block_id);
        let join_id = format!("{}_join", block_id);
        let mut pending = Vec::new();

        for branch in branches.into_iter().filter(|b| !b.nodes.is_empty()) {
            // 分支内节点线性连接
            for pair in branch.nodes.windows(2) {
                new_edges.push(Edge::new(&pair[0].id, &pair[1].id));
            }
            let head = &branch.nodes[0].id;
            let tail = &branch.nodes[branch.nodes.len() - 1].id;
            new_edges.push(Edge::new(&split_id, head));
            new_edges.push(Edge::new(tail, &join_id));
            pending.extend(branch.nodes);
        }
        if pending.is_empty() {
            bail!("Parallel block '{}' has no non-empty branch", block_id);
        }

        new_nodes.push(Node::new(&split_id, NodeType::ParallelGateway));
        new_nodes.push(Node::new(&join_id, NodeType::ParallelGateway));

        // 外部边: 指向块的改指 split, 从块出发的改由 join 出发
        for edge in new_edges.iter_mut() {
            if edge.target == block_id {
                edge.target = split_id.clone();
            }
            if edge.source == block_id {
                edge.source = join_id.clone();
            }
        }
        Ok(pending)
    }
}
