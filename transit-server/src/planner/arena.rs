//! Per-search node storage.
//!
//! Predecessor links are indices into the arena, so replacing a node's
//! open-set entry during relaxation never invalidates a path being built
//! through an older node.

use crate::domain::{LineId, StopId};
use crate::graph::Edge;
use crate::incidents::EdgeDelay;

/// Index of a node in its [`NodeArena`].
pub type NodeIndex = usize;

/// A search label: a stop reached via a particular edge.
#[derive(Debug, Clone)]
pub struct PathNode {
    pub stop: StopId,
    /// Accumulated cost, including preference penalties.
    pub g_score: u32,
    pub predecessor: Option<NodeIndex>,
    /// Edge travelled to get here, with its effective minutes and delay.
    pub via: Option<Via>,
}

/// How a node was reached.
#[derive(Debug, Clone)]
pub struct Via {
    pub edge: Edge,
    pub minutes: u32,
    pub delay: Option<EdgeDelay>,
}

impl PathNode {
    pub fn line(&self) -> Option<&LineId> {
        self.via.as_ref().map(|v| &v.edge.line_id)
    }
}

/// Append-only node storage owned by one search call.
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: Vec<PathNode>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: PathNode) -> NodeIndex {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn get(&self, index: NodeIndex) -> &PathNode {
        &self.nodes[index]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Iterate from `index` back to the start node.
    pub fn chain(&self, index: NodeIndex) -> impl Iterator<Item = &PathNode> {
        std::iter::successors(Some(&self.nodes[index]), |n| n.predecessor.map(|p| &self.nodes[p]))
    }

    /// Number of line changes on the path ending at `index`.
    pub fn transfers(&self, index: NodeIndex) -> usize {
        let lines: Vec<&LineId> = self.chain(index).filter_map(PathNode::line).collect();
        lines.windows(2).filter(|w| w[0] != w[1]).count()
    }

    /// Whether `stop` is already on the path ending at `index`.
    pub fn visits(&self, index: NodeIndex, stop: &StopId) -> bool {
        self.chain(index).any(|n| &n.stop == stop)
    }

    /// Nodes from the start to `index`, in travel order.
    pub fn path_to(&self, index: NodeIndex) -> Vec<&PathNode> {
        let mut path: Vec<&PathNode> = self.chain(index).collect();
        path.reverse();
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RouteId, TransportType};

    fn node(stop: &str, line: Option<&str>, predecessor: Option<NodeIndex>) -> PathNode {
        PathNode {
            stop: StopId::parse(stop).unwrap(),
            g_score: 0,
            predecessor,
            via: line.map(|l| Via {
                edge: Edge {
                    to: StopId::parse(stop).unwrap(),
                    route_id: RouteId::parse("R").unwrap(),
                    line_id: LineId::parse(l).unwrap(),
                    line_name: l.to_string(),
                    transport: TransportType::Bus,
                    base_minutes: 3,
                },
                minutes: 3,
                delay: None,
            }),
        }
    }

    #[test]
    fn chain_walks_back_to_start() {
        let mut arena = NodeArena::new();
        let a = arena.push(node("A", None, None));
        let b = arena.push(node("B", Some("L1"), Some(a)));
        let c = arena.push(node("C", Some("L1"), Some(b)));
        let d = arena.push(node("D", Some("L2"), Some(c)));
        let e = arena.push(node("E", Some("L1"), Some(d)));

        let stops: Vec<&str> = arena.path_to(e).iter().map(|n| n.stop.as_str()).collect();
        assert_eq!(stops, ["A", "B", "C", "D", "E"]);

        assert_eq!(arena.transfers(a), 0);
        assert_eq!(arena.transfers(c), 0);
        assert_eq!(arena.transfers(d), 1);
        assert_eq!(arena.transfers(e), 2);

        assert!(arena.visits(e, &StopId::parse("B").unwrap()));
        assert!(!arena.visits(c, &StopId::parse("D").unwrap()));
    }

    #[test]
    fn replaced_nodes_do_not_disturb_existing_paths() {
        let mut arena = NodeArena::new();
        let a = arena.push(node("A", None, None));
        let b1 = arena.push(node("B", Some("L1"), Some(a)));
        let c = arena.push(node("C", Some("L1"), Some(b1)));
        // A better label for B arrives later; C's path still goes through b1
        let _b2 = arena.push(node("B", Some("L2"), Some(a)));

        assert_eq!(arena.len(), 4);
        assert_eq!(arena.transfers(c), 0);
    }
}
