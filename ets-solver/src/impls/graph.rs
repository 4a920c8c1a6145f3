use crate::{Map, Set};
use ets_core::{
    models::{DerivativeBlock, ShapeError, VariableId},
    ports::{GradientQuery, LocalSensitivities, Partial},
};
use petgraph::{
    Direction,
    algo::{has_path_connecting, toposort},
    graph::{DiGraph, NodeIndex},
    visit::{Dfs, EdgeRef, Reversed},
};

#[derive(Clone, Debug)]
struct Node {
    id: VariableId,
    dim: usize,
}

/// The dependency graph of one evaluation, answering total-derivative requests.
///
/// Nodes are variables with a fixed dimension; an edge `input → output`
/// carries the local block `d(output)/d(input)`. The total derivative of a
/// pair is the sum over every directed path of the product of its blocks,
/// accumulated forward in topological order over the nodes lying on such a
/// path.
///
/// The graph is built once per evaluation and discarded afterwards; nothing
/// is cached between requests.
#[derive(Clone, Debug, Default)]
pub struct SensitivityGraph {
    graph: DiGraph<Node, DerivativeBlock>,
    nodes: Map<VariableId, NodeIndex>,
}

impl SensitivityGraph {
    /// An empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare one partial derivative.
    ///
    /// Declaring the same pair twice sums the two blocks.
    pub fn declare(&mut self, partial: Partial) -> Result<(), SensitivityError> {
        let Partial {
            output,
            input,
            block,
        } = partial;
        let (rows, cols) = block.shape();
        self.check_dimension(&output, rows)?;
        self.check_dimension(&input, cols)?;

        if output == input {
            return Err(SensitivityError::Cycle { output, input });
        }
        if let (Some(&out), Some(&inp)) = (self.nodes.get(&output), self.nodes.get(&input))
            && has_path_connecting(&self.graph, out, inp, None)
        {
            return Err(SensitivityError::Cycle { output, input });
        }

        let out = self.node(output, rows);
        let inp = self.node(input, cols);
        match self.graph.find_edge(inp, out) {
            Some(edge) => {
                let existing = &mut self.graph[edge];
                *existing = existing.add(&block)?;
            }
            None => {
                self.graph.add_edge(inp, out, block);
            }
        }
        Ok(())
    }

    /// Declare every partial of a component
    pub fn extend(&mut self, component: &impl LocalSensitivities) -> Result<(), SensitivityError> {
        for partial in component.partials() {
            self.declare(partial)?;
        }
        Ok(())
    }

    /// The dimension of `variable`, if known
    pub fn dimension(&self, variable: &VariableId) -> Option<usize> {
        self.nodes
            .get(variable)
            .map(|&index| self.graph[index].dim)
    }

    /// Whether `variable` appears in a declared partial
    pub fn contains(&self, variable: &VariableId) -> bool {
        self.nodes.contains_key(variable)
    }

    /// Number of variables
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of declared (output, input) pairs
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// The local block declared for `(output, input)`, if any
    pub fn partial(&self, output: &VariableId, input: &VariableId) -> Option<&DerivativeBlock> {
        let out = *self.nodes.get(output)?;
        let inp = *self.nodes.get(input)?;
        self.graph.find_edge(inp, out).map(|edge| &self.graph[edge])
    }

    fn check_dimension(&self, variable: &VariableId, actual: usize) -> Result<(), SensitivityError> {
        match self.dimension(variable) {
            Some(expected) if expected != actual => Err(SensitivityError::Shape {
                variable: variable.clone(),
                expected,
                actual,
            }),
            _ => Ok(()),
        }
    }

    fn node(&mut self, id: VariableId, dim: usize) -> NodeIndex {
        if let Some(&index) = self.nodes.get(&id) {
            return index;
        }
        let index = self.graph.add_node(Node { id: id.clone(), dim });
        self.nodes.insert(id, index);
        index
    }

    fn index(&self, variable: &VariableId) -> Result<NodeIndex, SensitivityError> {
        self.nodes
            .get(variable)
            .copied()
            .ok_or_else(|| SensitivityError::UnknownVariable(variable.clone()))
    }

    // The nodes reachable from `input` that also reach `output`
    fn nodes_between(&self, input: NodeIndex, output: NodeIndex) -> Set<NodeIndex> {
        let mut downstream = Set::default();
        let mut dfs = Dfs::new(&self.graph, input);
        while let Some(index) = dfs.next(&self.graph) {
            downstream.insert(index);
        }

        let reversed = Reversed(&self.graph);
        let mut between = Set::default();
        let mut dfs = Dfs::new(reversed, output);
        while let Some(index) = dfs.next(reversed) {
            if downstream.contains(&index) {
                between.insert(index);
            }
        }
        between
    }
}

impl GradientQuery for SensitivityGraph {
    type Error = SensitivityError;

    fn gradient(
        &self,
        output: &VariableId,
        input: &VariableId,
    ) -> Result<DerivativeBlock, Self::Error> {
        let out = self.index(output)?;
        let inp = self.index(input)?;
        let (rows, cols) = (self.graph[out].dim, self.graph[inp].dim);

        if out == inp {
            return Ok(DerivativeBlock::identity(cols));
        }

        let between = self.nodes_between(inp, out);
        if !between.contains(&out) {
            return Ok(DerivativeBlock::zero(rows, cols));
        }

        let order = toposort(&self.graph, None).map_err(|cycle| {
            let id = self.graph[cycle.node_id()].id.clone();
            SensitivityError::Cycle {
                output: id.clone(),
                input: id,
            }
        })?;

        // d(node)/d(input) for every node already visited
        let mut totals: Map<NodeIndex, DerivativeBlock> = Map::default();
        totals.insert(inp, DerivativeBlock::identity(cols));

        for index in order {
            if index == inp || !between.contains(&index) {
                continue;
            }
            let mut total = DerivativeBlock::zero(self.graph[index].dim, cols);
            for edge in self.graph.edges_directed(index, Direction::Incoming) {
                if let Some(upstream) = totals.get(&edge.source()) {
                    total = total.add(&edge.weight().compose(upstream)?)?;
                }
            }
            if index == out {
                return Ok(total);
            }
            totals.insert(index, total);
        }

        Ok(DerivativeBlock::zero(rows, cols))
    }
}

/// Errors raised while declaring partials or answering requests
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SensitivityError {
    /// The requested variable never appeared in a declared partial
    #[error("unknown variable {0}")]
    UnknownVariable(VariableId),
    /// The declared partial would close a dependency cycle
    #[error("d({output})/d({input}) closes a dependency cycle")]
    Cycle {
        /// The output of the rejected partial
        output: VariableId,
        /// The input of the rejected partial
        input: VariableId,
    },
    /// A block disagrees with the dimension already known for a variable
    #[error("{variable} has dimension {expected}, got a block implying {actual}")]
    Shape {
        /// The variable with inconsistent dimensions
        variable: VariableId,
        /// The dimension declared first
        expected: usize,
        /// The dimension implied by the new block
        actual: usize,
    },
    /// Two blocks could not be combined
    #[error(transparent)]
    Block(#[from] ShapeError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ets_core::models::QuantityName;

    fn var(name: &str) -> VariableId {
        VariableId::External(QuantityName::from(name))
    }

    fn declare(graph: &mut SensitivityGraph, output: &str, input: &str, block: DerivativeBlock) {
        graph.declare(Partial::new(var(output), var(input), block)).unwrap();
    }

    #[test]
    fn test_chain() {
        let mut graph = SensitivityGraph::new();
        declare(&mut graph, "y", "x", DerivativeBlock::diagonal(vec![2.0, 3.0]));
        declare(&mut graph, "z", "y", DerivativeBlock::row(vec![1.0, -1.0]));

        let dz_dx = graph.gradient(&var("z"), &var("x")).unwrap();
        assert_eq!(dz_dx.shape(), (1, 2));
        assert_abs_diff_eq!(dz_dx.get(0, 0), 2.0);
        assert_abs_diff_eq!(dz_dx.get(0, 1), -3.0);
    }

    #[test]
    fn test_paths_are_summed() {
        // z = 2y + 5x, y = 3x
        let mut graph = SensitivityGraph::new();
        declare(&mut graph, "y", "x", DerivativeBlock::scalar(3.0));
        declare(&mut graph, "z", "y", DerivativeBlock::scalar(2.0));
        declare(&mut graph, "z", "x", DerivativeBlock::scalar(5.0));

        let dz_dx = graph.gradient(&var("z"), &var("x")).unwrap();
        assert_abs_diff_eq!(dz_dx.get(0, 0), 11.0);
    }

    #[test]
    fn test_nodes_off_the_path_are_ignored() {
        let mut graph = SensitivityGraph::new();
        declare(&mut graph, "y", "x", DerivativeBlock::scalar(3.0));
        declare(&mut graph, "z", "y", DerivativeBlock::scalar(2.0));
        declare(&mut graph, "z", "w", DerivativeBlock::scalar(7.0));
        declare(&mut graph, "v", "x", DerivativeBlock::scalar(9.0));

        assert_abs_diff_eq!(graph.gradient(&var("z"), &var("x")).unwrap().get(0, 0), 6.0);
    }

    #[test]
    fn test_identity_and_no_path() {
        let mut graph = SensitivityGraph::new();
        declare(&mut graph, "y", "x", DerivativeBlock::row(vec![1.0, 1.0, 1.0]));
        declare(&mut graph, "z", "w", DerivativeBlock::scalar(1.0));

        assert_eq!(
            graph.gradient(&var("x"), &var("x")).unwrap(),
            DerivativeBlock::identity(3)
        );
        assert_eq!(
            graph.gradient(&var("z"), &var("x")).unwrap(),
            DerivativeBlock::zero(1, 3)
        );
        // against the direction of the edges
        assert_eq!(
            graph.gradient(&var("x"), &var("y")).unwrap(),
            DerivativeBlock::zero(3, 1)
        );
    }

    #[test]
    fn test_unknown_variable() {
        let mut graph = SensitivityGraph::new();
        declare(&mut graph, "y", "x", DerivativeBlock::scalar(1.0));
        assert_eq!(
            graph.gradient(&var("y"), &var("q")).unwrap_err(),
            SensitivityError::UnknownVariable(var("q"))
        );
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut graph = SensitivityGraph::new();
        declare(&mut graph, "y", "x", DerivativeBlock::scalar(1.0));
        declare(&mut graph, "z", "y", DerivativeBlock::scalar(1.0));

        let err = graph
            .declare(Partial::new(var("x"), var("z"), DerivativeBlock::scalar(1.0)))
            .unwrap_err();
        assert_eq!(
            err,
            SensitivityError::Cycle {
                output: var("x"),
                input: var("z")
            }
        );
        assert!(graph
            .declare(Partial::new(var("x"), var("x"), DerivativeBlock::scalar(1.0)))
            .is_err());
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_inconsistent_dimension() {
        let mut graph = SensitivityGraph::new();
        declare(&mut graph, "y", "x", DerivativeBlock::identity(3));
        let err = graph
            .declare(Partial::new(var("z"), var("x"), DerivativeBlock::identity(4)))
            .unwrap_err();
        assert_eq!(
            err,
            SensitivityError::Shape {
                variable: var("x"),
                expected: 3,
                actual: 4
            }
        );
        assert!(!graph.contains(&var("z")));
    }

    #[test]
    fn test_duplicate_pairs_accumulate() {
        let mut graph = SensitivityGraph::new();
        declare(&mut graph, "y", "x", DerivativeBlock::diagonal(vec![1.0, 2.0]));
        declare(&mut graph, "y", "x", DerivativeBlock::diagonal(vec![0.5, 0.5]));

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(
            graph.partial(&var("y"), &var("x")),
            Some(&DerivativeBlock::diagonal(vec![1.5, 2.5]))
        );
    }

    #[test]
    fn test_queries_do_not_alter_the_graph() {
        let mut graph = SensitivityGraph::new();
        declare(&mut graph, "y", "x", DerivativeBlock::scalar(3.0));
        declare(&mut graph, "z", "y", DerivativeBlock::scalar(2.0));

        let first = graph.gradient(&var("z"), &var("x")).unwrap();
        let second = graph.gradient(&var("z"), &var("x")).unwrap();
        assert_eq!(first, second);
        assert_eq!(graph.partial(&var("y"), &var("x")), Some(&DerivativeBlock::scalar(3.0)));
    }
}
