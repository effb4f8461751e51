//! Topological ordering of named nodes with string dependency lists.
//!
//! Two unrelated orderings reuse this: struct definitions must be emitted
//! before they are used by value in the C output, and modules must be parsed
//! before their importers. Cycles are illegal in both uses.

/// One node in the graph. `last_cycle` is filled in by [`DepGraph::resolve`]
/// when the node participates in a cycle, naming the dependency that closes
/// it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepNode {
    pub name: String,
    pub deps: Vec<String>,
    pub last_cycle: Option<String>,
}

/// A dependency graph resolved with Kahn's algorithm.
#[derive(Debug, Default)]
pub struct DepGraph {
    pub acyclic: bool,
    pub nodes: Vec<DepNode>,
}

impl DepGraph {
    pub fn new() -> DepGraph {
        DepGraph {
            acyclic: true,
            nodes: Vec::new(),
        }
    }

    pub fn add(&mut self, name: &str, deps: &[String]) {
        self.nodes.push(DepNode {
            name: name.to_string(),
            deps: deps.to_vec(),
            last_cycle: None,
        });
    }

    /// Kahn's algorithm: repeatedly take the nodes whose remaining
    /// dependency set is empty, append them, and remove them from all other
    /// dependency sets. The ready subset is taken in lexicographic name
    /// order at every step so the resulting order (and therefore the emitted
    /// output) is reproducible across runs.
    ///
    /// If the ready subset is ever empty while nodes remain, the graph is
    /// cyclic: `acyclic` is cleared and one remaining node is annotated with
    /// the dependency that keeps it stuck.
    pub fn resolve(mut self) -> DepGraph {
        let mut resolved = DepGraph::new();
        let known: Vec<String> = self.nodes.iter().map(|n| n.name.clone()).collect();

        // Dependencies on names outside the graph cannot be waited for.
        for node in &mut self.nodes {
            node.deps.retain(|d| known.contains(d) && *d != node.name);
        }

        while !self.nodes.is_empty() {
            let ready: Vec<usize> = self
                .nodes
                .iter()
                .enumerate()
                .filter(|(_, n)| n.deps.is_empty())
                .map(|(i, _)| i)
                .collect();
            if ready.is_empty() {
                resolved.acyclic = false;
                self.nodes.sort_by(|a, b| a.name.cmp(&b.name));
                for mut node in self.nodes {
                    node.last_cycle = node.deps.first().cloned();
                    resolved.nodes.push(node);
                }
                return resolved;
            }
            // `ready` is ascending, so removal must walk it backwards.
            let mut taken = Vec::new();
            for &i in ready.iter().rev() {
                taken.push(self.nodes.remove(i));
            }
            taken.sort_by(|a, b| a.name.cmp(&b.name));
            for node in taken {
                for rest in &mut self.nodes {
                    rest.deps.retain(|d| *d != node.name);
                }
                resolved.nodes.push(node);
            }
        }
        resolved
    }

    /// Ordered node names, for callers that only need the sequence.
    pub fn order(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    /// Human-readable description of one detected cycle edge.
    pub fn display_cycle(&self) -> String {
        for node in &self.nodes {
            if let Some(dep) = &node.last_cycle {
                return format!("`{}` depends on `{}` which depends back on it", node.name, dep);
            }
        }
        "dependency cycle detected".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn orders_dependencies_before_dependents() {
        let edges: &[(&str, &[&str])] = &[
            ("renderer", &["geometry", "color"]),
            ("color", &[]),
            ("geometry", &["color"]),
            ("app", &["renderer"]),
        ];
        let mut graph = DepGraph::new();
        for (name, deps) in edges {
            graph.add(name, &strs(deps));
        }
        let resolved = graph.resolve();
        assert!(resolved.acyclic);

        let order = resolved.order();
        for (name, deps) in edges {
            let pos = order.iter().position(|n| n == name).unwrap();
            for dep in *deps {
                let dep_pos = order.iter().position(|n| n == dep).unwrap();
                assert!(dep_pos < pos, "{dep} should precede {name}");
            }
        }
    }

    #[test]
    fn ready_subset_is_lexicographic() {
        let mut graph = DepGraph::new();
        graph.add("zeta", &[]);
        graph.add("alpha", &[]);
        graph.add("mid", &strs(&["zeta"]));
        let resolved = graph.resolve();
        assert_eq!(resolved.order(), vec!["alpha", "zeta", "mid"]);
    }

    #[test]
    fn detects_cycle_and_names_an_edge() {
        let mut graph = DepGraph::new();
        graph.add("a", &strs(&["b"]));
        graph.add("b", &strs(&["a"]));
        graph.add("free", &[]);
        let resolved = graph.resolve();
        assert!(!resolved.acyclic);
        let cycle = resolved.display_cycle();
        assert!(
            cycle.contains("`a`") || cycle.contains("`b`"),
            "cycle edge not named: {cycle}"
        );
    }

    #[test]
    fn ignores_dependencies_on_unknown_names() {
        let mut graph = DepGraph::new();
        graph.add("only", &strs(&["builtin_not_in_graph"]));
        let resolved = graph.resolve();
        assert!(resolved.acyclic);
        assert_eq!(resolved.order(), vec!["only"]);
    }

    #[test]
    fn self_dependency_does_not_cycle() {
        // Self edges are dropped here; the struct-graph builder screens
        // by-value self-containment before resolving.
        let mut graph = DepGraph::new();
        graph.add("node", &strs(&["node"]));
        let resolved = graph.resolve();
        assert!(resolved.acyclic);
    }
}
