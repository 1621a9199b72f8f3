//! The task registry.
//!
//! Tasks are stored as nodes of a `petgraph` graph with an edge from every
//! group to each of its children. Children may be referenced before they are
//! defined; such names stay as placeholder nodes until `define` fills them in,
//! and resolving a task that still reaches a placeholder fails with
//! [`RegistryError::UnknownTask`]. A definition that would close a cycle is
//! rejected up front, so the graph is always a DAG.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use petgraph::Graph;
use petgraph::algo::has_path_connecting;
use petgraph::graph::NodeIndex;

use crate::engine::TaskContext;
use crate::error::RegistryError;

/// Result from a single executed task.
pub type TaskResult<T> = anyhow::Result<T, anyhow::Error>;

/// Body of a leaf task.
pub type TaskFn = Arc<dyn Fn(&TaskContext<'_>) -> TaskResult<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Leaf,
    Series,
    Parallel,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Kind::Leaf => "leaf",
            Kind::Series => "series",
            Kind::Parallel => "parallel",
        })
    }
}

/// What a task does when it runs.
#[derive(Clone)]
pub enum Body {
    Leaf(TaskFn),
    Series(Vec<String>),
    Parallel(Vec<String>),
}

impl Body {
    pub fn leaf<F>(func: F) -> Self
    where
        F: Fn(&TaskContext<'_>) -> TaskResult<()> + Send + Sync + 'static,
    {
        Body::Leaf(Arc::new(func))
    }

    pub fn kind(&self) -> Kind {
        match self {
            Body::Leaf(_) => Kind::Leaf,
            Body::Series(_) => Kind::Series,
            Body::Parallel(_) => Kind::Parallel,
        }
    }

    fn children(&self) -> &[String] {
        match self {
            Body::Leaf(_) => &[],
            Body::Series(children) | Body::Parallel(children) => children,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Leaf(_) => write!(f, "Leaf(*)"),
            Body::Series(children) => f.debug_tuple("Series").field(children).finish(),
            Body::Parallel(children) => f.debug_tuple("Parallel").field(children).finish(),
        }
    }
}

struct Node {
    name: String,
    /// `None` while the name is only referenced by another task.
    body: Option<Body>,
}

/// An executable unit produced by [`Registry::resolve`].
#[derive(Clone)]
pub enum Unit {
    Leaf { name: String, func: TaskFn },
    Series { name: String, children: Vec<Unit> },
    Parallel { name: String, children: Vec<Unit> },
}

impl Unit {
    pub fn name(&self) -> &str {
        match self {
            Unit::Leaf { name, .. } | Unit::Series { name, .. } | Unit::Parallel { name, .. } => {
                name
            }
        }
    }

    pub fn kind(&self) -> Kind {
        match self {
            Unit::Leaf { .. } => Kind::Leaf,
            Unit::Series { .. } => Kind::Series,
            Unit::Parallel { .. } => Kind::Parallel,
        }
    }

    /// Number of leaf invocations a run of this unit performs.
    pub fn leaves(&self) -> usize {
        match self {
            Unit::Leaf { .. } => 1,
            Unit::Series { children, .. } | Unit::Parallel { children, .. } => {
                children.iter().map(Unit::leaves).sum()
            }
        }
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Leaf { name, .. } => write!(f, "Leaf({name})"),
            Unit::Series { name, children } => {
                f.debug_struct("Series").field("name", name).field("children", children).finish()
            }
            Unit::Parallel { name, children } => f
                .debug_struct("Parallel")
                .field("name", name)
                .field("children", children)
                .finish(),
        }
    }
}

/// Named tasks and the edges between groups and their children.
#[derive(Default)]
pub struct Registry {
    graph: Graph<Node, ()>,
    names: HashMap<String, NodeIndex>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task under `name`.
    pub fn define(&mut self, name: impl Into<String>, body: Body) -> Result<(), RegistryError> {
        let name = name.into();

        if let Some(&index) = self.names.get(&name)
            && self.graph[index].body.is_some()
        {
            return Err(RegistryError::DuplicateTask(name));
        }

        // A rejected definition must leave the graph untouched.
        if let Some(&index) = self.names.get(&name) {
            for child in body.children() {
                if let Some(&child) = self.names.get(child)
                    && has_path_connecting(&self.graph, child, index, None)
                {
                    return Err(RegistryError::Cycle(name));
                }
            }
        }
        if body.children().contains(&name) {
            return Err(RegistryError::Cycle(name));
        }

        let index = self.index_of(&name);
        for child in body.children() {
            let child = self.index_of(child);
            self.graph.update_edge(index, child, ());
        }
        self.graph[index].body = Some(body);

        Ok(())
    }

    pub fn leaf<F>(&mut self, name: impl Into<String>, func: F) -> Result<(), RegistryError>
    where
        F: Fn(&TaskContext<'_>) -> TaskResult<()> + Send + Sync + 'static,
    {
        self.define(name, Body::leaf(func))
    }

    pub fn series<I, S>(&mut self, name: impl Into<String>, children: I) -> Result<(), RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let children = children.into_iter().map(Into::into).collect();
        self.define(name, Body::Series(children))
    }

    pub fn parallel<I, S>(
        &mut self,
        name: impl Into<String>,
        children: I,
    ) -> Result<(), RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let children = children.into_iter().map(Into::into).collect();
        self.define(name, Body::Parallel(children))
    }

    /// Returns `true` when `name` has been defined.
    pub fn contains(&self, name: &str) -> bool {
        self.names
            .get(name)
            .is_some_and(|&index| self.graph[index].body.is_some())
    }

    /// Defined tasks in the order they were first named, with their kinds.
    pub fn tasks(&self) -> impl Iterator<Item = (&str, Kind)> {
        self.graph
            .node_weights()
            .filter_map(|node| Some((node.name.as_str(), node.body.as_ref()?.kind())))
    }

    /// Turns `name` into an executable unit.
    pub fn resolve(&self, name: &str) -> Result<Unit, RegistryError> {
        let index = *self
            .names
            .get(name)
            .ok_or_else(|| RegistryError::UnknownTask(name.to_string()))?;

        self.unit(index)
    }

    fn unit(&self, index: NodeIndex) -> Result<Unit, RegistryError> {
        let node = &self.graph[index];
        let body = node
            .body
            .as_ref()
            .ok_or_else(|| RegistryError::UnknownTask(node.name.clone()))?;

        let children = || -> Result<Vec<Unit>, RegistryError> {
            body.children()
                .iter()
                .map(|child| self.resolve(child))
                .collect()
        };

        Ok(match body {
            Body::Leaf(func) => Unit::Leaf {
                name: node.name.clone(),
                func: func.clone(),
            },
            Body::Series(_) => Unit::Series {
                name: node.name.clone(),
                children: children()?,
            },
            Body::Parallel(_) => Unit::Parallel {
                name: node.name.clone(),
                children: children()?,
            },
        })
    }

    fn index_of(&mut self, name: &str) -> NodeIndex {
        if let Some(&index) = self.names.get(name) {
            return index;
        }

        let index = self.graph.add_node(Node {
            name: name.to_string(),
            body: None,
        });
        self.names.insert(name.to_string(), index);
        index
    }
}

/// Renders the task graph as a Mermaid diagram.
impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph LR")?;

        for index in self.graph.node_indices() {
            let node = &self.graph[index];
            let name = node.name.replace('"', "\\\"");
            let kind = match &node.body {
                Some(body) => body.kind().to_string(),
                None => String::from("undefined"),
            };
            writeln!(f, "    {:?}[\"{}\\n{}\"]", index.index(), name, kind)?;
        }

        for edge in self.graph.raw_edges() {
            writeln!(
                f,
                "    {:?} --> {:?}",
                edge.source().index(),
                edge.target().index()
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Body {
        Body::leaf(|_| Ok(()))
    }

    #[test]
    fn test_duplicate_definition_fails() {
        let mut registry = Registry::new();
        registry.define("css", noop()).unwrap();
        assert_eq!(
            registry.define("css", noop()),
            Err(RegistryError::DuplicateTask("css".into()))
        );
    }

    #[test]
    fn test_unknown_task_fails() {
        let registry = Registry::new();
        assert!(matches!(
            registry.resolve("nope"),
            Err(RegistryError::UnknownTask(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_forward_reference_resolves_once_defined() {
        let mut registry = Registry::new();
        registry.series("all", ["css", "js"]).unwrap();

        assert_eq!(
            registry.resolve("all").unwrap_err(),
            RegistryError::UnknownTask("css".into())
        );
        assert!(!registry.contains("css"));

        registry.define("css", noop()).unwrap();
        registry.define("js", noop()).unwrap();

        let unit = registry.resolve("all").unwrap();
        assert_eq!(unit.kind(), Kind::Series);
        assert_eq!(unit.leaves(), 2);
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let mut registry = Registry::new();
        assert_eq!(
            registry.series("loop", ["loop"]),
            Err(RegistryError::Cycle("loop".into()))
        );
        assert!(!registry.contains("loop"));
    }

    #[test]
    fn test_transitive_cycle_is_rejected() {
        let mut registry = Registry::new();
        registry.series("a", ["b"]).unwrap();
        registry.parallel("b", ["c"]).unwrap();

        // c -> a would close a -> b -> c -> a
        assert_eq!(
            registry.series("c", ["a"]),
            Err(RegistryError::Cycle("c".into()))
        );

        // the rejected definition left no trace, c can still be a leaf
        registry.define("c", noop()).unwrap();
        assert_eq!(registry.resolve("a").unwrap().leaves(), 1);
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let mut registry = Registry::new();
        registry.define("leaf", noop()).unwrap();
        registry.parallel("left", ["leaf"]).unwrap();
        registry.parallel("right", ["leaf"]).unwrap();
        registry.series("top", ["left", "right"]).unwrap();

        let unit = registry.resolve("top").unwrap();
        assert_eq!(unit.leaves(), 2);
    }

    #[test]
    fn test_tasks_lists_only_defined() {
        let mut registry = Registry::new();
        registry.series("all", ["css", "js"]).unwrap();
        registry.define("css", noop()).unwrap();

        let tasks: Vec<_> = registry.tasks().collect();
        assert_eq!(tasks, vec![("all", Kind::Series), ("css", Kind::Leaf)]);
    }

    #[test]
    fn test_display_renders_mermaid() {
        let mut registry = Registry::new();
        registry.define("css", noop()).unwrap();
        registry.series("all", ["css"]).unwrap();

        let mermaid = registry.to_string();
        assert!(mermaid.starts_with("graph LR"));
        assert!(mermaid.contains(r#"0["css\nleaf"]"#));
        assert!(mermaid.contains("1 --> 0"));
    }
}
