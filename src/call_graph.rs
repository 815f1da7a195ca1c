//! Call graph analysis for compilation ordering and cycle detection
//!
//! Builds a call graph from a [`Program`]'s functions and computes its
//! strongly connected components (Tarjan's algorithm). The driver (C10)
//! uses this both to order compilation topologically and to detect
//! circular compilation dependencies (`CompileCycle`, §4.7) — a cycle
//! among compiled functions that never resolves to a leaf is a hard error,
//! unlike ordinary (non-compile-time) recursive calls within one function,
//! which the linear/effect passes handle independently.

use crate::ast::Program;
use std::collections::{HashMap, HashSet};

/// A call graph representing which functions call which other functions.
#[derive(Debug, Clone)]
pub struct CallGraph {
    edges: HashMap<String, HashSet<String>>,
    functions: HashSet<String>,
    sccs: Vec<HashSet<String>>,
}

impl CallGraph {
    /// Build a call graph from a program's top-level function definitions.
    pub fn build(program: &Program) -> Self {
        let functions: HashSet<String> = program.functions.iter().map(|f| f.name.clone()).collect();
        let mut edges: HashMap<String, HashSet<String>> = HashMap::new();
        for func in &program.functions {
            let callees: HashSet<String> = func
                .called_names()
                .into_iter()
                .filter(|name| functions.contains(*name))
                .map(str::to_string)
                .collect();
            edges.insert(func.name.clone(), callees);
        }

        let mut graph = CallGraph {
            edges,
            functions,
            sccs: Vec::new(),
        };
        graph.sccs = graph.find_sccs();
        graph
    }

    pub fn callees(&self, name: &str) -> Option<&HashSet<String>> {
        self.edges.get(name)
    }

    /// Whether `name` participates in a cycle (direct self-call or mutual
    /// recursion with another compiled function).
    pub fn is_recursive(&self, name: &str) -> bool {
        self.sccs.iter().any(|scc| scc.contains(name))
    }

    pub fn cycle_containing(&self, name: &str) -> Option<&HashSet<String>> {
        self.sccs.iter().find(|scc| scc.contains(name))
    }

    pub fn cycles(&self) -> &[HashSet<String>] {
        &self.sccs
    }

    /// A topological compilation order: leaves first. Functions within a
    /// cycle are emitted together, in name order, for determinism (§5,
    /// "a compilation is deterministic given its inputs").
    pub fn compilation_order(&self) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut names: Vec<&String> = self.functions.iter().collect();
        names.sort();
        for name in names {
            self.visit_order(name, &mut visited, &mut order);
        }
        order
    }

    fn visit_order(&self, name: &str, visited: &mut HashSet<String>, order: &mut Vec<String>) {
        if visited.contains(name) {
            return;
        }
        visited.insert(name.to_string());
        if let Some(callees) = self.edges.get(name) {
            let mut callees: Vec<&String> = callees.iter().collect();
            callees.sort();
            for callee in callees {
                if !self.is_recursive(callee) || !self.is_recursive(name) || self.cycle_containing(callee) != self.cycle_containing(name) {
                    self.visit_order(callee, visited, order);
                }
            }
        }
        order.push(name.to_string());
    }

    fn find_sccs(&self) -> Vec<HashSet<String>> {
        let mut index_counter = 0;
        let mut stack: Vec<String> = Vec::new();
        let mut on_stack: HashSet<String> = HashSet::new();
        let mut indices: HashMap<String, usize> = HashMap::new();
        let mut lowlinks: HashMap<String, usize> = HashMap::new();
        let mut sccs: Vec<HashSet<String>> = Vec::new();

        let mut names: Vec<&String> = self.functions.iter().collect();
        names.sort();
        for name in names {
            if !indices.contains_key(name) {
                self.tarjan_visit(
                    name,
                    &mut index_counter,
                    &mut stack,
                    &mut on_stack,
                    &mut indices,
                    &mut lowlinks,
                    &mut sccs,
                );
            }
        }

        sccs.into_iter()
            .filter(|scc| {
                if scc.len() > 1 {
                    true
                } else {
                    let name = scc.iter().next().unwrap();
                    self.edges.get(name).map(|c| c.contains(name)).unwrap_or(false)
                }
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn tarjan_visit(
        &self,
        name: &str,
        index_counter: &mut usize,
        stack: &mut Vec<String>,
        on_stack: &mut HashSet<String>,
        indices: &mut HashMap<String, usize>,
        lowlinks: &mut HashMap<String, usize>,
        sccs: &mut Vec<HashSet<String>>,
    ) {
        let index = *index_counter;
        *index_counter += 1;
        indices.insert(name.to_string(), index);
        lowlinks.insert(name.to_string(), index);
        stack.push(name.to_string());
        on_stack.insert(name.to_string());

        if let Some(callees) = self.edges.get(name) {
            let mut callees: Vec<&String> = callees.iter().collect();
            callees.sort();
            for callee in callees {
                if !self.functions.contains(callee) {
                    continue;
                }
                if !indices.contains_key(callee) {
                    self.tarjan_visit(callee, index_counter, stack, on_stack, indices, lowlinks, sccs);
                    let callee_lowlink = *lowlinks.get(callee).unwrap();
                    let name_lowlink = lowlinks.get_mut(name).unwrap();
                    *name_lowlink = (*name_lowlink).min(callee_lowlink);
                } else if on_stack.contains(callee) {
                    let callee_index = *indices.get(callee).unwrap();
                    let name_lowlink = lowlinks.get_mut(name).unwrap();
                    *name_lowlink = (*name_lowlink).min(callee_index);
                }
            }
        }

        if lowlinks.get(name) == indices.get(name) {
            let mut scc = HashSet::new();
            loop {
                let w = stack.pop().unwrap();
                on_stack.remove(&w);
                scc.insert(w.clone());
                if w == name {
                    break;
                }
            }
            sccs.push(scc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Decorator, Expr, FunctionDef, Stmt, TypeDecl};
    use crate::diagnostics::SourceSpan;
    use crate::types::Type;

    fn span() -> SourceSpan {
        SourceSpan::new("fixture.pyc", 0)
    }

    fn func(name: &str, calls: Vec<&str>) -> FunctionDef {
        let body = calls
            .into_iter()
            .map(|c| {
                Stmt::Expr(
                    Expr::Call {
                        callee: c.to_string(),
                        args: vec![],
                    },
                    span(),
                )
            })
            .collect();
        FunctionDef {
            name: name.to_string(),
            decorators: vec![Decorator::Compile],
            params: vec![],
            result: Type::Void,
            body,
            span: span(),
        }
    }

    fn program(functions: Vec<FunctionDef>) -> Program {
        Program {
            functions,
            type_decls: Vec::<TypeDecl>::new(),
        }
    }

    #[test]
    fn no_recursion() {
        let p = program(vec![func("foo", vec!["bar"]), func("bar", vec![])]);
        let graph = CallGraph::build(&p);
        assert!(!graph.is_recursive("foo"));
        assert!(graph.cycles().is_empty());
    }

    #[test]
    fn direct_recursion_detected() {
        let p = program(vec![func("countdown", vec!["countdown"])]);
        let graph = CallGraph::build(&p);
        assert!(graph.is_recursive("countdown"));
    }

    #[test]
    fn mutual_recursion_detected() {
        let p = program(vec![func("ping", vec!["pong"]), func("pong", vec!["ping"])]);
        let graph = CallGraph::build(&p);
        assert!(graph.is_recursive("ping"));
        assert!(graph.is_recursive("pong"));
        assert_eq!(graph.cycle_containing("ping"), graph.cycle_containing("pong"));
    }

    #[test]
    fn compilation_order_is_leaves_first() {
        let p = program(vec![func("main", vec!["helper"]), func("helper", vec![])]);
        let graph = CallGraph::build(&p);
        let order = graph.compilation_order();
        let helper_pos = order.iter().position(|n| n == "helper").unwrap();
        let main_pos = order.iter().position(|n| n == "main").unwrap();
        assert!(helper_pos < main_pos);
    }
}
