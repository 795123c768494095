//! Stage graph
//!
//! Stages are stored in flat maps keyed by name (stage -> dependencies and
//! stage -> dependents). Readiness is recomputed from a completed set each
//! wave; ties between concurrently eligible stages are broken by name so
//! execution order is reproducible.

use std::collections::{BTreeMap, BTreeSet};
use strata_core::domain::stage::StageDefinition;
use strata_core::error::{CycleError, GraphError};

/// Validated dependency DAG of a run
#[derive(Debug, Clone)]
pub struct StageGraph {
    dependencies: BTreeMap<String, BTreeSet<String>>,
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl StageGraph {
    /// Builds the graph, rejecting duplicates, unknown dependencies and cycles
    pub fn build(definitions: &[StageDefinition]) -> Result<Self, GraphError> {
        let mut dependencies: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for def in definitions {
            if def.name.trim().is_empty() {
                return Err(GraphError::EmptyName);
            }
            if dependencies
                .insert(def.name.clone(), def.depends_on.clone())
                .is_some()
            {
                return Err(GraphError::DuplicateStage(def.name.clone()));
            }
        }

        let mut dependents: BTreeMap<String, BTreeSet<String>> = dependencies
            .keys()
            .map(|name| (name.clone(), BTreeSet::new()))
            .collect();

        for (stage, deps) in &dependencies {
            for dep in deps {
                match dependents.get_mut(dep) {
                    Some(set) => {
                        set.insert(stage.clone());
                    }
                    None => {
                        return Err(GraphError::UnknownDependency {
                            stage: stage.clone(),
                            dependency: dep.clone(),
                        });
                    }
                }
            }
        }

        let graph = Self {
            dependencies,
            dependents,
        };

        if let Some(cycle) = graph.find_cycle() {
            return Err(CycleError { cycle }.into());
        }

        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn dependencies_of(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.dependencies.get(name)
    }

    /// Stages not yet completed whose dependencies are all completed, by name
    pub fn ready(&self, completed: &BTreeSet<String>) -> Vec<String> {
        self.dependencies
            .iter()
            .filter(|(name, deps)| !completed.contains(*name) && deps.is_subset(completed))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Deterministic topological order (Kahn's algorithm, lexical tie-break)
    pub fn topological_order(&self) -> Vec<String> {
        self.waves().into_iter().flatten().collect()
    }

    /// Stages grouped by the wave they would run in if every stage succeeds
    pub fn waves(&self) -> Vec<Vec<String>> {
        let mut completed = BTreeSet::new();
        let mut waves = Vec::new();

        loop {
            let wave = self.ready(&completed);
            if wave.is_empty() {
                break;
            }
            completed.extend(wave.iter().cloned());
            waves.push(wave);
        }

        waves
    }

    /// Every stage that depends on `name`, directly or not
    pub fn transitive_dependents(&self, name: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let mut stack = vec![name.to_string()];

        while let Some(current) = stack.pop() {
            if let Some(children) = self.dependents.get(&current) {
                for child in children {
                    if found.insert(child.clone()) {
                        stack.push(child.clone());
                    }
                }
            }
        }

        found
    }

    fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited = BTreeSet::new();
        let mut path = Vec::new();

        for name in self.dependencies.keys() {
            if !visited.contains(name) {
                if let Some(cycle) = self.visit(name, &mut visited, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn visit(
        &self,
        name: &str,
        visited: &mut BTreeSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        if let Some(pos) = path.iter().position(|n| n == name) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(name.to_string());
            return Some(cycle);
        }
        if visited.contains(name) {
            return None;
        }

        path.push(name.to_string());
        if let Some(deps) = self.dependencies.get(name) {
            for dep in deps {
                if let Some(cycle) = self.visit(dep, visited, path) {
                    return Some(cycle);
                }
            }
        }
        path.pop();
        visited.insert(name.to_string());
        None
    }
}

/// Walks a graph wave by wave, never issuing a stage twice
pub struct GraphCursor<'a> {
    graph: &'a StageGraph,
    issued: BTreeSet<String>,
}

impl<'a> GraphCursor<'a> {
    pub fn new(graph: &'a StageGraph) -> Self {
        Self {
            graph,
            issued: BTreeSet::new(),
        }
    }

    /// Next set of stages to dispatch given the stages that succeeded so far
    pub fn next_wave(&mut self, succeeded: &BTreeSet<String>) -> Vec<String> {
        let wave: Vec<String> = self
            .graph
            .ready(succeeded)
            .into_iter()
            .filter(|name| !self.issued.contains(name))
            .collect();
        self.issued.extend(wave.iter().cloned());
        wave
    }

    /// Withdraws stages that will never run (skipped)
    pub fn retire<I: IntoIterator<Item = String>>(&mut self, names: I) {
        self.issued.extend(names);
    }

    pub fn is_exhausted(&self) -> bool {
        self.issued.len() == self.graph.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::domain::resource::ResourceDescriptor;

    fn stage(name: &str, deps: &[&str]) -> StageDefinition {
        let mut def = StageDefinition::reconcile(name, ResourceDescriptor::new("compute", name));
        for dep in deps {
            def = def.after(*dep);
        }
        def
    }

    fn ml_pipeline() -> Vec<StageDefinition> {
        vec![
            stage("register-environment", &[]),
            stage("register-dataset", &[]),
            stage("create-compute", &[]),
            stage(
                "run-training",
                &["register-environment", "register-dataset", "create-compute"],
            ),
            stage("create-endpoint", &[]),
            stage("create-deployment", &["run-training", "create-endpoint"]),
            stage("allocate-traffic", &["create-deployment"]),
        ]
    }

    #[test]
    fn test_topological_order_respects_dependencies() {
        let defs = ml_pipeline();
        let graph = StageGraph::build(&defs).unwrap();
        let order = graph.topological_order();
        assert_eq!(order.len(), defs.len());

        let position = |name: &str| order.iter().position(|n| n == name).unwrap();
        for def in &defs {
            for dep in &def.depends_on {
                assert!(
                    position(dep) < position(&def.name),
                    "{} must come after {}",
                    def.name,
                    dep
                );
            }
        }
    }

    #[test]
    fn test_waves_break_ties_lexically() {
        let graph = StageGraph::build(&ml_pipeline()).unwrap();
        let waves = graph.waves();
        assert_eq!(
            waves[0],
            vec![
                "create-compute",
                "create-endpoint",
                "register-dataset",
                "register-environment"
            ]
        );
        assert_eq!(waves[1], vec!["run-training"]);
        assert_eq!(waves[2], vec!["create-deployment"]);
        assert_eq!(waves[3], vec!["allocate-traffic"]);
    }

    #[test]
    fn test_cycle_is_reported_with_members() {
        let defs = vec![stage("a", &["c"]), stage("b", &["a"]), stage("c", &["b"]), stage("d", &[])];
        let err = StageGraph::build(&defs).unwrap_err();
        match err {
            GraphError::Cycle(CycleError { cycle }) => {
                assert_eq!(cycle.first(), cycle.last());
                for member in ["a", "b", "c"] {
                    assert!(cycle.iter().any(|n| n == member));
                }
                assert!(!cycle.iter().any(|n| n == "d"));
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let err = StageGraph::build(&[stage("a", &["a"])]).unwrap_err();
        assert_eq!(
            err,
            GraphError::Cycle(CycleError {
                cycle: vec!["a".into(), "a".into()]
            })
        );
    }

    #[test]
    fn test_unknown_dependency_and_duplicates() {
        let err = StageGraph::build(&[stage("a", &["missing"])]).unwrap_err();
        assert!(matches!(err, GraphError::UnknownDependency { .. }));

        let err = StageGraph::build(&[stage("a", &[]), stage("a", &[])]).unwrap_err();
        assert_eq!(err, GraphError::DuplicateStage("a".into()));
    }

    #[test]
    fn test_transitive_dependents() {
        let graph = StageGraph::build(&ml_pipeline()).unwrap();
        let dependents = graph.transitive_dependents("register-dataset");
        let expected: BTreeSet<String> = ["run-training", "create-deployment", "allocate-traffic"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(dependents, expected);
        assert!(graph.transitive_dependents("allocate-traffic").is_empty());
    }

    #[test]
    fn test_cursor_never_issues_twice() {
        let graph = StageGraph::build(&[stage("a", &[]), stage("b", &["a"]), stage("c", &[])])
            .unwrap();
        let mut cursor = GraphCursor::new(&graph);
        let mut succeeded = BTreeSet::new();

        assert_eq!(cursor.next_wave(&succeeded), vec!["a", "c"]);
        // Nothing completed yet: no stage is handed out again
        assert!(cursor.next_wave(&succeeded).is_empty());

        succeeded.insert("a".to_string());
        assert_eq!(cursor.next_wave(&succeeded), vec!["b"]);
        assert!(cursor.is_exhausted());
    }

    #[test]
    fn test_retired_stages_are_not_issued() {
        let graph = StageGraph::build(&[stage("a", &[]), stage("b", &[])]).unwrap();
        let mut cursor = GraphCursor::new(&graph);
        cursor.retire(vec!["b".to_string()]);
        assert_eq!(cursor.next_wave(&BTreeSet::new()), vec!["a"]);
        assert!(cursor.is_exhausted());
    }
}
