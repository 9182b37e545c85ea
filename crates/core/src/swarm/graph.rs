//! # Dependency Resolution
//!
//! Orders stage descriptors so every stage runs after the stages it
//! requires. Uses Kahn's algorithm; among simultaneously ready stages the
//! one declared first runs first.

use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

use super::stage::StageDescriptor;

/// Configuration errors, raised when a pipeline is built and never during a run
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("pipeline has no stages")]
    Empty,
    #[error("duplicate stage id '{0}'")]
    DuplicateStage(String),
    #[error("stage '{stage}' requires unknown stage '{missing}'")]
    UnknownDependency { stage: String, missing: String },
    #[error("dependency cycle: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },
    #[error("synthesizer '{synthesizer}' is required by stage '{stage}'")]
    SynthesizerHasDependents { synthesizer: String, stage: String },
    #[error("no worker registered for role '{role}' (stage '{stage}')")]
    MissingWorker { stage: String, role: String },
    #[error("unknown team '{0}'")]
    UnknownTeam(String),
}

/// Resolved execution order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    /// Descriptor indices in execution order
    pub order: Vec<usize>,
    /// Groups of descriptor indices whose prerequisites all sit in earlier groups
    pub waves: Vec<Vec<usize>>,
}

/// Resolve an execution order for `descriptors`.
///
/// Fails on an empty set, duplicate ids, unknown dependencies and cycles.
pub fn resolve(descriptors: &[StageDescriptor]) -> Result<ExecutionPlan, ConfigError> {
    if descriptors.is_empty() {
        return Err(ConfigError::Empty);
    }

    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(descriptors.len());
    for (i, d) in descriptors.iter().enumerate() {
        if positions.insert(d.stage_id.as_str(), i).is_some() {
            return Err(ConfigError::DuplicateStage(d.stage_id.clone()));
        }
    }

    // requires edges point from prerequisite to dependant
    let mut in_degree = vec![0usize; descriptors.len()];
    let mut dependants: Vec<Vec<usize>> = vec![Vec::new(); descriptors.len()];
    for (i, d) in descriptors.iter().enumerate() {
        for dep in &d.requires {
            let &j = positions
                .get(dep.as_str())
                .ok_or_else(|| ConfigError::UnknownDependency {
                    stage: d.stage_id.clone(),
                    missing: dep.clone(),
                })?;
            in_degree[i] += 1;
            dependants[j].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..descriptors.len())
        .filter(|&i| in_degree[i] == 0)
        .collect();
    let mut order = Vec::with_capacity(descriptors.len());
    let mut level = vec![0usize; descriptors.len()];

    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &k in &dependants[i] {
            level[k] = level[k].max(level[i] + 1);
            in_degree[k] -= 1;
            if in_degree[k] == 0 {
                ready.insert(k);
            }
        }
    }

    if order.len() < descriptors.len() {
        let remaining: HashSet<usize> = (0..descriptors.len())
            .filter(|&i| in_degree[i] > 0)
            .collect();
        return Err(ConfigError::Cycle {
            path: find_cycle(descriptors, &positions, &remaining),
        });
    }

    let depth = level.iter().copied().max().unwrap_or(0);
    let mut waves = vec![Vec::new(); depth + 1];
    for i in 0..descriptors.len() {
        waves[level[i]].push(i);
    }

    Ok(ExecutionPlan { order, waves })
}

/// Walk requires edges inside the unresolved set until a stage repeats.
fn find_cycle(
    descriptors: &[StageDescriptor],
    positions: &HashMap<&str, usize>,
    remaining: &HashSet<usize>,
) -> Vec<String> {
    let Some(&start) = remaining.iter().min() else {
        return Vec::new();
    };

    let mut path: Vec<usize> = Vec::new();
    let mut seen: HashMap<usize, usize> = HashMap::new();
    let mut current = start;

    loop {
        if let Some(&at) = seen.get(&current) {
            let mut cycle: Vec<String> = path[at..]
                .iter()
                .map(|&i| descriptors[i].stage_id.clone())
                .collect();
            cycle.push(descriptors[current].stage_id.clone());
            return cycle;
        }
        seen.insert(current, path.len());
        path.push(current);

        // every unresolved stage has at least one unresolved prerequisite
        let next = descriptors[current]
            .requires
            .iter()
            .filter_map(|dep| positions.get(dep.as_str()).copied())
            .find(|j| remaining.contains(j));
        match next {
            Some(j) => current = j,
            None => {
                return path
                    .iter()
                    .map(|&i| descriptors[i].stage_id.clone())
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(id: &str, requires: &[&str]) -> StageDescriptor {
        StageDescriptor::new(id, id).requires(requires.iter().copied())
    }

    fn ids(descriptors: &[StageDescriptor], order: &[usize]) -> Vec<String> {
        order
            .iter()
            .map(|&i| descriptors[i].stage_id.clone())
            .collect()
    }

    #[test]
    fn test_chain_order() {
        let stages = vec![
            stage("report", &["risk"]),
            stage("risk", &["geo"]),
            stage("geo", &[]),
        ];
        let plan = resolve(&stages).unwrap();
        assert_eq!(ids(&stages, &plan.order), vec!["geo", "risk", "report"]);
        assert_eq!(plan.waves.len(), 3);
    }

    #[test]
    fn test_ties_follow_declaration_order() {
        let stages = vec![
            stage("c", &[]),
            stage("a", &[]),
            stage("b", &[]),
            stage("report", &["a", "b", "c"]),
        ];
        let plan = resolve(&stages).unwrap();
        assert_eq!(ids(&stages, &plan.order), vec!["c", "a", "b", "report"]);
        assert_eq!(plan.waves, vec![vec![0, 1, 2], vec![3]]);
    }

    #[test]
    fn test_order_respects_every_requires_edge() {
        let stages = vec![
            stage("geographic", &[]),
            stage("epidemiological", &["geographic"]),
            stage("resources", &["geographic"]),
            stage("risk", &["geographic", "epidemiological", "resources"]),
            stage("travel", &[]),
            stage("report", &["risk", "travel"]),
        ];
        let plan = resolve(&stages).unwrap();

        let position: HashMap<usize, usize> = plan
            .order
            .iter()
            .enumerate()
            .map(|(pos, &i)| (i, pos))
            .collect();
        for (i, d) in stages.iter().enumerate() {
            for dep in &d.requires {
                let j = stages.iter().position(|s| &s.stage_id == dep).unwrap();
                assert!(position[&j] < position[&i], "{} must precede {}", dep, d.stage_id);
            }
        }
        assert_eq!(
            ids(&stages, &plan.order),
            vec!["geographic", "epidemiological", "resources", "risk", "travel", "report"]
        );
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let stages = vec![
            stage("x", &[]),
            stage("y", &["x"]),
            stage("z", &[]),
            stage("w", &["z", "x"]),
        ];
        let first = resolve(&stages).unwrap();
        for _ in 0..10 {
            assert_eq!(resolve(&stages).unwrap(), first);
        }
    }

    #[test]
    fn test_two_stage_cycle() {
        let stages = vec![stage("A", &["B"]), stage("B", &["A"])];
        match resolve(&stages) {
            Err(ConfigError::Cycle { path }) => {
                assert_eq!(path, vec!["A", "B", "A"]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_cycle() {
        let stages = vec![stage("A", &["A"])];
        let err = resolve(&stages).unwrap_err();
        assert_eq!(err.to_string(), "dependency cycle: A -> A");
    }

    #[test]
    fn test_cycle_behind_valid_prefix() {
        let stages = vec![
            stage("root", &[]),
            stage("a", &["root", "c"]),
            stage("b", &["a"]),
            stage("c", &["b"]),
        ];
        let err = resolve(&stages).unwrap_err();
        match err {
            ConfigError::Cycle { path } => {
                assert_eq!(path.first(), path.last());
                assert!(!path.contains(&"root".to_string()));
                assert_eq!(path.len(), 4);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_dependency() {
        let stages = vec![stage("a", &["ghost"])];
        assert_eq!(
            resolve(&stages),
            Err(ConfigError::UnknownDependency {
                stage: "a".to_string(),
                missing: "ghost".to_string()
            })
        );
    }

    #[test]
    fn test_duplicate_stage() {
        let stages = vec![stage("a", &[]), stage("a", &[])];
        assert_eq!(
            resolve(&stages),
            Err(ConfigError::DuplicateStage("a".to_string()))
        );
    }

    #[test]
    fn test_empty() {
        assert_eq!(resolve(&[]), Err(ConfigError::Empty));
    }
}
