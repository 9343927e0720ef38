use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::ResolveError;
use crate::graph::DependencyGraph;

/// Order `jobs` so every job comes after the jobs it depends on.
///
/// Every key appears exactly once. Ties are broken lexically.
pub fn resolve<I, S>(
  jobs: I,
  dependencies: &BTreeMap<String, Vec<String>>,
) -> Result<Vec<String>, ResolveError>
where
  I: IntoIterator<Item = S>,
  S: AsRef<str>,
{
  DependencyGraph::new(jobs, dependencies)?.topological_order()
}

impl DependencyGraph {
  /// Kahn's algorithm with a sorted ready set.
  pub fn topological_order(&self) -> Result<Vec<String>, ResolveError> {
    let mut in_degree: Vec<usize> = (0..self.len())
      .map(|i| self.prerequisite_indices(i).len())
      .collect();
    let mut ready: BTreeSet<usize> = (0..self.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(self.len());

    while let Some(i) = ready.pop_first() {
      order.push(i);
      for &dependent in self.dependent_indices(i) {
        in_degree[dependent] -= 1;
        if in_degree[dependent] == 0 {
          ready.insert(dependent);
        }
      }
    }

    if order.len() < self.len() {
      let blocked: Vec<usize> = (0..self.len()).filter(|&i| in_degree[i] > 0).collect();
      let cycle = self.find_cycle(&in_degree, &blocked);
      return Err(ResolveError::CycleDetected {
        cycle: cycle.into_iter().map(|i| self.key(i).to_string()).collect(),
        blocked: blocked.into_iter().map(|i| self.key(i).to_string()).collect(),
      });
    }

    let order: Vec<String> = order.into_iter().map(|i| self.key(i).to_string()).collect();
    debug!(jobs = order.len(), order = ?order, "dependency order resolved");
    Ok(order)
  }

  /// Walk unplaced prerequisites from the first blocked job until a job
  /// repeats. Every blocked job has at least one unplaced prerequisite, so
  /// the walk always closes.
  fn find_cycle(&self, in_degree: &[usize], blocked: &[usize]) -> Vec<usize> {
    let Some(&start) = blocked.first() else {
      return Vec::new();
    };

    let mut path = vec![start];
    let mut position = vec![None; self.len()];
    position[start] = Some(0);

    let mut current = start;
    loop {
      let next = self
        .prerequisite_indices(current)
        .iter()
        .copied()
        .filter(|&p| in_degree[p] > 0)
        .min();
      let Some(next) = next else {
        return path;
      };
      if let Some(at) = position[next] {
        return path.split_off(at);
      }
      position[next] = Some(path.len());
      path.push(next);
      current = next;
    }
  }
}
