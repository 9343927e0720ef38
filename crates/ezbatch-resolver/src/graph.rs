use std::collections::{BTreeMap, HashMap};

use crate::error::ResolveError;

/// Dependency graph over an arena of job indices.
///
/// Keys are stored sorted, so index order is lexical order.
#[derive(Debug, Clone)]
pub(crate) struct DependencyGraph {
  keys: Vec<String>,
  /// job -> jobs it depends on. Deduplicated.
  prerequisites: Vec<Vec<usize>>,
  /// job -> jobs that depend on it.
  dependents: Vec<Vec<usize>>,
}

impl DependencyGraph {
  /// Build the graph. A key without an entry in `dependencies` has no
  /// prerequisites.
  pub fn new<I, S>(
    jobs: I,
    dependencies: &BTreeMap<String, Vec<String>>,
  ) -> Result<Self, ResolveError>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let mut keys: Vec<String> = jobs.into_iter().map(|k| k.as_ref().to_string()).collect();
    keys.sort();
    keys.dedup();

    let index: HashMap<String, usize> = keys
      .iter()
      .enumerate()
      .map(|(i, key)| (key.clone(), i))
      .collect();

    let mut prerequisites = vec![Vec::new(); keys.len()];
    let mut dependents = vec![Vec::new(); keys.len()];

    for (job, deps) in dependencies {
      let &j = index
        .get(job)
        .ok_or_else(|| ResolveError::UnknownJob { job: job.clone() })?;

      for dep in deps {
        let &d = index.get(dep).ok_or_else(|| ResolveError::UnknownDependency {
          job: job.clone(),
          dependency: dep.clone(),
        })?;
        if !prerequisites[j].contains(&d) {
          prerequisites[j].push(d);
          dependents[d].push(j);
        }
      }
    }

    Ok(Self {
      keys,
      prerequisites,
      dependents,
    })
  }

  pub fn len(&self) -> usize {
    self.keys.len()
  }

  /// All job keys, sorted.
  #[cfg(test)]
  pub fn keys(&self) -> &[String] {
    &self.keys
  }

  /// Jobs that `key` depends on, in declaration order.
  #[cfg(test)]
  pub fn prerequisites(&self, key: &str) -> Vec<&str> {
    self.neighbours(key, &self.prerequisites)
  }

  /// Jobs that depend on `key`.
  #[cfg(test)]
  pub fn dependents(&self, key: &str) -> Vec<&str> {
    self.neighbours(key, &self.dependents)
  }

  #[cfg(test)]
  fn neighbours<'a>(&'a self, key: &str, edges: &'a [Vec<usize>]) -> Vec<&'a str> {
    self
      .keys
      .binary_search_by(|k| k.as_str().cmp(key))
      .map(|i| edges[i].iter().map(|&n| self.key(n)).collect())
      .unwrap_or_default()
  }

  pub(crate) fn key(&self, i: usize) -> &str {
    &self.keys[i]
  }

  pub(crate) fn prerequisite_indices(&self, i: usize) -> &[usize] {
    &self.prerequisites[i]
  }

  pub(crate) fn dependent_indices(&self, i: usize) -> &[usize] {
    &self.dependents[i]
  }
}
