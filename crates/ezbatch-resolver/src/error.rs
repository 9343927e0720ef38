use thiserror::Error;

/// Errors that can occur while ordering a dependency map.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
  /// A job lists a prerequisite that is not one of the jobs.
  #[error("job '{job}' depends on unknown job '{dependency}'")]
  UnknownDependency { job: String, dependency: String },

  /// The dependency map has an entry for a key that is not one of the jobs.
  #[error("dependencies declared for unknown job '{job}'")]
  UnknownJob { job: String },

  /// The dependency relation is cyclic.
  ///
  /// `cycle` lists one cycle in dependency order: each job depends on the
  /// next, and the last depends on the first. `blocked` holds every job that
  /// could not be placed, sorted.
  #[error("dependency cycle detected: {}", render_cycle(.cycle))]
  CycleDetected {
    cycle: Vec<String>,
    blocked: Vec<String>,
  },
}

fn render_cycle(cycle: &[String]) -> String {
  match cycle.first() {
    Some(first) => {
      let mut path = cycle.join(" -> ");
      path.push_str(" -> ");
      path.push_str(first);
      path
    }
    None => String::new(),
  }
}
