use std::collections::BTreeMap;

use ezbatch_resolver::{ResolveError, resolve};
use proptest::prelude::*;

/// Random DAG: job `i` may only depend on jobs with a smaller index, so the
/// graph is acyclic. Names are shuffled so index order is not lexical order.
fn acyclic_workflow() -> impl Strategy<Value = (Vec<String>, BTreeMap<String, Vec<String>>)> {
  (1usize..16)
    .prop_flat_map(|n| {
      let names = Just((0..n).map(|i| format!("job-{i}")).collect::<Vec<_>>()).prop_shuffle();
      let edges = proptest::collection::vec((0..n, 0..n), 0..(n * 2));
      (names, edges)
    })
    .prop_map(|(names, edges)| {
      let mut deps: BTreeMap<String, Vec<String>> = BTreeMap::new();
      for (a, b) in edges {
        if a == b {
          continue;
        }
        let (job, dep) = if a > b { (a, b) } else { (b, a) };
        deps
          .entry(names[job].clone())
          .or_default()
          .push(names[dep].clone());
      }
      (names, deps)
    })
}

proptest! {
  #[test]
  fn resolve_yields_a_topological_order((jobs, deps) in acyclic_workflow()) {
    let order = resolve(&jobs, &deps).unwrap();

    prop_assert_eq!(order.len(), jobs.len());
    let position = |key: &str| order.iter().position(|k| k == key).unwrap();
    for job in &jobs {
      position(job);
    }
    for (job, prerequisites) in &deps {
      for dep in prerequisites {
        prop_assert!(position(dep) < position(job), "{} must precede {}", dep, job);
      }
    }
  }

  #[test]
  fn resolve_is_deterministic((jobs, deps) in acyclic_workflow()) {
    let mut reversed = jobs.clone();
    reversed.reverse();
    prop_assert_eq!(resolve(&jobs, &deps).unwrap(), resolve(&reversed, &deps).unwrap());
  }

  #[test]
  fn closing_a_chain_is_a_cycle(n in 2usize..10) {
    let jobs: Vec<String> = (0..n).map(|i| format!("step-{i}")).collect();
    let deps: BTreeMap<String, Vec<String>> = (0..n)
      .map(|i| (jobs[i].clone(), vec![jobs[(i + 1) % n].clone()]))
      .collect();

    let err = resolve(&jobs, &deps).unwrap_err();
    let is_cycle = matches!(
      &err,
      ResolveError::CycleDetected { cycle, blocked } if cycle.len() == n && blocked.len() == n
    );
    prop_assert!(is_cycle, "unexpected error: {:?}", err);
  }
}

#[test]
fn test_no_dependencies_returns_every_job() {
  let order = resolve(["x", "y", "z"], &BTreeMap::new()).unwrap();
  let mut sorted = order.clone();
  sorted.sort();
  assert_eq!(sorted, vec!["x", "y", "z"]);
}

#[test]
fn test_three_cycle_is_rejected() {
  let deps: BTreeMap<String, Vec<String>> = [("a", "b"), ("b", "c"), ("c", "a")]
    .into_iter()
    .map(|(job, dep)| (job.to_string(), vec![dep.to_string()]))
    .collect();
  assert!(matches!(
    resolve(["a", "b", "c"], &deps),
    Err(ResolveError::CycleDetected { .. })
  ));
}
