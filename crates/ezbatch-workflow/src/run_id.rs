use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use rand::seq::IndexedRandom;

/// Source of workflow and job run identifiers.
///
/// Identifiers end up in job names and tags, so they must be unique per call
/// and contain only `[A-Za-z0-9]`.
pub trait RunIdGenerator: Send + Sync {
  fn generate(&self) -> String;
}

/// Two random dictionary words, capitalized and joined, then a four digit
/// suffix: `BraveOtter4821`.
#[derive(Debug, Clone, Copy)]
pub struct WordPairIds {
  words: &'static [&'static str],
}

impl WordPairIds {
  pub fn new() -> Self {
    Self { words: WORDS }
  }
}

impl Default for WordPairIds {
  fn default() -> Self {
    Self::new()
  }
}

impl RunIdGenerator for WordPairIds {
  fn generate(&self) -> String {
    let mut rng = rand::rng();
    let mut id = String::new();
    for _ in 0..2 {
      if let Some(word) = self.words.choose(&mut rng) {
        id.push_str(&capitalize(word));
      }
    }
    id.push_str(&rng.random_range(SUFFIX_RANGE).to_string());
    id
  }
}

fn capitalize(word: &str) -> String {
  let mut chars = word.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  }
}

/// Deterministic counter: `Run1`, `Run2`, ...
#[derive(Debug)]
pub struct SequentialIds {
  prefix: String,
  next: AtomicU64,
}

impl SequentialIds {
  pub fn new(prefix: impl Into<String>) -> Self {
    Self {
      prefix: prefix.into(),
      next: AtomicU64::new(1),
    }
  }
}

impl Default for SequentialIds {
  fn default() -> Self {
    Self::new("Run")
  }
}

impl RunIdGenerator for SequentialIds {
  fn generate(&self) -> String {
    let n = self.next.fetch_add(1, Ordering::Relaxed);
    format!("{}{n}", self.prefix)
  }
}

const SUFFIX_RANGE: std::ops::Range<u32> = 1000..10000;

const WORDS: &[&str] = &[
  "amber", "anchor", "apple", "arrow", "aspen", "atlas", "autumn", "badger", "basil", "beacon",
  "birch", "bison", "blossom", "bold", "brave", "breeze", "bright", "brook", "cactus", "calm",
  "canyon", "cedar", "cherry", "clever", "cloud", "cobalt", "comet", "coral", "cosmic", "crane",
  "crimson", "crystal", "dawn", "delta", "desert", "dune", "eager", "eagle", "ember", "falcon",
  "fern", "fierce", "flint", "forest", "fox", "frost", "gentle", "glacier", "golden", "granite",
  "grove", "harbor", "hazel", "heron", "hollow", "honey", "indigo", "iris", "island", "ivory",
  "jade", "jasper", "jolly", "juniper", "keen", "kestrel", "lagoon", "lark", "lemon", "lively",
  "lotus", "lucky", "lunar", "maple", "marble", "meadow", "mellow", "mint", "misty", "moss",
  "nimble", "noble", "north", "oak", "ocean", "olive", "onyx", "orbit", "otter", "pebble",
  "pine", "plum", "polar", "prairie", "quartz", "quick", "quiet", "radiant", "raven", "reef",
  "river", "robin", "ruby", "sage", "sapphire", "shadow", "silver", "sky", "solar", "spruce",
  "steady", "stone", "storm", "summit", "swift", "thunder", "tidal", "tiger", "topaz", "tundra",
  "valley", "velvet", "vivid", "willow", "winter", "wise", "zephyr", "zesty",
];

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_word_pair_ids_are_two_capitalized_words_and_a_suffix() {
    let ids = WordPairIds::new();
    for _ in 0..50 {
      let id = ids.generate();
      assert!(id.chars().all(|c| c.is_ascii_alphanumeric()), "{id}");
      assert!(id.starts_with(|c: char| c.is_ascii_uppercase()), "{id}");
      assert_eq!(id.chars().filter(char::is_ascii_uppercase).count(), 2, "{id}");

      let (words, suffix) = id.split_at(id.len() - 4);
      assert!(words.chars().all(|c| c.is_ascii_alphabetic()), "{id}");
      let suffix: u32 = suffix.parse().unwrap();
      assert!(SUFFIX_RANGE.contains(&suffix), "{id}");
    }
  }

  #[test]
  fn test_word_pair_ids_rarely_repeat() {
    let ids = WordPairIds::new();
    let generated: std::collections::BTreeSet<String> = (0..500).map(|_| ids.generate()).collect();
    // 16384 word pairs times 9000 suffixes.
    assert!(generated.len() >= 499);
  }

  #[test]
  fn test_sequential_ids() {
    let ids = SequentialIds::new("Job");
    assert_eq!(ids.generate(), "Job1");
    assert_eq!(ids.generate(), "Job2");
    assert_eq!(SequentialIds::default().generate(), "Run1");
  }

  #[test]
  fn test_capitalize() {
    assert_eq!(capitalize("otter"), "Otter");
    assert_eq!(capitalize(""), "");
  }

  #[test]
  fn test_word_list_is_tag_safe() {
    assert!(
      WORDS
        .iter()
        .all(|w| !w.is_empty() && w.chars().all(|c| c.is_ascii_lowercase()))
    );
  }
}
