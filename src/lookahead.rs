use std::fmt;

use crate::engine::{EngineState, Phase, RunConfiguration};
use crate::queue::Queue;

/// The work phase that follows the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextUp {
  pub exercise_name: String,
  /// 1-based.
  pub set_number: u32,
  pub total_sets: u32,
}

impl fmt::Display for NextUp {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} (Round {}/{})", self.exercise_name, self.set_number, self.total_sets)
  }
}

/// What comes after the current phase, or `None` once no further work phase exists.
/// Never mutates anything; mirrors the engine's transition table.
pub fn next_up(queue: &Queue, config: &RunConfiguration, state: &EngineState) -> Option<NextUp> {
  let set = state.set_index;
  match state.phase {
    Phase::Idle if state.completed => None,
    Phase::Idle => work_at(queue, config, 0, 0),
    Phase::Work | Phase::InterExerciseRest => {
      let next = state.exercise_index.map_or(0, |i| i + 1);
      work_at(queue, config, set, next)
    }
    Phase::InterSetRest => work_at(queue, config, set + 1, 0),
  }
}

/// Work phase `index` of set `set`, rolling over to the first exercise of the
/// following set when `index` runs off the end of the queue.
fn work_at(queue: &Queue, config: &RunConfiguration, set: u32, index: usize) -> Option<NextUp> {
  if queue.is_empty() || set >= config.total_sets {
    return None;
  }
  let (set, entry) = match queue.get(index) {
    Some(entry) => (set, entry),
    None if set + 1 < config.total_sets => (set + 1, queue.get(0)?),
    None => return None,
  };
  Some(NextUp { exercise_name: entry.name.clone(), set_number: set + 1, total_sets: config.total_sets })
}
