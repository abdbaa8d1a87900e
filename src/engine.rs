//! The countdown engine.
//!
//! Walks the queue set by set, one `tick()` per wall-clock second:
//! `Idle -> Work -> InterExerciseRest -> Work -> ... -> InterSetRest -> Work ... -> Idle`.
//! Rest phases of zero length are skipped entirely. The engine never renders
//! anything; every command and tick leaves `EngineEvent`s in an outbox that the
//! host drains with `take_events()`.

use strum::{Display, EnumIs};

use crate::queue::{clamp_seconds, Queue};

pub const DEFAULT_SETS: u32 = 1;
pub const MAX_SETS: u32 = 99;
pub const DEFAULT_SET_REST_SECONDS: u32 = 15;

/// Countdown values that produce an audible cue.
const COUNTDOWN_CUES: std::ops::RangeInclusive<u32> = 1..=3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfiguration {
  pub total_sets: u32,
  pub inter_set_rest_seconds: u32,
}

impl Default for RunConfiguration {
  fn default() -> Self {
    Self { total_sets: DEFAULT_SETS, inter_set_rest_seconds: DEFAULT_SET_REST_SECONDS }
  }
}

impl RunConfiguration {
  pub fn adjust_sets(&mut self, delta: i32) {
    self.total_sets = (self.total_sets as i64 + delta as i64).clamp(1, MAX_SETS as i64) as u32;
  }

  pub fn adjust_set_rest(&mut self, delta: i32) {
    self.inter_set_rest_seconds = clamp_seconds(self.inter_set_rest_seconds as i64 + delta as i64);
  }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, EnumIs, Display)]
pub enum Phase {
  #[default]
  Idle,
  Work,
  #[strum(serialize = "Rest")]
  InterExerciseRest,
  #[strum(serialize = "Set rest")]
  InterSetRest,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, EnumIs)]
pub enum RunState {
  #[default]
  Stopped,
  Running,
  Paused,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EngineState {
  pub phase: Phase,
  /// Index into the queue; `None` while idle.
  pub exercise_index: Option<usize>,
  pub set_index: u32,
  pub seconds_remaining: u32,
  /// Idle because the last run finished, as opposed to never started or reset.
  pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
  /// Start was requested with nothing queued.
  Nudge,
  RunStarted,
  Resumed,
  Paused,
  Reset,
  WorkStarted { name: String, index: usize, set: u32 },
  RestStarted { seconds: u32 },
  SetRestStarted { seconds: u32 },
  Countdown(u32),
  Done,
}

#[derive(Debug, Clone)]
pub struct Engine {
  queue: Queue,
  config: RunConfiguration,
  state: EngineState,
  run: RunState,
  events: Vec<EngineEvent>,
}

impl Engine {
  pub fn new(queue: Queue, config: RunConfiguration) -> Self {
    Self { queue, config, state: EngineState::default(), run: RunState::default(), events: Vec::new() }
  }

  pub fn queue(&self) -> &Queue {
    &self.queue
  }

  pub fn config(&self) -> &RunConfiguration {
    &self.config
  }

  pub fn state(&self) -> &EngineState {
    &self.state
  }

  pub fn run_state(&self) -> RunState {
    self.run
  }

  pub fn is_running(&self) -> bool {
    self.run.is_running()
  }

  pub fn take_events(&mut self) -> Vec<EngineEvent> {
    std::mem::take(&mut self.events)
  }

  /// Name of the exercise the current phase belongs to.
  pub fn current_exercise(&self) -> Option<&str> {
    if self.state.phase.is_idle() {
      return None;
    }
    self.state.exercise_index.and_then(|i| self.queue.get(i)).map(|e| e.name.as_str())
  }

  /// Apply any queue edit. The running index is clamped afterwards so it
  /// always addresses a valid entry.
  pub fn edit_queue<R>(&mut self, f: impl FnOnce(&mut Queue) -> R) -> R {
    let result = f(&mut self.queue);
    self.clamp_index();
    result
  }

  /// Settings changes are read at the next transition; the phase currently
  /// counting down keeps its remaining time.
  pub fn edit_config<R>(&mut self, f: impl FnOnce(&mut RunConfiguration) -> R) -> R {
    f(&mut self.config)
  }

  pub fn start(&mut self) {
    if self.run.is_running() {
      return;
    }
    if self.queue.is_empty() {
      self.state = EngineState::default();
      self.run = RunState::Stopped;
      self.events.push(EngineEvent::Nudge);
      return;
    }
    self.run = RunState::Running;
    if self.state.phase.is_idle() {
      self.state = EngineState::default();
      self.events.push(EngineEvent::RunStarted);
      self.enter_work(0);
    } else {
      self.events.push(EngineEvent::Resumed);
    }
  }

  pub fn pause(&mut self) {
    if !self.run.is_running() {
      return;
    }
    self.run = RunState::Paused;
    self.events.push(EngineEvent::Paused);
  }

  pub fn resume(&mut self) {
    if !self.run.is_paused() {
      return;
    }
    self.run = RunState::Running;
    self.events.push(EngineEvent::Resumed);
  }

  pub fn toggle(&mut self) {
    if self.run.is_running() { self.pause() } else { self.start() };
  }

  pub fn reset(&mut self) {
    self.run = RunState::Stopped;
    self.state = EngineState::default();
    self.events.push(EngineEvent::Reset);
  }

  /// One second of wall-clock time. Ignored unless running.
  pub fn tick(&mut self) {
    if !self.run.is_running() {
      return;
    }
    if self.queue.is_empty() {
      self.complete();
      return;
    }
    if self.state.seconds_remaining > 0 {
      self.state.seconds_remaining -= 1;
      let remaining = self.state.seconds_remaining;
      if COUNTDOWN_CUES.contains(&remaining) && !self.state.phase.is_idle() {
        self.events.push(EngineEvent::Countdown(remaining));
      }
      return;
    }
    self.advance();
  }

  fn advance(&mut self) {
    match self.state.phase {
      Phase::Idle => self.complete(),
      Phase::Work => {
        let Some(index) = self.state.exercise_index else {
          self.complete();
          return;
        };
        if index + 1 < self.queue.len() {
          let rest = self.queue.get(index).map_or(0, |e| e.rest_seconds);
          if rest > 0 {
            self.state.phase = Phase::InterExerciseRest;
            self.state.seconds_remaining = rest;
            self.events.push(EngineEvent::RestStarted { seconds: rest });
          } else {
            self.enter_work(index + 1);
          }
        } else {
          self.finish_set();
        }
      }
      Phase::InterExerciseRest => {
        let next = self.state.exercise_index.map_or(0, |i| i + 1);
        if next < self.queue.len() {
          self.enter_work(next);
        } else {
          // The rest's successor was removed while resting.
          self.finish_set();
        }
      }
      Phase::InterSetRest => self.next_set(),
    }
  }

  fn finish_set(&mut self) {
    if self.state.set_index + 1 >= self.config.total_sets {
      self.complete();
      return;
    }
    let rest = self.config.inter_set_rest_seconds;
    if rest > 0 {
      self.state.phase = Phase::InterSetRest;
      self.state.seconds_remaining = rest;
      self.events.push(EngineEvent::SetRestStarted { seconds: rest });
    } else {
      self.next_set();
    }
  }

  fn next_set(&mut self) {
    self.state.set_index += 1;
    if self.state.set_index >= self.config.total_sets {
      self.complete();
      return;
    }
    self.enter_work(0);
  }

  fn enter_work(&mut self, index: usize) {
    let Some(entry) = self.queue.get(index) else {
      self.complete();
      return;
    };
    self.state.phase = Phase::Work;
    self.state.exercise_index = Some(index);
    self.state.seconds_remaining = entry.work_seconds;
    self.events.push(EngineEvent::WorkStarted { name: entry.name.clone(), index, set: self.state.set_index });
  }

  fn complete(&mut self) {
    self.run = RunState::Stopped;
    self.state = EngineState { completed: true, ..EngineState::default() };
    self.events.push(EngineEvent::Done);
  }

  /// Emptying the queue drops the index; the next tick then completes the
  /// run. Refilling it before that tick points the phase at the first entry.
  fn clamp_index(&mut self) {
    if self.state.phase.is_idle() {
      return;
    }
    let len = self.queue.len();
    self.state.exercise_index = match self.state.exercise_index {
      _ if len == 0 => None,
      Some(i) => Some(i.min(len - 1)),
      None => Some(0),
    };
  }
}

/// Wall-clock length of a full run with the given queue and settings.
pub fn planned_duration(queue: &Queue, config: &RunConfiguration) -> u64 {
  if queue.is_empty() {
    return 0;
  }
  let sets = config.total_sets as u64;
  let work: u64 = queue.iter().map(|e| e.work_seconds as u64).sum();
  let rests: u64 = queue.iter().take(queue.len() - 1).map(|e| e.rest_seconds as u64).sum();
  sets * (work + rests) + (sets - 1) * config.inter_set_rest_seconds as u64
}
