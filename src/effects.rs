use crate::audio::Beeper;
use crate::coach::{Coach, ExplainJob};
use crate::engine::EngineEvent;

/// Watches engine events for the two one-shot side effects: countdown beeps
/// and first-time coaching requests.
pub struct Dispatcher {
  beeper: Box<dyn Beeper>,
  coach: Coach,
}

impl Dispatcher {
  pub fn new(beeper: Box<dyn Beeper>, coach: Coach) -> Self {
    Self { beeper, coach }
  }

  pub fn coach(&self) -> &Coach {
    &self.coach
  }

  pub fn coach_mut(&mut self) -> &mut Coach {
    &mut self.coach
  }

  /// Returns a job when an explanation has to be fetched.
  pub fn observe(&mut self, event: &EngineEvent) -> Option<ExplainJob> {
    match event {
      EngineEvent::Countdown(count) => {
        self.beeper.beep(*count);
        None
      }
      EngineEvent::RunStarted => {
        self.coach.begin_run();
        None
      }
      EngineEvent::Reset => {
        self.coach.on_reset();
        None
      }
      EngineEvent::WorkStarted { name, .. } => self.coach.on_work_started(name),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::engine::{Engine, RunConfiguration};
  use crate::queue::Queue;
  use std::cell::RefCell;
  use std::rc::Rc;

  struct RecordingBeeper(Rc<RefCell<Vec<u32>>>);

  impl Beeper for RecordingBeeper {
    fn beep(&mut self, count: u32) {
      self.0.borrow_mut().push(count);
    }
  }

  fn setup(entries: &[(&str, u32, u32)], sets: u32, auto: bool) -> (Engine, Dispatcher, Rc<RefCell<Vec<u32>>>) {
    let mut queue = Queue::default();
    for (name, work, rest) in entries {
      queue.append(*name, Some(*work), Some(*rest));
    }
    let engine = Engine::new(queue, RunConfiguration { total_sets: sets, inter_set_rest_seconds: 2 });
    let beeps = Rc::new(RefCell::new(Vec::new()));
    let dispatcher = Dispatcher::new(Box::new(RecordingBeeper(beeps.clone())), Coach::new(auto));
    (engine, dispatcher, beeps)
  }

  /// Run to completion, returning the names of every explanation requested.
  fn run(engine: &mut Engine, dispatcher: &mut Dispatcher) -> Vec<String> {
    let mut requested = Vec::new();
    engine.start();
    loop {
      for event in engine.take_events() {
        if let Some(job) = dispatcher.observe(&event) {
          requested.push(job.name);
        }
      }
      if !engine.is_running() {
        return requested;
      }
      engine.tick();
    }
  }

  #[test]
  fn test_explains_each_exercise_once_per_run() {
    let (mut engine, mut dispatcher, _) = setup(&[("Air Squat", 2, 1), ("Push-Up", 2, 1)], 2, true);
    let requested = run(&mut engine, &mut dispatcher);
    assert_eq!(requested, vec!["Air Squat", "Push-Up"]);
  }

  #[test]
  fn test_new_run_explains_again() {
    let (mut engine, mut dispatcher, _) = setup(&[("Air Squat", 1, 0), ("Push-Up", 1, 0)], 1, true);
    assert_eq!(run(&mut engine, &mut dispatcher), vec!["Air Squat", "Push-Up"]);
    assert_eq!(run(&mut engine, &mut dispatcher), vec!["Air Squat", "Push-Up"]);
  }

  #[test]
  fn test_explanation_still_on_screen_is_not_repeated() {
    let (mut engine, mut dispatcher, _) = setup(&[("Air Squat", 1, 0)], 1, true);
    assert_eq!(run(&mut engine, &mut dispatcher), vec!["Air Squat"]);
    assert!(run(&mut engine, &mut dispatcher).is_empty());
  }

  #[test]
  fn test_no_requests_without_auto_explain() {
    let (mut engine, mut dispatcher, _) = setup(&[("Air Squat", 1, 0)], 2, false);
    assert!(run(&mut engine, &mut dispatcher).is_empty());
  }

  #[test]
  fn test_beeps_follow_countdown() {
    let (mut engine, mut dispatcher, beeps) = setup(&[("A", 4, 3), ("B", 1, 0)], 1, false);
    run(&mut engine, &mut dispatcher);
    // A counts 3,2,1; the 3s rest counts 2,1; B is too short to cue
    assert_eq!(*beeps.borrow(), vec![3, 2, 1, 2, 1]);
  }

  #[test]
  fn test_reset_forgets_explained_names() {
    let (mut engine, mut dispatcher, _) = setup(&[("Air Squat", 5, 0)], 1, true);
    engine.start();
    for event in engine.take_events() {
      dispatcher.observe(&event);
    }
    engine.reset();
    for event in engine.take_events() {
      dispatcher.observe(&event);
    }
    assert_eq!(dispatcher.coach().output(), "");
    engine.start();
    let jobs: Vec<_> = engine.take_events().iter().filter_map(|e| dispatcher.observe(e)).collect();
    assert_eq!(jobs.len(), 1);
  }
}
