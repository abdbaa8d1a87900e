use std::fmt;

/// Upper bound for any work or rest duration, in seconds.
pub const MAX_SECONDS: u32 = 7200;
pub const DEFAULT_WORK_SECONDS: u32 = 40;
pub const DEFAULT_REST_SECONDS: u32 = 20;

/// Clamp a (possibly negative) second count into `[0, MAX_SECONDS]`.
pub fn clamp_seconds(seconds: i64) -> u32 {
  seconds.clamp(0, MAX_SECONDS as i64) as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u32);

impl fmt::Display for EntryId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExerciseEntry {
  pub id: EntryId,
  pub name: String,
  pub work_seconds: u32,
  pub rest_seconds: u32,
}

/// Durations given to entries appended without explicit values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Defaults {
  pub work_seconds: u32,
  pub rest_seconds: u32,
}

impl Default for Defaults {
  fn default() -> Self {
    Self { work_seconds: DEFAULT_WORK_SECONDS, rest_seconds: DEFAULT_REST_SECONDS }
  }
}

/// Ordered list of exercises; order is work order.
///
/// Ids are minted from a counter that never goes backwards, so an id is never
/// reused even after the entry holding it is removed or the queue is cleared.
/// Edits addressed to an unknown id are silently ignored and report `false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Queue {
  entries: Vec<ExerciseEntry>,
  next_id: u32,
  defaults: Defaults,
}

impl Default for Queue {
  fn default() -> Self {
    Self::new(Defaults::default())
  }
}

impl Queue {
  pub fn new(defaults: Defaults) -> Self {
    Self { entries: Vec::new(), next_id: 1, defaults }
  }

  pub fn defaults(&self) -> Defaults {
    self.defaults
  }

  pub fn adjust_default_work(&mut self, delta: i32) {
    self.defaults.work_seconds = clamp_seconds(self.defaults.work_seconds as i64 + delta as i64);
  }

  pub fn adjust_default_rest(&mut self, delta: i32) {
    self.defaults.rest_seconds = clamp_seconds(self.defaults.rest_seconds as i64 + delta as i64);
  }

  /// Add an exercise at the end. Missing durations come from the current defaults.
  pub fn append(&mut self, name: impl Into<String>, work_seconds: Option<u32>, rest_seconds: Option<u32>) -> EntryId {
    let id = EntryId(self.next_id);
    self.next_id += 1;
    let work = work_seconds.unwrap_or(self.defaults.work_seconds);
    let rest = rest_seconds.unwrap_or(self.defaults.rest_seconds);
    self.entries.push(ExerciseEntry {
      id,
      name: name.into(),
      work_seconds: clamp_seconds(work as i64),
      rest_seconds: clamp_seconds(rest as i64),
    });
    id
  }

  pub fn remove(&mut self, id: EntryId) -> bool {
    match self.position(id) {
      Some(i) => {
        self.entries.remove(i);
        true
      }
      None => false,
    }
  }

  pub fn move_up(&mut self, id: EntryId) -> bool {
    match self.position(id) {
      Some(i) if i > 0 => {
        self.entries.swap(i - 1, i);
        true
      }
      _ => false,
    }
  }

  pub fn move_down(&mut self, id: EntryId) -> bool {
    match self.position(id) {
      Some(i) if i + 1 < self.entries.len() => {
        self.entries.swap(i, i + 1);
        true
      }
      _ => false,
    }
  }

  pub fn set_work(&mut self, id: EntryId, seconds: u32) -> bool {
    self.edit(id, |entry| entry.work_seconds = clamp_seconds(seconds as i64))
  }

  pub fn set_rest(&mut self, id: EntryId, seconds: u32) -> bool {
    self.edit(id, |entry| entry.rest_seconds = clamp_seconds(seconds as i64))
  }

  pub fn adjust_work(&mut self, id: EntryId, delta: i32) -> bool {
    self.edit(id, |entry| entry.work_seconds = clamp_seconds(entry.work_seconds as i64 + delta as i64))
  }

  pub fn adjust_rest(&mut self, id: EntryId, delta: i32) -> bool {
    self.edit(id, |entry| entry.rest_seconds = clamp_seconds(entry.rest_seconds as i64 + delta as i64))
  }

  pub fn clear(&mut self) {
    self.entries.clear();
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&ExerciseEntry> {
    self.entries.get(index)
  }

  pub fn find(&self, id: EntryId) -> Option<&ExerciseEntry> {
    self.entries.iter().find(|e| e.id == id)
  }

  pub fn position(&self, id: EntryId) -> Option<usize> {
    self.entries.iter().position(|e| e.id == id)
  }

  pub fn iter(&self) -> impl Iterator<Item = &ExerciseEntry> {
    self.entries.iter()
  }

  fn edit(&mut self, id: EntryId, f: impl FnOnce(&mut ExerciseEntry)) -> bool {
    match self.entries.iter_mut().find(|e| e.id == id) {
      Some(entry) => {
        f(entry);
        true
      }
      None => false,
    }
  }
}
