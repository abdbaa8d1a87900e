//! Coaching explanations: which exercise gets explained, and when.
//!
//! `Coach` is plain bookkeeping and never awaits. Accepted requests come back
//! as an `ExplainJob` for the host to spawn with `run_job`; the job reports
//! through `ExplainUpdate`s tagged with the request token, and only updates
//! carrying the current token are shown.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use strum::EnumIs;
use tokio_util::sync::CancellationToken;

use crate::explainer::Explainer;

/// Requests closer together than this collapse into the last one.
pub const DEBOUNCE: Duration = Duration::from_millis(50);
/// Show a hint when a stream has produced nothing for this long.
pub const STALL_HINT_AFTER: Duration = Duration::from_secs(8);

/// Titles that are not exercises.
const NEVER_EXPLAINED: [&str; 3] = ["Recovery", "Ready", "Done!"];

#[derive(Debug, Clone, PartialEq, Eq, EnumIs)]
pub enum Availability {
  Checking,
  Available,
  Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExplainPart {
  Chunk(String),
  Stalled,
  Done,
  Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplainUpdate {
  pub token: u64,
  pub part: ExplainPart,
}

#[derive(Debug)]
pub struct ExplainJob {
  pub token: u64,
  pub name: String,
  pub cancel: CancellationToken,
}

#[derive(Debug)]
pub struct Coach {
  auto_explain: bool,
  availability: Availability,
  explained: HashSet<String>,
  current_name: String,
  /// Forced request waiting on a fresh availability check.
  deferred: Option<String>,
  token: u64,
  pending: Option<CancellationToken>,
  output: String,
  busy: bool,
  error: Option<String>,
  status: String,
}

impl Coach {
  pub fn new(auto_explain: bool) -> Self {
    Self {
      auto_explain,
      availability: Availability::Checking,
      explained: HashSet::new(),
      current_name: String::new(),
      deferred: None,
      token: 0,
      pending: None,
      output: String::new(),
      busy: false,
      error: None,
      status: "checking...".to_string(),
    }
  }

  pub fn auto_explain(&self) -> bool {
    self.auto_explain
  }

  pub fn toggle_auto_explain(&mut self) {
    self.auto_explain = !self.auto_explain;
  }

  pub fn availability(&self) -> &Availability {
    &self.availability
  }

  /// Record the result of an availability check. An unavailable explainer
  /// disables the feature; the timer carries on regardless. A request held
  /// back by `recheck` runs once the explainer answers.
  pub fn set_availability(&mut self, check: Result<(), String>) -> Option<ExplainJob> {
    let deferred = self.deferred.take();
    match check {
      Ok(()) => {
        self.status = "on-device".to_string();
        self.error = None;
        self.availability = Availability::Available;
        deferred.and_then(|name| self.request(&name, true))
      }
      Err(reason) => {
        warn!("Explainer unavailable: {}", reason);
        self.status = "unavailable".to_string();
        self.error = Some(reason.clone());
        self.availability = Availability::Unavailable(reason);
        None
      }
    }
  }

  /// A forced request against an unavailable explainer. Holds `name` back
  /// and returns `true` when the host should check availability again.
  pub fn recheck(&mut self, name: &str) -> bool {
    let name = name.trim();
    if !self.availability.is_unavailable() || !Self::explainable(name) {
      return false;
    }
    info!("Checking explainer again for {}", name);
    self.deferred = Some(name.to_string());
    self.availability = Availability::Checking;
    self.status = "checking...".to_string();
    self.error = None;
    true
  }

  pub fn model_switched(&mut self, model: &str) {
    info!("Model switched to {}", model);
    self.status = format!("model switched to {}", model);
  }

  fn explainable(name: &str) -> bool {
    !name.is_empty() && !NEVER_EXPLAINED.contains(&name)
  }

  pub fn output(&self) -> &str {
    &self.output
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  pub fn is_busy(&self) -> bool {
    self.busy
  }

  pub fn status(&self) -> &str {
    &self.status
  }

  pub fn current_name(&self) -> &str {
    &self.current_name
  }

  /// A fresh run: every exercise may be explained once more.
  pub fn begin_run(&mut self) {
    self.explained.clear();
  }

  /// Forget the run and blank the panel. An in-flight job keeps running, but
  /// its output no longer matches the current token and is dropped.
  pub fn on_reset(&mut self) {
    self.explained.clear();
    self.current_name.clear();
    self.token += 1;
    self.output.clear();
    self.error = None;
    self.busy = false;
  }

  /// Work began on `name`. Explains it if auto-explain is on and this is the
  /// first time the name comes up in the current run.
  pub fn on_work_started(&mut self, name: &str) -> Option<ExplainJob> {
    if !self.auto_explain || self.availability.is_unavailable() {
      return None;
    }
    if !self.explained.insert(name.to_string()) {
      return None;
    }
    self.request(name, false)
  }

  /// Ask for an explanation. Without `force`, asking again for the name that
  /// is already shown does nothing.
  pub fn request(&mut self, name: &str, force: bool) -> Option<ExplainJob> {
    let name = name.trim();
    if !Self::explainable(name) || self.availability.is_unavailable() {
      return None;
    }
    if !force && name == self.current_name {
      return None;
    }
    if let Some(previous) = self.pending.take() {
      previous.cancel();
    }
    self.current_name = name.to_string();
    self.token += 1;
    self.output.clear();
    self.error = None;
    self.busy = true;
    self.status = "generating...".to_string();
    let cancel = CancellationToken::new();
    self.pending = Some(cancel.clone());
    Some(ExplainJob { token: self.token, name: self.current_name.clone(), cancel })
  }

  /// Apply an update from a job. Returns `false` for stale updates, which are dropped.
  pub fn accept(&mut self, update: ExplainUpdate) -> bool {
    if update.token != self.token {
      return false;
    }
    match update.part {
      ExplainPart::Chunk(text) => self.output.push_str(&text),
      ExplainPart::Stalled => self.status = "generating... (no tokens yet, is the model still loading?)".to_string(),
      ExplainPart::Done => {
        self.busy = false;
        self.pending = None;
        self.status = "on-device".to_string();
      }
      ExplainPart::Failed(message) => {
        self.busy = false;
        self.pending = None;
        self.status = "unavailable".to_string();
        self.error = Some(message);
      }
    }
    true
  }
}

/// Drive one explanation: wait out the debounce, then forward the stream.
/// Cancelling the job's token stops it at any point without further updates.
pub async fn run_job<F>(job: ExplainJob, explainer: Arc<dyn Explainer>, mut deliver: F)
where
  F: FnMut(ExplainUpdate) + Send + 'static,
{
  let ExplainJob { token, name, cancel } = job;
  tokio::select! {
    _ = cancel.cancelled() => return,
    _ = tokio::time::sleep(DEBOUNCE) => {}
  }

  debug!("Explaining {} (request {})", name, token);
  let mut stream = explainer.explain(&name);
  let stall = tokio::time::sleep(STALL_HINT_AFTER);
  tokio::pin!(stall);
  let mut heard = false;
  loop {
    tokio::select! {
      _ = cancel.cancelled() => return,
      _ = &mut stall, if !heard => {
        heard = true;
        deliver(ExplainUpdate { token, part: ExplainPart::Stalled });
      }
      item = stream.next() => match item {
        Some(Ok(text)) => {
          heard = true;
          deliver(ExplainUpdate { token, part: ExplainPart::Chunk(text) });
        }
        Some(Err(e)) => {
          deliver(ExplainUpdate { token, part: ExplainPart::Failed(e.to_string()) });
          return;
        }
        None => {
          deliver(ExplainUpdate { token, part: ExplainPart::Done });
          return;
        }
      }
    }
  }
}
