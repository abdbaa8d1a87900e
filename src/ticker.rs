use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::tui::Event;

pub const SECOND: Duration = Duration::from_secs(1);

/// One `Event::Second` per second while started. The first one arrives a
/// full second after `start`.
pub struct Ticker {
  event_tx: UnboundedSender<Event>,
  task: Option<JoinHandle<()>>,
  cancellation_token: CancellationToken,
}

impl Ticker {
  pub fn new(event_tx: UnboundedSender<Event>) -> Self {
    Self { event_tx, task: None, cancellation_token: CancellationToken::new() }
  }

  pub fn is_running(&self) -> bool {
    self.task.is_some()
  }

  pub fn start(&mut self) {
    if self.is_running() {
      return;
    }
    self.cancellation_token = CancellationToken::new();
    let cancellation_token = self.cancellation_token.clone();
    let event_tx = self.event_tx.clone();
    self.task = Some(tokio::spawn(async move {
      let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + SECOND, SECOND);
      loop {
        tokio::select! {
          _ = cancellation_token.cancelled() => break,
          _ = interval.tick() => {
            if event_tx.send(Event::Second).is_err() {
              break;
            }
          }
        }
      }
    }));
    debug!("Ticker started");
  }

  pub fn stop(&mut self) {
    if let Some(task) = self.task.take() {
      self.cancellation_token.cancel();
      task.abort();
      debug!("Ticker stopped");
    }
  }
}

impl Drop for Ticker {
  fn drop(&mut self) {
    self.stop();
  }
}
