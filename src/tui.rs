use std::time::Duration;

use color_eyre::eyre::{eyre, Result};
use crossterm::event::{Event as CrosstermEvent, KeyEvent, KeyEventKind};
use futures::{FutureExt, StreamExt};
use ratatui::backend::CrosstermBackend as Backend;
use ratatui::Terminal;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::coach::ExplainUpdate;
use crate::library::LoadedLibrary;

pub const TICK_INTERVAL_MS: u64 = 100;        // Redraw interval in millisecs
const STOP_POLL: Duration = Duration::from_millis(250);
const STOP_ATTEMPTS: u32 = 10;

#[derive(Clone, Debug)]
pub enum Event {
  Error,
  /// Redraw; also expires the short-lived highlights.
  Tick,
  Key(KeyEvent),
  /// One second of workout time.
  Second,
  Explain(ExplainUpdate),
  ExplainerReady(Result<(), String>),
  Library(LoadedLibrary),
}

/// Owns the terminal and the input task feeding `Event`s to the app.
pub struct Tui {
  terminal: Terminal<Backend<std::io::Stderr>>,
  input_task: Option<JoinHandle<()>>,
  cancellation_token: CancellationToken,
  event_rx: UnboundedReceiver<Event>,
  event_tx: UnboundedSender<Event>,
  entered: bool,
}

impl Tui {
  pub fn new() -> Result<Tui> {
    let mut terminal = Terminal::new(Backend::new(std::io::stderr()))?;
    terminal.clear()?;
    let (event_tx, event_rx) = tokio::sync::mpsc::unbounded_channel();
    Ok(Self { terminal, input_task: None, cancellation_token: CancellationToken::new(), event_rx, event_tx, entered: false })
  }

  /// Sender for background tasks reporting back to the app.
  pub fn event_sender(&self) -> UnboundedSender<Event> {
    self.event_tx.clone()
  }

  pub async fn next(&mut self) -> Option<Event> {
    self.event_rx.recv().await
  }

  pub fn enter(&mut self) -> Result<()> {
    crossterm::terminal::enable_raw_mode()?;
    crossterm::execute!(std::io::stderr(), crossterm::terminal::EnterAlternateScreen, crossterm::cursor::Hide)?;
    self.entered = true;
    self.spawn_input_task();
    Ok(())
  }

  /// Restore the terminal. Safe to call more than once.
  pub fn exit(&mut self) -> Result<()> {
    self.stop_input_task()?;
    if self.entered {
      self.entered = false;
      crossterm::execute!(std::io::stderr(), crossterm::terminal::LeaveAlternateScreen, crossterm::cursor::Show)?;
      crossterm::terminal::disable_raw_mode()?;
    }
    Ok(())
  }

  /// Cancel the input task, aborting it if it does not wind down in time.
  fn stop_input_task(&mut self) -> Result<()> {
    self.cancellation_token.cancel();
    let Some(task) = self.input_task.take() else { return Ok(()) };
    for attempt in 1..=STOP_ATTEMPTS {
      if task.is_finished() {
        return Ok(());
      }
      if attempt == STOP_ATTEMPTS / 2 {
        warn!("Input task ignored cancellation, aborting it");
        task.abort();
      }
      std::thread::sleep(STOP_POLL);
    }
    error!("Input task still running after abort");
    Err(eyre!("Unable to stop input task"))
  }

  /// Forward key presses and a redraw `Tick` until cancelled.
  fn spawn_input_task(&mut self) {
    self.cancellation_token = CancellationToken::new();
    let cancellation_token = self.cancellation_token.clone();
    let event_tx = self.event_tx.clone();
    self.input_task = Some(tokio::spawn(async move {
      let mut reader = crossterm::event::EventStream::new();
      let mut redraw = tokio::time::interval(Duration::from_millis(TICK_INTERVAL_MS));
      loop {
        let event = tokio::select! {
          _ = cancellation_token.cancelled() => break,
          input = reader.next().fuse() => match input {
            Some(Ok(CrosstermEvent::Key(key))) if key.kind == KeyEventKind::Press => Event::Key(key),
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
              warn!("Terminal input error: {}", e);
              Event::Error
            }
            None => break,
          },
          _ = redraw.tick() => Event::Tick,
        };
        if let Err(e) = event_tx.send(event) {
          error!("Failed to send terminal event: {}", e);
          break;
        }
      }
    }));
  }
}

impl std::ops::Deref for Tui {
  type Target = Terminal<Backend<std::io::Stderr>>;

  fn deref(&self) -> &Self::Target {
    &self.terminal
  }
}

impl std::ops::DerefMut for Tui {
  fn deref_mut(&mut self) -> &mut Self::Target {
    &mut self.terminal
  }
}

impl Drop for Tui {
  fn drop(&mut self) {
    if let Err(e) = self.exit() {
      eprintln!("Error during cleanup: {}", e);
    }
  }
}
