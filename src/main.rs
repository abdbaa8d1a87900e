/////////////////////
// STATIONTIMER - station-style interval workout timer
//
// Queue up exercises, set the rounds, and work through them against a big
// countdown with beeps for the last three seconds of every phase.
// - 'space' starts, pauses and resumes
// - 'a' adds exercises from the library, 'p' loads today's circuit
// - 'e' asks the local coach model how to do the current exercise, 'o' switches model
// - 'r' resets, 'q' quits
//
#[macro_use] extern crate log;
extern crate simplelog;
#[macro_use]
extern crate ini;

mod app;
mod audio;
mod coach;
mod config;
mod effects;
mod engine;
mod explainer;
mod format;
mod library;
mod lookahead;
mod plan;
mod queue;
mod ticker;
mod tui;

use std::fs::File;
use std::sync::Arc;

use color_eyre::eyre::Result;
use simplelog::*;

use crate::app::{App, APP_VERSION};
use crate::explainer::{Explainer, HttpExplainer, DEFAULT_MODEL};
use crate::tui::Tui;

const LOG_FILE_NAME: &str = "stationtimer.log";

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  init_logging();

  let settings = config::load(config::CONF_FILE_NAME);
  info!("Settings: {:?}", settings);

  let explainer = HttpExplainer::new(&settings.explainer, DEFAULT_MODEL)?;
  explainer.set_model(&settings.model);
  let explainer: Arc<dyn Explainer> = Arc::new(explainer);

  let mut tui = Tui::new()?;
  let mut app = App::new(&settings, explainer, audio::beeper_for(settings.sound), tui.event_sender());
  app.run(&mut tui).await
}

fn init_logging() {
  let mut loggers: Vec<Box<dyn SharedLogger>> =
    vec![TermLogger::new(LevelFilter::Warn, Config::default(), TerminalMode::Mixed, ColorChoice::Auto)];
  match File::create(LOG_FILE_NAME) {
    Ok(log_file) => loggers.push(WriteLogger::new(LevelFilter::Info, Config::default(), log_file)),
    Err(e) => {
      eprintln!("Warning: Could not create log file: {}", e);
      eprintln!("Continuing with terminal logging only.");
    }
  }

  CombinedLogger::init(loggers).unwrap_or_else(|e| {
    eprintln!("Warning: Could not initialize logger: {}", e);
  });

  info!("Logging for {} initialized (redraw interval: {}ms)", APP_VERSION, tui::TICK_INTERVAL_MS);
}
