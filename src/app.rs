use std::sync::Arc;
use std::time::{Duration, Instant};

use build_time::build_time_local;
use chrono::Local;
use color_eyre::eyre::{eyre, Result};
use crossterm::event::{KeyCode, KeyEvent};
use rand::{seq::SliceRandom, thread_rng};
use ratatui::{prelude::*, widgets::*};
use strum::EnumIs;
use tokio::sync::mpsc::UnboundedSender;
use tui_big_text::BigText;

use crate::audio::Beeper;
use crate::coach::{self, Coach, ExplainJob, ExplainUpdate};
use crate::config::Settings;
use crate::effects::Dispatcher;
use crate::engine::{self, Engine, EngineEvent, Phase, RunConfiguration};
use crate::explainer::Explainer;
use crate::format::format_duration;
use crate::library::{self, Category, LoadedLibrary};
use crate::lookahead::next_up;
use crate::plan::{self, PlanStore, Station, WorkoutMode, PLAN_REST_SECONDS, PLAN_WORK_SECONDS};
use crate::queue::{Defaults, EntryId, Queue};
use crate::ticker::Ticker;
use crate::tui::{Event, Tui};

pub const APP_VERSION: &str = "STATIONTIMER V0.1.0";

const NUDGE_FOR: Duration = Duration::from_millis(700);   // Queue highlight when starting with nothing queued
const FLASH_FOR: Duration = Duration::from_millis(2500);  // Timer flash once the run is done
const STEP_SECONDS: i32 = 5;                               // Seconds per duration adjustment
const COUNTDOWN_RED: u32 = 3;                              // Timer turns red at this many seconds left
const TEST_EXERCISE: &str = "Air Squat";

const DONE_QUOTES: [&str; 6] = [
  "Done",
  "Finished",
  "All set",
  "Great job - session complete.",
  "No next workout - time to recover.",
  "Stronger every day.",
];
const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, EnumIs)]
enum AppState {
  #[default]
  Timer,
  Picking,
  Quitting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Message {
  Toggle,
  Reset,
  Quit,
  OpenPicker,
  ClosePicker,
  PickerInput(char),
  PickerBackspace,
  PickerUp,
  PickerDown,
  PickerAdd,
  SelectUp,
  SelectDown,
  MoveUp,
  MoveDown,
  Remove,
  ClearQueue,
  AdjustWork(i32),
  AdjustRest(i32),
  AdjustSets(i32),
  AdjustSetRest(i32),
  AdjustDefaultWork(i32),
  AdjustDefaultRest(i32),
  Explain,
  ExplainTest,
  ToggleAutoExplain,
  CycleModel,
  LoadPlan,
  RerollPlan,
  CycleMode,
  DismissWarning,
  Second,
  Refresh,
  Explained(ExplainUpdate),
  ExplainerReady(Result<(), String>),
  LibraryLoaded(LoadedLibrary),
}

pub struct App {
  state: AppState,
  engine: Engine,
  dispatcher: Dispatcher,
  explainer: Arc<dyn Explainer>,
  models: Vec<String>,
  ticker: Ticker,
  event_tx: UnboundedSender<Event>,
  library_source: String,
  library: Vec<Category>,
  warning: Option<String>,
  query: String,
  picker_cursor: usize,
  selected: usize,
  mode: WorkoutMode,
  plan_store: PlanStore,
  plan_key: Option<String>,
  stations: Vec<Station>,
  nudge_until: Option<Instant>,
  flash_until: Option<Instant>,
  done_quote: Option<&'static str>,
  frame: usize,
}

impl App {
  pub fn new(
    settings: &Settings,
    explainer: Arc<dyn Explainer>,
    beeper: Box<dyn Beeper>,
    event_tx: UnboundedSender<Event>,
  ) -> Self {
    let queue = Queue::new(Defaults { work_seconds: settings.work_seconds, rest_seconds: settings.rest_seconds });
    let config = RunConfiguration { total_sets: settings.sets, inter_set_rest_seconds: settings.set_rest_seconds };
    Self {
      state: Default::default(),
      engine: Engine::new(queue, config),
      dispatcher: Dispatcher::new(beeper, Coach::new(settings.auto_explain)),
      explainer,
      models: settings.models.clone(),
      ticker: Ticker::new(event_tx.clone()),
      event_tx,
      library_source: settings.library.clone(),
      library: library::fallback(),
      warning: None,
      query: String::new(),
      picker_cursor: 0,
      selected: 0,
      mode: settings.mode,
      plan_store: PlanStore::new(&settings.plan_dir),
      plan_key: None,
      stations: Vec::new(),
      nudge_until: None,
      flash_until: None,
      done_quote: None,
      frame: 0,
    }
  }

  pub async fn run(&mut self, tui: &mut Tui) -> Result<()> {
    self.spawn_startup_tasks();
    tui.enter()?;
    while !self.state.is_quitting() {
      tui.draw(|f| self.ui(f))?;
      let event = tui.next().await.ok_or(eyre!("Unable to get event"))?; // blocks until next event
      let message = self.handle_event(event)?;
      self.update(message)?;
    }
    self.ticker.stop();
    tui.exit()?;
    println!("Thanks for using {} (built: {})\n", APP_VERSION, build_time_local!("%Y-%b-%d at %H:%M:%S"));
    Ok(())
  }

  /// Explainer check and library load; both report back as events.
  fn spawn_startup_tasks(&self) {
    self.spawn_readiness_check();

    let source = self.library_source.clone();
    let event_tx = self.event_tx.clone();
    tokio::spawn(async move {
      let loaded = library::load(&source).await;
      if let Err(e) = event_tx.send(Event::Library(loaded)) {
        error!("Failed to send exercise library: {}", e);
      }
    });
  }

  // Event handler (keyboard, timers, background results)
  fn handle_event(&self, event: Event) -> Result<Message> {
    let msg = match event {
      Event::Key(_) if self.warning.is_some() => Message::DismissWarning,
      Event::Key(key) if self.state.is_picking() => Self::picker_key(key),
      Event::Key(key) => Self::timer_key(key),
      Event::Second => Message::Second,
      Event::Explain(update) => Message::Explained(update),
      Event::ExplainerReady(check) => Message::ExplainerReady(check),
      Event::Library(loaded) => Message::LibraryLoaded(loaded),
      Event::Tick | Event::Error => Message::Refresh,
    };
    Ok(msg)
  }

  fn timer_key(key: KeyEvent) -> Message {
    match key.code {
      KeyCode::Char(' ') => Message::Toggle,
      KeyCode::Char('r') | KeyCode::Char('R') => Message::Reset,
      KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Message::Quit,
      KeyCode::Char('a') | KeyCode::Char('A') => Message::OpenPicker,
      KeyCode::Up => Message::SelectUp,
      KeyCode::Down => Message::SelectDown,
      KeyCode::Char('K') => Message::MoveUp,
      KeyCode::Char('J') => Message::MoveDown,
      KeyCode::Char('x') | KeyCode::Char('X') | KeyCode::Delete => Message::Remove,
      KeyCode::Char('c') | KeyCode::Char('C') => Message::ClearQueue,
      KeyCode::Char('+') | KeyCode::Char('=') => Message::AdjustWork(STEP_SECONDS),
      KeyCode::Char('-') | KeyCode::Char('_') => Message::AdjustWork(-STEP_SECONDS),
      KeyCode::Char(']') => Message::AdjustRest(STEP_SECONDS),
      KeyCode::Char('[') => Message::AdjustRest(-STEP_SECONDS),
      KeyCode::Char('>') => Message::AdjustSets(1),
      KeyCode::Char('<') => Message::AdjustSets(-1),
      KeyCode::Char('.') => Message::AdjustSetRest(STEP_SECONDS),
      KeyCode::Char(',') => Message::AdjustSetRest(-STEP_SECONDS),
      KeyCode::Char('}') => Message::AdjustDefaultWork(STEP_SECONDS),
      KeyCode::Char('{') => Message::AdjustDefaultWork(-STEP_SECONDS),
      KeyCode::Char(')') => Message::AdjustDefaultRest(STEP_SECONDS),
      KeyCode::Char('(') => Message::AdjustDefaultRest(-STEP_SECONDS),
      KeyCode::Char('e') | KeyCode::Char('E') => Message::Explain,
      KeyCode::Char('t') | KeyCode::Char('T') => Message::ExplainTest,
      KeyCode::Char('m') | KeyCode::Char('M') => Message::ToggleAutoExplain,
      KeyCode::Char('o') | KeyCode::Char('O') => Message::CycleModel,
      KeyCode::Char('p') => Message::LoadPlan,
      KeyCode::Char('P') => Message::RerollPlan,
      KeyCode::Char('n') | KeyCode::Char('N') => Message::CycleMode,
      _ => Message::Refresh,
    }
  }

  /// While the picker is open every printable key goes to the search query.
  fn picker_key(key: KeyEvent) -> Message {
    match key.code {
      KeyCode::Esc => Message::ClosePicker,
      KeyCode::Enter => Message::PickerAdd,
      KeyCode::Backspace => Message::PickerBackspace,
      KeyCode::Up => Message::PickerUp,
      KeyCode::Down => Message::PickerDown,
      KeyCode::Char(c) => Message::PickerInput(c),
      _ => Message::Refresh,
    }
  }

  fn update(&mut self, message: Message) -> Result<()> {
    match message {
      Message::Toggle => self.engine.toggle(),
      Message::Reset => self.engine.reset(),
      Message::Quit => self.quit(),
      Message::OpenPicker => self.open_picker(),
      Message::ClosePicker => self.state = AppState::Timer,
      Message::PickerInput(c) => {
        self.query.push(c);
        self.picker_cursor = 0;
      }
      Message::PickerBackspace => {
        self.query.pop();
        self.picker_cursor = 0;
      }
      Message::PickerUp => self.picker_cursor = self.picker_cursor.saturating_sub(1),
      Message::PickerDown => {
        if self.picker_cursor + 1 < self.picker_items().len() {
          self.picker_cursor += 1;
        }
      }
      Message::PickerAdd => self.add_picked(),
      Message::SelectUp => self.selected = self.selected.saturating_sub(1),
      Message::SelectDown => self.selected += 1,
      Message::MoveUp => {
        if self.edit_selected(Queue::move_up) {
          self.selected -= 1;
        }
      }
      Message::MoveDown => {
        if self.edit_selected(Queue::move_down) {
          self.selected += 1;
        }
      }
      Message::Remove => {
        self.edit_selected(Queue::remove);
      }
      Message::ClearQueue => self.clear_queue(),
      Message::AdjustWork(delta) => {
        self.edit_selected(|q, id| q.adjust_work(id, delta));
      }
      Message::AdjustRest(delta) => {
        self.edit_selected(|q, id| q.adjust_rest(id, delta));
      }
      Message::AdjustSets(delta) => self.engine.edit_config(|c| c.adjust_sets(delta)),
      Message::AdjustSetRest(delta) => self.engine.edit_config(|c| c.adjust_set_rest(delta)),
      Message::AdjustDefaultWork(delta) => self.engine.edit_queue(|q| q.adjust_default_work(delta)),
      Message::AdjustDefaultRest(delta) => self.engine.edit_queue(|q| q.adjust_default_rest(delta)),
      Message::Explain => self.explain_current(),
      Message::ExplainTest => self.force_explain(TEST_EXERCISE),
      Message::ToggleAutoExplain => {
        self.dispatcher.coach_mut().toggle_auto_explain();
        info!("Auto-explain {}", if self.dispatcher.coach().auto_explain() { "on" } else { "off" });
      }
      Message::CycleModel => self.cycle_model(),
      Message::LoadPlan => self.load_plan(false),
      Message::RerollPlan => self.load_plan(true),
      Message::CycleMode => self.mode = self.mode.next(),
      Message::DismissWarning => self.warning = None,
      Message::Second => self.engine.tick(),
      Message::Refresh => self.frame = self.frame.wrapping_add(1),
      Message::Explained(update) => {
        self.dispatcher.coach_mut().accept(update);
      }
      Message::ExplainerReady(check) => {
        let job = self.dispatcher.coach_mut().set_availability(check);
        self.spawn_job(job);
      }
      Message::LibraryLoaded(loaded) => {
        self.library = loaded.categories;
        self.warning = loaded.warning;
        self.picker_cursor = 0;
      }
    }
    self.after_update();
    Ok(())
  }

  /// React to what the engine reported, then bring the ticker and the queue
  /// cursor in line with the new state.
  fn after_update(&mut self) {
    for event in self.engine.take_events() {
      match event {
        EngineEvent::Nudge => self.nudge_until = Some(Instant::now() + NUDGE_FOR),
        EngineEvent::RunStarted | EngineEvent::Reset => {
          self.flash_until = None;
          self.done_quote = None;
        }
        EngineEvent::Done => {
          self.flash_until = Some(Instant::now() + FLASH_FOR);
          self.done_quote = DONE_QUOTES.choose(&mut thread_rng()).copied();
          info!("Run complete");
        }
        _ => {}
      }
      let job = self.dispatcher.observe(&event);
      self.spawn_job(job);
    }

    if self.engine.is_running() {
      self.ticker.start();
    } else {
      self.ticker.stop();
    }
    self.selected = self.selected.min(self.engine.queue().len().saturating_sub(1));
  }

  fn spawn_readiness_check(&self) {
    let explainer = self.explainer.clone();
    let event_tx = self.event_tx.clone();
    tokio::spawn(async move {
      let check = explainer.ready().await.map_err(|e| e.to_string());
      if let Err(e) = event_tx.send(Event::ExplainerReady(check)) {
        error!("Failed to send explainer check result: {}", e);
      }
    });
  }

  fn spawn_job(&self, job: Option<ExplainJob>) {
    let Some(job) = job else { return };
    let event_tx = self.event_tx.clone();
    tokio::spawn(coach::run_job(job, self.explainer.clone(), move |update| {
      if let Err(e) = event_tx.send(Event::Explain(update)) {
        debug!("Dropped explanation update: {}", e);
      }
    }));
  }

  fn explain_current(&mut self) {
    let name = match self.engine.current_exercise() {
      Some(name) => name.to_string(),
      None => self.dispatcher.coach().current_name().to_string(),
    };
    self.force_explain(&name);
  }

  /// Explain `name` now. An explainer that failed its check is asked again
  /// first, and the request runs if it answers.
  fn force_explain(&mut self, name: &str) {
    let coach = self.dispatcher.coach_mut();
    if coach.availability().is_unavailable() {
      if coach.recheck(name) {
        self.spawn_readiness_check();
      }
      return;
    }
    let job = coach.request(name, true);
    self.spawn_job(job);
  }

  /// Switch the explainer to the next configured model.
  fn cycle_model(&mut self) {
    if self.models.len() < 2 {
      return;
    }
    let current = self.explainer.model();
    let next = self.models.iter().position(|m| *m == current).map_or(0, |i| (i + 1) % self.models.len());
    let model = self.models[next].clone();
    self.explainer.set_model(&model);
    self.dispatcher.coach_mut().model_switched(&model);
  }

  fn quit(&mut self) {
    self.state = AppState::Quitting;
  }

  fn open_picker(&mut self) {
    self.state = AppState::Picking;
    self.query.clear();
    self.picker_cursor = 0;
  }

  /// Matching library items, in display order.
  fn picker_items(&self) -> Vec<String> {
    library::filter(&self.library, &self.query).into_iter().flat_map(|c| c.items).collect()
  }

  fn add_picked(&mut self) {
    let Some(name) = self.picker_items().into_iter().nth(self.picker_cursor) else { return };
    info!("Queued {}", name);
    self.engine.edit_queue(|q| q.append(name, None, None));
    self.selected = self.engine.queue().len().saturating_sub(1);
  }

  /// Apply `edit` to the entry under the cursor. `false` when nothing changed.
  fn edit_selected(&mut self, edit: impl FnOnce(&mut Queue, EntryId) -> bool) -> bool {
    let Some(id) = self.engine.queue().get(self.selected).map(|e| e.id) else { return false };
    self.engine.edit_queue(|q| edit(q, id))
  }

  fn clear_queue(&mut self) {
    self.engine.reset();
    self.engine.edit_queue(|q| q.clear());
    self.stations.clear();
    self.plan_key = None;
    self.selected = 0;
  }

  fn load_plan(&mut self, reroll: bool) {
    let today = Local::now().date_naive();
    let plan = plan::daily_plan(&self.plan_store, today, self.mode, reroll, &mut thread_rng());
    self.engine.reset();
    self.engine.edit_queue(|q| {
      q.clear();
      for station in &plan.stations {
        q.append(station.name.clone(), Some(PLAN_WORK_SECONDS), Some(PLAN_REST_SECONDS));
      }
    });
    info!("Loaded plan {} ({} stations)", plan.key, plan.stations.len());
    self.plan_key = Some(plan.key);
    self.stations = plan.stations;
    self.selected = 0;
  }

  fn is_nudging(&self) -> bool {
    self.nudge_until.map_or(false, |until| Instant::now() < until)
  }

  fn is_flashing(&self) -> bool {
    self.flash_until.map_or(false, |until| Instant::now() < until)
  }

  fn title_text(&self) -> String {
    let state = self.engine.state();
    match state.phase {
      Phase::Work => format!(
        "{} (Round {}/{})",
        self.engine.current_exercise().unwrap_or_default(),
        state.set_index + 1,
        self.engine.config().total_sets
      ),
      Phase::InterExerciseRest => "Recovery".to_string(),
      Phase::InterSetRest => "Recovery (between sets)".to_string(),
      Phase::Idle if state.completed => "Done!".to_string(),
      Phase::Idle => "Ready".to_string(),
    }
  }

  fn badge_text(&self) -> String {
    let state = self.engine.state();
    match next_up(self.engine.queue(), self.engine.config(), state) {
      Some(next) => format!("Next: {}", next),
      None if state.completed => self.done_quote.unwrap_or(DONE_QUOTES[0]).to_string(),
      None => String::new(),
    }
  }

  /// Seconds shown on the big timer. Before a run this previews the first work period.
  fn timer_seconds(&self) -> u32 {
    let state = self.engine.state();
    if state.phase.is_idle() && !state.completed {
      self.engine.queue().get(0).map_or(0, |e| e.work_seconds)
    } else {
      state.seconds_remaining
    }
  }

  fn planned_total(&self) -> String {
    let seconds = engine::planned_duration(self.engine.queue(), self.engine.config());
    format_duration(u32::try_from(seconds).unwrap_or(u32::MAX))
  }

  fn ui(&mut self, f: &mut Frame) {
    let layout = self.layout(f.size());
    f.render_widget(self.title_paragraph(), layout[0]);
    f.render_widget(self.exercise_paragraph(), layout[1]);
    f.render_widget(self.timer_paragraph(), layout[2]);
    f.render_widget(self.badge_paragraph(), layout[3]);

    let panels = Layout::default()
      .direction(Direction::Horizontal)
      .constraints(vec![Constraint::Percentage(50), Constraint::Percentage(50)])
      .split(layout[4]);
    f.render_widget(self.queue_list(), panels[0]);
    if self.state.is_picking() {
      f.render_widget(self.picker_list(), panels[1]);
    } else {
      f.render_widget(self.coach_paragraph(), panels[1]);
    }

    f.render_widget(self.settings_paragraph(), layout[5]);
    f.render_widget(self.help_paragraph(), layout[6]);

    if let Some(warning) = &self.warning {
      let area = centered(f.size(), 60, 5);
      f.render_widget(Clear, area);
      f.render_widget(
        Paragraph::new(warning.as_str())
          .wrap(Wrap { trim: true })
          .block(Block::default().borders(Borders::ALL).title("Warning (any key)").border_style(Style::new().yellow())),
        area,
      );
    }
  }

  fn layout(&self, area: Rect) -> Vec<Rect> {
    let layout = Layout::default()
      .direction(Direction::Vertical)
      .constraints(vec![
        Constraint::Length(1), // top bar
        Constraint::Length(2), // exercise and station details
        Constraint::Length(9), // timer
        Constraint::Length(1), // next up
        Constraint::Min(6),    // queue and coach/picker
        Constraint::Length(1), // run settings
        Constraint::Length(2), // help
      ])
      .split(area);
    layout.to_vec()
  }

  fn title_paragraph(&self) -> Paragraph<'_> {
    let run = match self.engine.run_state() {
      engine::RunState::Stopped => "stopped",
      engine::RunState::Running => "running",
      engine::RunState::Paused => "paused",
    };
    let mut spans = vec![APP_VERSION.into(), " - ".into(), run.dim()];
    if let Some(key) = &self.plan_key {
      spans.push(" - plan ".into());
      spans.push(key.as_str().dim());
    }
    Paragraph::new(Line::from(spans)).gray()
  }

  fn exercise_paragraph(&self) -> Paragraph<'_> {
    let state = self.engine.state();
    let title_style = match state.phase {
      Phase::Work => Style::new().bold().white(),
      Phase::Idle => Style::new().blue(),
      _ => Style::new().cyan(),
    };
    let mut lines = vec![Line::from(Span::styled(self.title_text(), title_style))];
    let station = self.engine.current_exercise().and_then(|name| self.stations.iter().find(|s| s.name == name));
    if let Some(station) = station.filter(|_| state.phase.is_work()) {
      lines.push(Line::from(vec![
        station.equip.as_str().into(),
        " | ".dim(),
        station.cues.as_str().italic(),
        " | ".dim(),
        station.url.as_str().dim(),
      ]));
    }
    Paragraph::new(lines)
  }

  fn timer_paragraph(&self) -> BigText<'_> {
    let state = self.engine.state();
    let mut style = Style::new().gray();
    if self.is_flashing() {
      style = if self.frame % 6 < 3 { Style::new().red() } else { Style::new().white() };
    } else if self.engine.is_running() {
      style = match state.phase {
        _ if state.seconds_remaining <= COUNTDOWN_RED => Style::new().red(),
        Phase::Work => Style::new().green(),
        _ => Style::new().yellow(),
      };
    }
    let lines = vec![format_duration(self.timer_seconds()).into()];
    tui_big_text::BigTextBuilder::default()
      .lines(lines)
      .style(style)
      .build()
      .expect("lines is always set")
  }

  fn badge_paragraph(&self) -> Paragraph<'_> {
    Paragraph::new(self.badge_text()).magenta()
  }

  fn queue_list(&self) -> List<'_> {
    let current = self.engine.state().exercise_index;
    let items: Vec<ListItem> = self
      .engine
      .queue()
      .iter()
      .enumerate()
      .map(|(i, e)| {
        let marker = if current == Some(i) { "> " } else { "  " };
        let text = format!("{}{:>2}. {}  {}s / {}s", marker, i + 1, e.name, e.work_seconds, e.rest_seconds);
        let item = ListItem::new(text);
        if i == self.selected {
          item.style(Style::new().reversed())
        } else {
          item
        }
      })
      .collect();
    let mut block = Block::default().borders(Borders::ALL).title(format!("Queue ({})", self.engine.queue().len()));
    if self.is_nudging() {
      block = block.border_style(Style::new().yellow().bold());
    }
    List::new(items).block(block)
  }

  fn picker_list(&self) -> List<'_> {
    let mut items = Vec::new();
    let mut index = 0;
    for category in library::filter(&self.library, &self.query) {
      items.push(ListItem::new(category.category).style(Style::new().bold().dim()));
      for name in category.items {
        let item = ListItem::new(format!("  {}", name));
        items.push(if index == self.picker_cursor { item.style(Style::new().reversed()) } else { item });
        index += 1;
      }
    }
    let title = format!("Add exercise - search: {}_", self.query);
    List::new(items).block(Block::default().borders(Borders::ALL).title(title).border_style(Style::new().cyan()))
  }

  fn coach_paragraph(&self) -> Paragraph<'_> {
    let coach = self.dispatcher.coach();
    let auto = if coach.auto_explain() { "auto" } else { "manual" };
    let title = format!("Coach {} - {} ({}) - {}", coach.current_name(), coach.status(), self.explainer.model(), auto);

    let mut lines: Vec<Line> = Vec::new();
    if coach.is_busy() && coach.output().is_empty() {
      let spinner = format!("{} thinking...", SPINNER[self.frame % SPINNER.len()]);
      lines.push(Line::from(Span::styled(spinner, Style::new().dim())));
    }
    lines.extend(coach.output().lines().map(Line::from));
    if let Some(error) = coach.error() {
      lines.push(Line::from(Span::styled(error, Style::new().red())));
    }
    Paragraph::new(lines).wrap(Wrap { trim: false }).block(Block::default().borders(Borders::ALL).title(title))
  }

  fn settings_paragraph(&self) -> Paragraph<'_> {
    let config = self.engine.config();
    let defaults = self.engine.queue().defaults();
    let text = Line::from(vec![
      "sets ".dim(),
      config.total_sets.to_string().into(),
      "  set rest ".dim(),
      format!("{}s", config.inter_set_rest_seconds).into(),
      "  defaults ".dim(),
      format!("{}s/{}s", defaults.work_seconds, defaults.rest_seconds).into(),
      "  plan mode ".dim(),
      self.mode.to_string().into(),
      "  total ".dim(),
      self.planned_total().into(),
    ]);
    Paragraph::new(text).gray()
  }

  fn help_paragraph(&self) -> Paragraph<'_> {
    if self.state.is_picking() {
      let help_text = Line::from(vec![
        "type ".into(),
        "search".dim(),
        " : up/down ".into(),
        "choose".dim(),
        " : enter ".into(),
        "add".dim(),
        " : esc ".into(),
        "close".dim(),
      ]);
      return Paragraph::new(help_text).gray();
    }
    let space_action = match self.engine.run_state() {
      engine::RunState::Running => "pause",
      engine::RunState::Paused => "resume",
      engine::RunState::Stopped => "start",
    };
    let help_text = vec![
      Line::from(vec![
        "space ".into(),
        space_action.dim(),
        " : r ".into(),
        "reset".dim(),
        " : a ".into(),
        "add".dim(),
        " : K/J ".into(),
        "move".dim(),
        " : x ".into(),
        "remove".dim(),
        " : c ".into(),
        "clear".dim(),
        " : +/- ".into(),
        "work".dim(),
        " : ]/[ ".into(),
        "rest".dim(),
        " : q ".into(),
        "quit".dim(),
      ]),
      Line::from(vec![
        "</> ".into(),
        "sets".dim(),
        " : ,/. ".into(),
        "set rest".dim(),
        " : {/} (/) ".into(),
        "defaults".dim(),
        " : e ".into(),
        "explain".dim(),
        " : t ".into(),
        "test".dim(),
        " : m ".into(),
        "auto".dim(),
        " : o ".into(),
        "model".dim(),
        " : p/P ".into(),
        "plan/reroll".dim(),
        " : n ".into(),
        "mode".dim(),
      ]),
    ];
    Paragraph::new(help_text).gray()
  }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
  let width = width.min(area.width);
  let height = height.min(area.height);
  Rect::new(area.x + (area.width - width) / 2, area.y + (area.height - height) / 2, width, height)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::audio::SilentBeeper;
  use crate::coach::ExplainPart;
  use crate::explainer::ExplainError;
  use crossterm::event::KeyModifiers;
  use futures::future::BoxFuture;
  use futures::stream::BoxStream;
  use futures::{FutureExt, StreamExt};
  use std::sync::atomic::{AtomicBool, Ordering};
  use std::sync::Mutex;
  use ratatui::backend::TestBackend;
  use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

  struct Offline;

  impl Explainer for Offline {
    fn ready(&self) -> BoxFuture<'static, Result<(), ExplainError>> {
      async { Err(ExplainError::Unreachable("http://localhost:1".into())) }.boxed()
    }

    fn set_model(&self, _name: &str) {}

    fn model(&self) -> String {
      "offline".to_string()
    }

    fn explain(&self, _name: &str) -> BoxStream<'static, Result<String, ExplainError>> {
      futures::stream::iter(vec![Ok("Hips back".to_string())]).boxed()
    }
  }

  /// A local server that can be started mid-session and serves several models.
  struct Local {
    up: AtomicBool,
    model: Mutex<String>,
  }

  impl Local {
    fn new(up: bool) -> Arc<Self> {
      Arc::new(Self { up: AtomicBool::new(up), model: Mutex::new("llama3.2:1b".to_string()) })
    }
  }

  impl Explainer for Local {
    fn ready(&self) -> BoxFuture<'static, Result<(), ExplainError>> {
      let up = self.up.load(Ordering::SeqCst);
      async move { if up { Ok(()) } else { Err(ExplainError::Unreachable("http://localhost:11434".into())) } }.boxed()
    }

    fn set_model(&self, name: &str) {
      *self.model.lock().unwrap() = name.to_string();
    }

    fn model(&self) -> String {
      self.model.lock().unwrap().clone()
    }

    fn explain(&self, _name: &str) -> BoxStream<'static, Result<String, ExplainError>> {
      futures::stream::iter(vec![Ok("Brace".to_string())]).boxed()
    }
  }

  fn app_with(explainer: Arc<dyn Explainer>, models: &[&str]) -> (App, UnboundedReceiver<Event>) {
    let (tx, rx) = unbounded_channel();
    let settings = Settings {
      auto_explain: false,
      models: models.iter().map(|m| m.to_string()).collect(),
      ..Settings::default()
    };
    (App::new(&settings, explainer, Box::new(SilentBeeper), tx), rx)
  }

  /// Feed events back into the app until the current explanation finishes.
  async fn pump_until_done(app: &mut App, rx: &mut UnboundedReceiver<Event>) {
    loop {
      let event = rx.recv().await.unwrap();
      let done = matches!(&event, Event::Explain(ExplainUpdate { part: ExplainPart::Done, .. }));
      send(app, event);
      if done {
        break;
      }
    }
  }

  fn app_in(plan_dir: &std::path::Path) -> (App, UnboundedReceiver<Event>) {
    let (tx, rx) = unbounded_channel();
    let settings = Settings { auto_explain: false, plan_dir: plan_dir.to_string_lossy().into_owned(), ..Settings::default() };
    (App::new(&settings, Arc::new(Offline), Box::new(SilentBeeper), tx), rx)
  }

  fn app() -> (App, UnboundedReceiver<Event>) {
    app_in(std::path::Path::new("/nonexistent/stationtimer-plans"))
  }

  fn key(app: &mut App, code: KeyCode) {
    let message = app.handle_event(Event::Key(KeyEvent::new(code, KeyModifiers::NONE))).unwrap();
    app.update(message).unwrap();
  }

  fn send(app: &mut App, event: Event) {
    let message = app.handle_event(event).unwrap();
    app.update(message).unwrap();
  }

  fn queue_names(app: &App) -> Vec<String> {
    app.engine.queue().iter().map(|e| e.name.clone()).collect()
  }

  fn add(app: &mut App, names: &[&str]) {
    for name in names {
      app.engine.edit_queue(|q| q.append(*name, Some(2), Some(1)));
    }
  }

  #[test]
  fn test_default_app_creation() {
    let (app, _rx) = app();
    assert_eq!(app.state, AppState::Timer);
    assert!(app.engine.queue().is_empty());
    assert_eq!(app.engine.config().total_sets, 1);
    assert_eq!(app.title_text(), "Ready");
    assert_eq!(app.badge_text(), "");
  }

  #[test]
  fn test_quit() {
    let (mut app, _rx) = app();
    key(&mut app, KeyCode::Char('q'));
    assert!(app.state.is_quitting());
  }

  #[test]
  fn test_start_with_empty_queue_nudges() {
    let (mut app, _rx) = app();
    key(&mut app, KeyCode::Char(' '));
    assert!(app.is_nudging());
    assert!(!app.engine.is_running());
    assert!(!app.ticker.is_running());
  }

  #[tokio::test]
  async fn test_space_toggles_run_and_ticker() {
    let (mut app, _rx) = app();
    add(&mut app, &["Air Squat"]);
    key(&mut app, KeyCode::Char(' '));
    assert!(app.engine.is_running());
    assert!(app.ticker.is_running());
    assert_eq!(app.title_text(), "Air Squat (Round 1/1)");

    key(&mut app, KeyCode::Char(' '));
    assert!(app.engine.run_state().is_paused());
    assert!(!app.ticker.is_running());

    key(&mut app, KeyCode::Char(' '));
    assert!(app.engine.is_running());
    key(&mut app, KeyCode::Char('r'));
    assert!(app.engine.run_state().is_stopped());
    assert!(!app.ticker.is_running());
  }

  #[tokio::test]
  async fn test_seconds_drive_run_to_done() {
    let (mut app, _rx) = app();
    add(&mut app, &["Air Squat", "Push-Up"]);
    key(&mut app, KeyCode::Char(' '));
    assert_eq!(app.badge_text(), "Next: Push-Up (Round 1/1)");

    // each phase counts down to zero, then the next tick moves on: 3 + 2 + 3
    for _ in 0..8 {
      send(&mut app, Event::Second);
    }
    assert!(app.engine.state().completed);
    assert_eq!(app.title_text(), "Done!");
    assert!(DONE_QUOTES.contains(&app.badge_text().as_str()));
    assert!(app.is_flashing());
    assert!(!app.ticker.is_running());
  }

  #[tokio::test]
  async fn test_rest_titles() {
    let (mut app, _rx) = app();
    add(&mut app, &["A", "B"]);
    app.engine.edit_config(|c| {
      c.total_sets = 2;
      c.inter_set_rest_seconds = 5;
    });
    key(&mut app, KeyCode::Char(' '));
    for _ in 0..3 {
      send(&mut app, Event::Second);
    }
    assert_eq!(app.title_text(), "Recovery");
    for _ in 0..5 {
      send(&mut app, Event::Second);
    }
    assert_eq!(app.title_text(), "Recovery (between sets)");
    assert_eq!(app.badge_text(), "Next: A (Round 2/2)");
  }

  #[test]
  fn test_picker_filters_and_appends() {
    let (mut app, _rx) = app();
    send(
      &mut app,
      Event::Library(LoadedLibrary {
        categories: vec![
          Category { category: "Legs".into(), items: vec!["Air Squat".into(), "Lunges".into()] },
          Category { category: "Chest".into(), items: vec!["Push-up".into()] },
        ],
        warning: None,
      }),
    );
    key(&mut app, KeyCode::Char('a'));
    assert!(app.state.is_picking());
    for c in "un".chars() {
      key(&mut app, KeyCode::Char(c));
    }
    assert_eq!(app.picker_items(), vec!["Lunges".to_string()]);
    key(&mut app, KeyCode::Enter);
    assert_eq!(queue_names(&app), vec!["Lunges"]);
    assert_eq!(app.engine.queue().get(0).unwrap().work_seconds, 40);

    // shortcuts are typed into the query, not executed
    key(&mut app, KeyCode::Char('q'));
    assert!(app.state.is_picking());
    key(&mut app, KeyCode::Backspace);
    key(&mut app, KeyCode::Backspace);
    key(&mut app, KeyCode::Backspace);
    key(&mut app, KeyCode::Down);
    key(&mut app, KeyCode::Down);
    key(&mut app, KeyCode::Enter);
    assert_eq!(queue_names(&app), vec!["Lunges", "Push-up"]);

    key(&mut app, KeyCode::Esc);
    assert_eq!(app.state, AppState::Timer);
  }

  #[test]
  fn test_library_warning_is_dismissed_by_any_key() {
    let (mut app, _rx) = app();
    send(&mut app, Event::Library(LoadedLibrary { categories: library::fallback(), warning: Some("offline".into()) }));
    assert!(app.warning.is_some());
    key(&mut app, KeyCode::Char('q'));
    assert!(app.warning.is_none());
    assert!(!app.state.is_quitting());
  }

  #[test]
  fn test_queue_editing_keys() {
    let (mut app, _rx) = app();
    add(&mut app, &["A", "B", "C"]);
    key(&mut app, KeyCode::Down);
    key(&mut app, KeyCode::Char('K'));
    assert_eq!(queue_names(&app), vec!["B", "A", "C"]);
    assert_eq!(app.selected, 0);
    key(&mut app, KeyCode::Char('J'));
    key(&mut app, KeyCode::Char('J'));
    assert_eq!(queue_names(&app), vec!["A", "C", "B"]);
    assert_eq!(app.selected, 2);

    key(&mut app, KeyCode::Char('+'));
    key(&mut app, KeyCode::Char(']'));
    let b = app.engine.queue().get(2).unwrap();
    assert_eq!((b.work_seconds, b.rest_seconds), (7, 6));

    key(&mut app, KeyCode::Char('x'));
    assert_eq!(queue_names(&app), vec!["A", "C"]);
    assert_eq!(app.selected, 1);

    key(&mut app, KeyCode::Char('c'));
    assert!(app.engine.queue().is_empty());
    assert_eq!(app.selected, 0);
    key(&mut app, KeyCode::Char('x'));
  }

  #[test]
  fn test_run_setting_keys() {
    let (mut app, _rx) = app();
    key(&mut app, KeyCode::Char('>'));
    key(&mut app, KeyCode::Char('>'));
    key(&mut app, KeyCode::Char('.'));
    assert_eq!(app.engine.config().total_sets, 3);
    assert_eq!(app.engine.config().inter_set_rest_seconds, 20);
    for _ in 0..5 {
      key(&mut app, KeyCode::Char('<'));
    }
    assert_eq!(app.engine.config().total_sets, 1);

    key(&mut app, KeyCode::Char('}'));
    key(&mut app, KeyCode::Char('('));
    assert_eq!(app.engine.queue().defaults(), Defaults { work_seconds: 45, rest_seconds: 15 });
  }

  #[tokio::test]
  async fn test_explanations_flow_into_coach_panel() {
    let (mut app, mut rx) = app();
    send(&mut app, Event::ExplainerReady(Ok(())));
    key(&mut app, KeyCode::Char('t'));
    assert_eq!(app.dispatcher.coach().current_name(), TEST_EXERCISE);
    assert!(app.dispatcher.coach().is_busy());

    pump_until_done(&mut app, &mut rx).await;
    assert_eq!(app.dispatcher.coach().output(), "Hips back");
    assert!(!app.dispatcher.coach().is_busy());
  }

  #[tokio::test]
  async fn test_unavailable_explainer_is_checked_again_on_demand() {
    let (mut app, mut rx) = app();
    send(&mut app, Event::ExplainerReady(Err("no server".into())));
    key(&mut app, KeyCode::Char('t'));
    assert_eq!(app.dispatcher.coach().status(), "checking...");
    assert_eq!(app.dispatcher.coach().current_name(), "");

    // still offline: nothing is explained
    let event = rx.recv().await.unwrap();
    assert!(matches!(event, Event::ExplainerReady(Err(_))));
    send(&mut app, event);
    assert_eq!(app.dispatcher.coach().current_name(), "");
    assert_eq!(app.dispatcher.coach().status(), "unavailable");
  }

  #[tokio::test]
  async fn test_explainer_started_later_answers_forced_request() {
    let local = Local::new(false);
    let (mut app, mut rx) = app_with(local.clone(), &[]);
    send(&mut app, Event::ExplainerReady(Err("no server".into())));
    assert!(app.dispatcher.coach().availability().is_unavailable());

    local.up.store(true, Ordering::SeqCst);
    key(&mut app, KeyCode::Char('t'));
    pump_until_done(&mut app, &mut rx).await;
    assert!(app.dispatcher.coach().availability().is_available());
    assert_eq!(app.dispatcher.coach().current_name(), TEST_EXERCISE);
    assert_eq!(app.dispatcher.coach().output(), "Brace");
  }

  #[test]
  fn test_model_key_cycles_configured_models() {
    let local = Local::new(true);
    let (mut app, _rx) = app_with(local.clone(), &["llama3.2:1b", "qwen2.5:1.5b", "phi3:mini"]);
    key(&mut app, KeyCode::Char('o'));
    assert_eq!(local.model(), "qwen2.5:1.5b");
    assert_eq!(app.dispatcher.coach().status(), "model switched to qwen2.5:1.5b");
    key(&mut app, KeyCode::Char('o'));
    key(&mut app, KeyCode::Char('o'));
    assert_eq!(local.model(), "llama3.2:1b");
  }

  #[test]
  fn test_model_key_needs_a_second_model() {
    let local = Local::new(true);
    let (mut app, _rx) = app_with(local.clone(), &["llama3.2:1b"]);
    key(&mut app, KeyCode::Char('o'));
    assert_eq!(local.model(), "llama3.2:1b");
    assert_eq!(app.dispatcher.coach().status(), "checking...");
  }

  #[test]
  fn test_auto_explain_toggle() {
    let (mut app, _rx) = app();
    assert!(!app.dispatcher.coach().auto_explain());
    key(&mut app, KeyCode::Char('m'));
    assert!(app.dispatcher.coach().auto_explain());
  }

  #[test]
  fn test_plan_replaces_queue_and_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let (mut app, _rx) = app_in(dir.path());
    add(&mut app, &["Leftover"]);
    key(&mut app, KeyCode::Char('p'));

    let names = queue_names(&app);
    assert_eq!(names.len(), plan::STATIONS);
    assert!(!names.contains(&"Leftover".to_string()));
    assert!(app.engine.queue().iter().all(|e| e.work_seconds == 60 && e.rest_seconds == 45));
    assert!(app.plan_key.as_deref().unwrap().ends_with("_mixed"));

    key(&mut app, KeyCode::Char('p'));
    assert_eq!(queue_names(&app), names);
  }

  #[test]
  fn test_mode_cycles() {
    let (mut app, _rx) = app();
    key(&mut app, KeyCode::Char('n'));
    assert_eq!(app.mode, WorkoutMode::Push);
  }

  #[test]
  fn test_timer_previews_first_work_period() {
    let (mut app, _rx) = app();
    assert_eq!(app.timer_seconds(), 0);
    add(&mut app, &["A"]);
    assert_eq!(app.timer_seconds(), 2);
    assert_eq!(app.planned_total(), "00:02");
  }

  #[test]
  fn test_draws_every_screen() {
    let (mut app, _rx) = app();
    add(&mut app, &["Air Squat", "Push-Up"]);
    app.warning = Some("Could not load exercises".into());
    let mut terminal = Terminal::new(TestBackend::new(120, 40)).unwrap();
    terminal.draw(|f| app.ui(f)).unwrap();
    app.warning = None;
    app.state = AppState::Picking;
    terminal.draw(|f| app.ui(f)).unwrap();
    // too small for the layout, still no panic
    let mut tiny = Terminal::new(TestBackend::new(20, 5)).unwrap();
    tiny.draw(|f| app.ui(f)).unwrap();
  }

  #[test]
  fn test_centered_fits_inside() {
    let area = centered(Rect::new(0, 0, 40, 4), 60, 5);
    assert_eq!(area, Rect::new(0, 0, 40, 4));
    assert_eq!(centered(Rect::new(0, 0, 100, 20), 60, 5), Rect::new(20, 7, 60, 5));
  }
}
