use std::collections::HashMap;
use std::str::FromStr;

use crate::engine::{DEFAULT_SET_REST_SECONDS, DEFAULT_SETS, MAX_SETS};
use crate::explainer::{DEFAULT_ENDPOINT, DEFAULT_MODEL};
use crate::plan::WorkoutMode;
use crate::queue::{DEFAULT_REST_SECONDS, DEFAULT_WORK_SECONDS, MAX_SECONDS};

pub const CONF_FILE_NAME: &str = "stationtimer.ini";
const SECTION: &str = "stationtimer";

const DEFAULT_LIBRARY: &str = "./data/exercises.json";
const DEFAULT_PLAN_DIR: &str = ".stationtimer";

type IniMap = HashMap<String, HashMap<String, Option<String>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
  pub work_seconds: u32,
  pub rest_seconds: u32,
  pub sets: u32,
  pub set_rest_seconds: u32,
  pub auto_explain: bool,
  pub sound: bool,
  pub library: String,
  pub explainer: String,
  pub model: String,
  /// Models the `o` key cycles through; always contains `model`.
  pub models: Vec<String>,
  pub plan_dir: String,
  pub mode: WorkoutMode,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      work_seconds: DEFAULT_WORK_SECONDS,
      rest_seconds: DEFAULT_REST_SECONDS,
      sets: DEFAULT_SETS,
      set_rest_seconds: DEFAULT_SET_REST_SECONDS,
      auto_explain: true,
      sound: true,
      library: DEFAULT_LIBRARY.to_string(),
      explainer: DEFAULT_ENDPOINT.to_string(),
      model: DEFAULT_MODEL.to_string(),
      models: vec![DEFAULT_MODEL.to_string()],
      plan_dir: DEFAULT_PLAN_DIR.to_string(),
      mode: WorkoutMode::default(),
    }
  }
}

/// Read settings from an INI file. A missing or unreadable file gives the defaults.
pub fn load(path: &str) -> Settings {
  info!("Reading config from {}", path);
  match ini!(safe path) {
    Ok(map) => {
      for (key, value) in &map {
        info!("{} / {:?}", key, value);
      }
      from_map(&map)
    }
    Err(error) => {
      eprintln!("Warning: Couldn't load config file '{}': {}", path, error);
      eprintln!("Continuing with default values.");
      info!("Using default configuration");
      Settings::default()
    }
  }
}

pub fn from_map(map: &IniMap) -> Settings {
  let mut settings = Settings::default();
  let Some(section) = map.get(SECTION) else {
    return settings;
  };
  let value = |key: &str| section.get(key).and_then(|v| v.as_deref()).map(str::trim);

  if let Some(val) = value("work") {
    settings.work_seconds = parse_ranged(val, "work", DEFAULT_WORK_SECONDS, 0, MAX_SECONDS);
  }
  if let Some(val) = value("rest") {
    settings.rest_seconds = parse_ranged(val, "rest", DEFAULT_REST_SECONDS, 0, MAX_SECONDS);
  }
  if let Some(val) = value("sets") {
    settings.sets = parse_ranged(val, "sets", DEFAULT_SETS, 1, MAX_SETS);
  }
  if let Some(val) = value("setrest") {
    settings.set_rest_seconds = parse_ranged(val, "setrest", DEFAULT_SET_REST_SECONDS, 0, MAX_SECONDS);
  }
  if let Some(val) = value("autoexplain") {
    settings.auto_explain = parse_flag(val, "autoexplain", true);
  }
  if let Some(val) = value("sound") {
    settings.sound = parse_flag(val, "sound", true);
  }
  if let Some(val) = value("library").filter(|v| !v.is_empty()) {
    settings.library = val.to_string();
  }
  if let Some(val) = value("explainer").filter(|v| !v.is_empty()) {
    settings.explainer = val.trim_end_matches('/').to_string();
  }
  if let Some(val) = value("model").filter(|v| !v.is_empty()) {
    settings.model = val.to_string();
  }
  settings.models = match value("models") {
    Some(val) => val.split(',').map(str::trim).filter(|m| !m.is_empty()).map(String::from).collect(),
    None => Vec::new(),
  };
  if !settings.models.contains(&settings.model) {
    settings.models.insert(0, settings.model.clone());
  }
  if let Some(val) = value("plandir").filter(|v| !v.is_empty()) {
    settings.plan_dir = val.to_string();
  }
  if let Some(val) = value("mode") {
    settings.mode = WorkoutMode::from_str(val).unwrap_or_else(|_| {
      warn!("Unknown workout mode '{}', using {}", val, WorkoutMode::default());
      WorkoutMode::default()
    });
  }
  settings
}

/// Parse and validate a whole-number configuration value
fn parse_ranged(value: &str, config_name: &str, default: u32, min: u32, max: u32) -> u32 {
  match value.parse::<u32>() {
    Ok(n) if (min..=max).contains(&n) => n,
    Ok(n) => {
      warn!("Config value '{}' = {} is out of valid range [{}, {}], using default {}", config_name, n, min, max, default);
      default
    }
    Err(e) => {
      warn!("Failed to parse config value '{}' = '{}': {}, using default {}", config_name, value, e, default);
      default
    }
  }
}

fn parse_flag(value: &str, config_name: &str, default: bool) -> bool {
  match value.to_lowercase().as_str() {
    "true" | "yes" | "on" | "1" => true,
    "false" | "no" | "off" | "0" => false,
    _ => {
      warn!("Config value '{}' = '{}' is not a flag, using default {}", config_name, value, default);
      default
    }
  }
}
