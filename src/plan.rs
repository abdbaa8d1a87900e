//! Daily circuit plans.
//!
//! A plan is drawn from a tagged catalog, balanced per movement category for
//! the mixed mode or restricted to one movement pattern for the split modes.
//! Each calendar day and mode gets one plan, cached on disk until rerolled.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use thiserror::Error;

pub const STATIONS: usize = 26;
pub const PLAN_WORK_SECONDS: u32 = 60;
pub const PLAN_REST_SECONDS: u32 = 45;
const VIDEO_SEARCH_BASE: &str = "https://www.youtube.com/results";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
  Lower,
  Hinge,
  Push,
  Pull,
  PullUp,
  Power,
  Metcon,
  Core,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
  pub name: &'static str,
  pub tag: Tag,
  pub equip: &'static str,
  pub cues: &'static str,
}

const fn entry(name: &'static str, tag: Tag, equip: &'static str, cues: &'static str) -> CatalogEntry {
  CatalogEntry { name, tag, equip, cues }
}

/// Dumbbells (2x5kg, 2x10kg), bands, a pull-up bar and bodyweight only.
pub const CATALOG: &[CatalogEntry] = &[
  entry("DB Goblet Squat", Tag::Lower, "1x10kg", "Elbows inside knees; full-foot pressure"),
  entry("DB Front Squat", Tag::Lower, "2x10kg (or 2x5kg)", "DBs at shoulders; torso tall; brace"),
  entry("DB Thruster", Tag::Lower, "2x5kg (or 2x10kg)", "Squat then drive overhead; steady breathing"),
  entry("DB Reverse Lunge", Tag::Lower, "2x5kg (or 2x10kg)", "10 total = 5/leg; step back softly"),
  entry("DB Split Squat", Tag::Lower, "2x5kg", "Control depth; knee tracks toes; upright torso"),
  entry("DB Lateral Lunge", Tag::Lower, "2x5kg", "Sit back into hip; push floor away"),
  entry("DB Step-Up (chair/box)", Tag::Lower, "2x5kg (or 2x10kg)", "Drive through full foot; control down"),
  entry("Band Squat (band under feet)", Tag::Lower, "Band", "Knees out; constant tension; full depth"),
  entry("Band Lateral Walk", Tag::Lower, "Light band", "Short steps; hips level; knees out"),
  entry("Tempo Air Squat", Tag::Lower, "Bodyweight", "3s down; 1s pause; stand tall"),
  entry("Squat Pulses", Tag::Lower, "Bodyweight", "Stay mid-range; constant tension"),
  entry("DB Romanian Deadlift", Tag::Hinge, "2x10kg", "Hips back; lats on; feel hamstrings"),
  entry("DB Suitcase Deadlift", Tag::Hinge, "2x10kg", "Brace; stand tall; avoid rounding"),
  entry("DB Staggered-Stance RDL", Tag::Hinge, "2x10kg", "70/30 stance; hinge; slow down"),
  entry("DB Single-Leg RDL", Tag::Hinge, "1x10kg (or 2x5kg)", "Square hips; reach long; control"),
  entry("Band Good Morning", Tag::Hinge, "Heavy band", "Band at hips; hinge; squeeze glutes"),
  entry("Band Pull-Through (anchor low)", Tag::Hinge, "Band", "Hinge back; snap hips through"),
  entry("Glute Bridge", Tag::Hinge, "Bodyweight", "Ribs down; full hip extension; pause"),
  entry("DB Glute Bridge", Tag::Hinge, "1x10kg", "Pause at top; knees steady"),
  entry("DB Hang Clean (two DB)", Tag::Power, "2x10kg (or 2x5kg)", "Jump-shrug; fast elbows; soft catch"),
  entry("Single-Arm DB Snatch", Tag::Power, "1x10kg (or 1x5kg)", "Hip drive; DB close; punch overhead"),
  entry("DB Hip Hinge Swing", Tag::Power, "1x10kg", "Hinge not squat; snap hips; float DB"),
  entry("DB Strict Press", Tag::Push, "2x10kg (or 2x5kg)", "Ribs down; glutes tight; smooth press"),
  entry("DB Push Press", Tag::Push, "2x10kg (or 2x5kg)", "Dip-drive; punch to lockout; no over-arch"),
  entry("DB Arnold Press", Tag::Push, "2x5kg (or 2x10kg)", "Rotate smoothly; avoid shrugging"),
  entry("DB Floor Press", Tag::Push, "2x10kg", "Elbows ~45 degrees; pause on floor; press fast"),
  entry("DB Squeeze Press (floor)", Tag::Push, "2x10kg", "Press DBs together; slow down"),
  entry("Push-Ups", Tag::Push, "Bodyweight", "Full-body tension; chest to floor; lock out"),
  entry("Close-Grip Push-Ups", Tag::Push, "Bodyweight", "Elbows close; triceps bias; quality reps"),
  entry("Pike Push-Ups", Tag::Push, "Bodyweight", "Hips high; head between hands; control"),
  entry("DB Lateral Raise", Tag::Push, "2x5kg", "Raise to mid-chest; slow lower; no swing"),
  entry("DB Front Raise", Tag::Push, "2x5kg", "Stop at shoulder height; control down"),
  entry("Band Triceps Pushdown", Tag::Push, "Band", "Lock elbows; full extension; slow return"),
  entry("Band Overhead Triceps Extension", Tag::Push, "Band", "Long-head stretch; elbows narrow"),
  entry("DB Overhead Triceps Extension", Tag::Push, "1x10kg or 2x5kg", "Slow eccentric; elbows in"),
  entry("DB Triceps Kickback", Tag::Push, "2x5kg", "Hinge; elbows high; squeeze hard"),
  entry("DB Bent-Over Row", Tag::Pull, "2x10kg", "Flat back; pull to pockets; pause 1s"),
  entry("DB Underhand Row", Tag::Pull, "2x10kg", "Supinated grip; elbows close; squeeze lats"),
  entry("Single-Arm DB Row", Tag::Pull, "1x10kg", "Brace hard; elbow to hip; slow return"),
  entry("DB Renegade Row (knees if needed)", Tag::Pull, "2x5kg", "Hips square; slow pull; no twisting"),
  entry("Band Row", Tag::Pull, "Heavy band", "Squeeze shoulder blades; control return"),
  entry("Band Lat Pulldown (anchor high)", Tag::Pull, "Band", "Drive elbows down; pause at bottom"),
  entry("Band Face Pull", Tag::Pull, "Light band", "Pull to eyebrows; elbows high; 1s squeeze"),
  entry("Band Pull-Aparts", Tag::Pull, "Light band", "Straight arms; squeeze mid-back"),
  entry("DB Rear Delt Fly", Tag::Pull, "2x5kg", "Soft elbows; move from shoulder; no swing"),
  entry("DB Hammer Curl", Tag::Pull, "2x10kg or 2x5kg", "Neutral grip; elbows pinned; slow eccentric"),
  entry("DB Concentration Curl", Tag::Pull, "1x10kg", "Elbow on thigh; squeeze top; slow down"),
  entry("Pull-Ups / Chin-Ups", Tag::PullUp, "Pull-up bar (band assist optional)", "Full hang; ribs down; controlled reps"),
  entry("Negative Pull-Ups", Tag::PullUp, "Pull-up bar", "Step/jump to top; 3-5s lowering"),
  entry("Banded Assisted Pull-Ups", Tag::PullUp, "Band + pull-up bar", "Band on bar; knee/foot in band; full ROM"),
  entry("Mountain Climbers", Tag::Metcon, "Bodyweight", "Strong plank, hips stable"),
  entry("Burpee (no push-up)", Tag::Metcon, "Bodyweight", "Step down/up if needed"),
  entry("High Knees (in place)", Tag::Metcon, "Bodyweight", "Tall posture, quick feet"),
  entry("Skater Hops", Tag::Metcon, "Bodyweight", "Soft landings, lateral power"),
  entry("Plank Shoulder Taps", Tag::Core, "Bodyweight", "Minimize hip sway"),
  entry("Hollow Hold", Tag::Core, "Bodyweight", "Low back down; shorten lever if needed"),
  entry("Side Plank", Tag::Core, "Bodyweight", "Long line; hips high"),
  entry("Dead Bug", Tag::Core, "Bodyweight", "Slow; exhale, ribs down"),
];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum WorkoutMode {
  #[default]
  Mixed,
  Push,
  Pull,
  Legs,
}

impl WorkoutMode {
  /// Guaranteed picks per tag, drawn before the plan is topped up.
  fn quotas(self) -> &'static [(Tag, usize)] {
    match self {
      WorkoutMode::Mixed => &[
        (Tag::Lower, 6),
        (Tag::Hinge, 4),
        (Tag::Pull, 5),
        (Tag::Push, 4),
        (Tag::PullUp, 3),
        (Tag::Power, 2),
        (Tag::Metcon, 1),
        (Tag::Core, 1),
      ],
      _ => &[],
    }
  }

  fn allows(self, tag: Tag) -> bool {
    match self {
      WorkoutMode::Mixed => true,
      WorkoutMode::Push => tag == Tag::Push,
      WorkoutMode::Pull => matches!(tag, Tag::Pull | Tag::PullUp),
      WorkoutMode::Legs => matches!(tag, Tag::Lower | Tag::Hinge),
    }
  }

  pub fn next(self) -> Self {
    let modes: Vec<WorkoutMode> = WorkoutMode::iter().collect();
    let i = modes.iter().position(|m| *m == self).unwrap_or(0);
    modes[(i + 1) % modes.len()]
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
  /// 1-based.
  pub station: u32,
  pub name: String,
  #[serde(default)]
  pub equip: String,
  #[serde(default)]
  pub cues: String,
  #[serde(default)]
  pub url: String,
}

/// A video search rather than a direct link, so it never goes dead.
pub fn video_search_url(name: &str) -> String {
  let query = format!("{} proper form", name);
  match reqwest::Url::parse_with_params(VIDEO_SEARCH_BASE, &[("search_query", query.as_str())]) {
    Ok(url) => url.to_string(),
    Err(_) => VIDEO_SEARCH_BASE.to_string(),
  }
}

/// Draw a fresh plan for `mode`. Names never repeat within a plan.
pub fn generate<R: Rng + ?Sized>(mode: WorkoutMode, rng: &mut R) -> Vec<Station> {
  let mut used: HashSet<&str> = HashSet::new();
  let mut picked: Vec<&CatalogEntry> = Vec::new();

  for (tag, count) in mode.quotas() {
    let mut pool: Vec<&CatalogEntry> = CATALOG.iter().filter(|e| e.tag == *tag && !used.contains(e.name)).collect();
    pool.shuffle(rng);
    for e in pool.into_iter().take(*count) {
      used.insert(e.name);
      picked.push(e);
    }
  }

  let mut remaining: Vec<&CatalogEntry> = CATALOG.iter().filter(|e| mode.allows(e.tag) && !used.contains(e.name)).collect();
  remaining.shuffle(rng);
  let missing = STATIONS.saturating_sub(picked.len());
  picked.extend(remaining.into_iter().take(missing));

  picked.shuffle(rng);
  picked.truncate(STATIONS);
  picked
    .into_iter()
    .enumerate()
    .map(|(i, e)| Station {
      station: i as u32 + 1,
      name: e.name.to_string(),
      equip: e.equip.to_string(),
      cues: e.cues.to_string(),
      url: video_search_url(e.name),
    })
    .collect()
}

pub fn plan_key(date: NaiveDate, mode: WorkoutMode) -> String {
  format!("{}_{}", date.format("%Y-%m-%d"), mode)
}

#[derive(Debug, Error)]
pub enum PlanStoreError {
  #[error("plan file: {0}")]
  Io(#[from] std::io::Error),
  #[error("plan file is not a plan: {0}")]
  Json(#[from] serde_json::Error),
  #[error("stored plan is empty")]
  Empty,
}

/// One JSON file per plan key.
#[derive(Debug, Clone)]
pub struct PlanStore {
  dir: PathBuf,
}

impl PlanStore {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  fn path(&self, key: &str) -> PathBuf {
    self.dir.join(format!("plan_{}.json", key))
  }

  pub fn load(&self, key: &str) -> Result<Vec<Station>, PlanStoreError> {
    let raw = fs::read_to_string(self.path(key))?;
    let mut stations: Vec<Station> = serde_json::from_str(&raw)?;
    if stations.is_empty() {
      return Err(PlanStoreError::Empty);
    }
    // plans saved by older versions may carry direct video links
    for station in &mut stations {
      if !station.url.contains("youtube.com/results") {
        station.url = video_search_url(&station.name);
      }
    }
    Ok(stations)
  }

  pub fn save(&self, key: &str, stations: &[Station]) -> Result<(), PlanStoreError> {
    fs::create_dir_all(&self.dir)?;
    fs::write(self.path(key), serde_json::to_string_pretty(stations)?)?;
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyPlan {
  pub key: String,
  pub mode: WorkoutMode,
  pub stations: Vec<Station>,
}

/// Today's plan for `mode`: the cached one unless `reroll` is set, otherwise a
/// newly drawn plan that replaces the cache. Storage problems only cost the cache.
pub fn daily_plan<R: Rng + ?Sized>(
  store: &PlanStore,
  date: NaiveDate,
  mode: WorkoutMode,
  reroll: bool,
  rng: &mut R,
) -> DailyPlan {
  let key = plan_key(date, mode);
  if !reroll {
    match store.load(&key) {
      Ok(stations) => {
        info!("Using stored plan {}", key);
        return DailyPlan { key, mode, stations };
      }
      Err(e) => debug!("No usable stored plan {}: {}", key, e),
    }
  }
  let stations = generate(mode, rng);
  if let Err(e) = store.save(&key, &stations) {
    warn!("Could not store plan {}: {}", key, e);
  }
  info!("Generated plan {} with {} stations", key, stations.len());
  DailyPlan { key, mode, stations }
}
