//! Countdown beeps.
//!
//! The pitch is keyed to the countdown value, not to the phase that is ending.
//! Producing sound is best effort: every failure is logged at debug level and
//! otherwise ignored.

use std::io::Write;

/// Beep length in milliseconds.
pub const BEEP_MS: u64 = 120;

/// Pitch in Hz for a countdown value.
pub fn pitch_for(count: u32) -> f32 {
  match count {
    3 => 880.0,
    2 => 660.0,
    _ => 520.0,
  }
}

pub trait Beeper {
  fn beep(&mut self, count: u32);
}

/// Terminal bell on stderr.
pub struct BellBeeper;

impl Beeper for BellBeeper {
  fn beep(&mut self, count: u32) {
    let mut stderr = std::io::stderr();
    if let Err(e) = stderr.write_all(b"\x07").and_then(|_| stderr.flush()) {
      debug!("Bell for countdown {} failed: {}", count, e);
    }
  }
}

pub struct SilentBeeper;

impl Beeper for SilentBeeper {
  fn beep(&mut self, _count: u32) {}
}

/// Sine-wave beeps through the default output device.
///
/// The device is opened on the first beep. If that fails the beeper stays
/// quiet for the rest of the session.
#[cfg(feature = "audio")]
pub struct ToneBeeper {
  output: Option<(rodio::OutputStream, rodio::OutputStreamHandle)>,
  unavailable: bool,
}

#[cfg(feature = "audio")]
impl ToneBeeper {
  pub fn new() -> Self {
    Self { output: None, unavailable: false }
  }

  fn handle(&mut self) -> Option<&rodio::OutputStreamHandle> {
    if self.output.is_none() && !self.unavailable {
      match rodio::OutputStream::try_default() {
        Ok(output) => self.output = Some(output),
        Err(e) => {
          debug!("No audio output device: {}", e);
          self.unavailable = true;
        }
      }
    }
    self.output.as_ref().map(|(_, handle)| handle)
  }
}

#[cfg(feature = "audio")]
impl Beeper for ToneBeeper {
  fn beep(&mut self, count: u32) {
    use rodio::source::{SineWave, Source};
    use std::time::Duration;

    let Some(handle) = self.handle() else { return };
    let sink = match rodio::Sink::try_new(handle) {
      Ok(sink) => sink,
      Err(e) => {
        debug!("Could not open audio sink: {}", e);
        return;
      }
    };
    let tone = SineWave::new(pitch_for(count))
      .take_duration(Duration::from_millis(BEEP_MS))
      .fade_in(Duration::from_millis(10))
      .amplify(0.25);
    sink.append(tone);
    sink.detach();
  }
}

/// Pick the beeper for the `sound` setting and the compiled features.
pub fn beeper_for(sound: bool) -> Box<dyn Beeper> {
  if !sound {
    return Box::new(SilentBeeper);
  }
  #[cfg(feature = "audio")]
  {
    Box::new(ToneBeeper::new())
  }
  #[cfg(not(feature = "audio"))]
  {
    Box::new(BellBeeper)
  }
}
