/// Whole seconds as `MM:SS`. Minutes keep counting past 59, there is no hour field.
pub fn format_duration(seconds: u32) -> String {
  format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_format_zero() {
    assert_eq!(format_duration(0), "00:00");
  }

  #[test]
  fn test_format_pads_both_fields() {
    assert_eq!(format_duration(5), "00:05");
    assert_eq!(format_duration(65), "01:05");
    assert_eq!(format_duration(599), "09:59");
  }

  #[test]
  fn test_format_no_hour_rollover() {
    assert_eq!(format_duration(3600), "60:00");
    assert_eq!(format_duration(7200), "120:00");
  }

  #[test]
  fn test_format_matches_div_mod_for_range() {
    for s in 0..=7200u32 {
      let text = format_duration(s);
      let (mm, ss) = text.split_once(':').unwrap();
      assert!(mm.len() >= 2);
      assert_eq!(ss.len(), 2);
      assert_eq!(mm.parse::<u32>().unwrap(), s / 60);
      assert_eq!(ss.parse::<u32>().unwrap(), s % 60);
    }
  }
}
