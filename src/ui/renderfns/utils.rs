/// Truncate to at most `max_len` characters, ending in "…" when cut.
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    return s.to_string();
  }
  let kept: String = s.chars().take(max_len.saturating_sub(1)).collect();
  format!("{}…", kept)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("Lublin", 10), "Lublin");
  }

  #[test]
  fn test_truncate_exact_length() {
    assert_eq!(truncate("Lublin", 6), "Lublin");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate("Częstochowa", 6), "Częst…");
  }

  #[test]
  fn test_truncate_zero_width() {
    assert_eq!(truncate("Gorzów", 0), "…");
  }
}
