//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Lowercase, collapse every whitespace run to a single space and drop
/// trailing semicolons. Used to compare queries typed by hand with generated ones.
pub fn normalize_query(s: &str) -> String {
  s.split_whitespace()
    .map(str::to_lowercase)
    .collect::<Vec<_>>()
    .join(" ")
    .trim_end_matches(|c: char| c == ';' || c.is_whitespace())
    .to_string()
}

/// Contents of the first markdown code block (```sql ... ```) a model may wrap
/// a query in, ignoring any prose around it. Text without fences is only trimmed.
pub fn strip_code_fences(s: &str) -> String {
  let Some(open) = s.find("```") else {
    return s.trim().to_string();
  };
  let rest = &s[open + 3..];
  // Drop an optional language tag on the opening fence.
  let tag_len = rest.find(|c: char| c.is_whitespace()).unwrap_or(rest.len());
  let body = if rest[..tag_len].eq_ignore_ascii_case("sql") { &rest[tag_len..] } else { rest };
  let body = match body.find("```") {
    Some(close) => &body[..close],
    None => body,
  };
  body.trim().to_string()
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    s.to_string()
  } else {
    format!("{}… ({} bytes total)", s.chars().take(max).collect::<String>(), s.len())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn template_fills_every_occurrence() {
    assert_eq!(fill_template("{a}-{b}-{a}", &[("a", "1"), ("b", "2")]), "1-2-1");
  }

  #[test]
  fn normalize_collapses_case_and_spacing() {
    assert_eq!(normalize_query("  SELECT *\n\tFROM   archives "), "select * from archives");
    assert_eq!(normalize_query("select * from archives ; "), "select * from archives");
  }

  #[test]
  fn fences_are_stripped_and_trimmed() {
    assert_eq!(strip_code_fences("```sql\nSELECT * FROM t;\n```"), "SELECT * FROM t;");
    assert_eq!(strip_code_fences("  ```SQL SELECT 1 ```  "), "SELECT 1");
    assert_eq!(strip_code_fences("```\nSELECT 2\n```\n"), "SELECT 2");
    assert_eq!(strip_code_fences("  SELECT 3  "), "SELECT 3");
    assert_eq!(strip_code_fences("```SELECT 4```"), "SELECT 4");
  }

  #[test]
  fn prose_around_a_fenced_block_is_dropped() {
    assert_eq!(
      strip_code_fences("Here is the query:\n```sql\nSELECT * FROM archives;\n```"),
      "SELECT * FROM archives;"
    );
    assert_eq!(
      strip_code_fences("```sql\nSELECT * FROM archives;\n```\nThis returns every mission."),
      "SELECT * FROM archives;"
    );
    assert_eq!(
      strip_code_fences("Try this:\n```\nSELECT 5\n```\nand then ```sql SELECT 6```"),
      "SELECT 5"
    );
    assert_eq!(strip_code_fences("Unclosed:\n```sql\nSELECT 7;"), "SELECT 7;");
  }

  #[test]
  fn truncation_respects_char_boundaries() {
    assert_eq!(trunc_for_log("héllo", 10), "héllo");
    assert!(trunc_for_log("héllo wörld", 3).starts_with("hél…"));
  }
}
