//! Title filtering.
//!
//! A server's rules are case-insensitive substrings with OR semantics: the
//! stream is delivered if its title contains any one of them. No rules (or an
//! empty list) means everything is delivered.

/// Returns `true` if a stream titled `title` should be delivered.
pub fn title_matches(title: &str, rules: Option<&[String]>) -> bool {
    let Some(rules) = rules.filter(|r| !r.is_empty()) else {
        return true;
    };

    let title = title.to_lowercase();
    rules
        .iter()
        .any(|rule| title.contains(&rule.to_lowercase()))
}

/// Splits a comma-separated rule list, trimming entries and dropping empties.
pub fn parse_rule_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}
