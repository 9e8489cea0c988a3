//! Deterministic structuring of provider findings
//!
//! Research providers return loosely formatted markdown. This module turns it
//! into sections of bullet items and `Key: value` fields, and extracts the
//! numbers agents care about (1–5 scores, money amounts, percentages).
//! Nothing here can fail: unusable text just produces empty results.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Level given to pseudo-headings (`Use cases:` / `**Use cases**`), deeper than any `#` level
const PSEUDO_HEADING_LEVEL: usize = 7;

/// Longest key accepted for a `Key: value` field
const MAX_FIELD_KEY_LEN: usize = 60;

#[derive(Debug, Clone, Default)]
pub struct Section {
    pub heading: String,
    pub level: usize,
    pub items: Vec<String>,
    pub fields: Vec<(String, String)>,
}

impl Section {
    fn new(heading: String, level: usize) -> Self {
        Self {
            heading,
            level,
            items: Vec::new(),
            fields: Vec::new(),
        }
    }

    fn heading_matches(&self, keywords: &[&str]) -> bool {
        let heading = self.heading.to_lowercase();
        !heading.is_empty() && keywords.iter().any(|kw| heading.contains(kw))
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty() && self.fields.is_empty()
    }
}

/// Parsed findings text
#[derive(Debug, Clone, Default)]
pub struct FindingsDocument {
    sections: Vec<Section>,
}

impl FindingsDocument {
    pub fn parse(text: &str) -> Self {
        let mut sections = vec![Section::default()];

        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if let Some((heading, level)) = heading_of(trimmed) {
                sections.push(Section::new(heading, level));
                continue;
            }

            let (content, is_item) = match strip_list_marker(trimmed) {
                Some(rest) => (clean(rest), true),
                None => (clean(trimmed), false),
            };
            if content.is_empty() {
                continue;
            }

            let Some(current) = sections.last_mut() else {
                continue;
            };
            if let Some(field) = split_field(&content) {
                current.fields.push(field);
            }
            if is_item || !content.contains(':') {
                current.items.push(content);
            }
        }

        sections.retain(|s| !s.heading.is_empty() || !s.is_empty());
        Self { sections }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(Section::is_empty)
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// First section whose heading contains a keyword; earlier keywords win
    pub fn section(&self, keywords: &[&str]) -> Option<&Section> {
        keywords.iter().find_map(|kw| {
            self.sections
                .iter()
                .find(|s| s.heading_matches(std::slice::from_ref(kw)))
        })
    }

    /// First field whose key contains a keyword; earlier keywords win
    pub fn field(&self, keywords: &[&str]) -> Option<&str> {
        keywords.iter().find_map(|kw| {
            self.sections
                .iter()
                .flat_map(|s| s.fields.iter())
                .find(|(key, _)| key.to_lowercase().contains(kw))
                .map(|(_, value)| value.as_str())
        })
    }

    /// Items listed under a matching heading, or the comma separated value of a
    /// matching field when no such heading exists.
    pub fn list(&self, keywords: &[&str]) -> Vec<String> {
        if let Some(section) = self.section(keywords) {
            let items: Vec<String> = section
                .items
                .iter()
                .chain(self.nested_items(section))
                .cloned()
                .collect();
            if !items.is_empty() {
                return dedupe(items);
            }
        }

        self.field(keywords)
            .map(|value| dedupe(split_list(value)))
            .unwrap_or_default()
    }

    /// Groups each section whose heading starts with `prefix` together with
    /// the deeper sections that follow it.
    pub fn blocks(&self, prefix: &str) -> Vec<Section> {
        let mut blocks = Vec::new();
        let mut index = 0;

        while index < self.sections.len() {
            let section = &self.sections[index];
            index += 1;

            if !section.heading.to_lowercase().starts_with(prefix) {
                continue;
            }

            let mut block = section.clone();
            while let Some(next) = self.sections.get(index) {
                if next.level <= section.level {
                    break;
                }
                if let Some(pair) = split_field(&next.heading) {
                    block.fields.push(pair);
                }
                block.items.extend(next.items.iter().cloned());
                block.fields.extend(next.fields.iter().cloned());
                index += 1;
            }
            blocks.push(block);
        }

        blocks
    }

    fn nested_items<'a>(&'a self, parent: &'a Section) -> impl Iterator<Item = &'a String> + 'a {
        self.sections
            .iter()
            .skip_while(move |s| !std::ptr::eq(*s, parent))
            .skip(1)
            .take_while(move |s| s.level > parent.level)
            .flat_map(|s| s.items.iter())
    }
}

fn heading_of(line: &str) -> Option<(String, usize)> {
    if line.starts_with('#') {
        let level = line.chars().take_while(|c| *c == '#').count();
        let heading = clean(line.trim_start_matches('#'));
        return Some((heading, level));
    }

    if strip_list_marker(line).is_some() {
        return None;
    }

    // **Use Cases** or **Use Cases:**
    if line.starts_with("**") && line.ends_with("**") && line.len() > 4 {
        let inner = clean(line);
        if split_field(&inner).is_none() {
            return Some((inner.trim_end_matches(':').trim().to_string(), PSEUDO_HEADING_LEVEL));
        }
    }

    // Use cases:
    let without_bold = line.replace("**", "");
    if without_bold.ends_with(':') && without_bold.len() > 1 {
        let heading = without_bold.trim_end_matches(':').trim().to_string();
        if !heading.is_empty() && heading.len() <= MAX_FIELD_KEY_LEN {
            return Some((heading, PSEUDO_HEADING_LEVEL));
        }
    }

    None
}

fn strip_list_marker(line: &str) -> Option<&str> {
    for marker in ["- ", "* ", "• ", "+ "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest);
        }
    }

    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 && digits < 3 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return Some(rest);
        }
    }

    None
}

fn clean(text: &str) -> String {
    text.replace("**", "")
        .replace('`', "")
        .trim()
        .trim_matches('*')
        .trim()
        .to_string()
}

/// `Key: value` with a short key and a non-empty value
pub fn split_field(text: &str) -> Option<(String, String)> {
    let (key, value) = text.split_once(':')?;
    let key = clean(key);
    let value = clean(value);

    if key.is_empty() || value.is_empty() || key.len() > MAX_FIELD_KEY_LEN {
        return None;
    }
    // URLs are not fields
    if value.starts_with("//") {
        return None;
    }

    Some((key, value))
}

pub fn split_list(value: &str) -> Vec<String> {
    value
        .split([',', ';'])
        .map(|s| s.trim().trim_end_matches('.').trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Remove case-insensitive duplicates, keeping first occurrence order
pub fn dedupe(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.to_lowercase()))
        .collect()
}

fn slash_score_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)\s*/\s*(5|10)\b").expect("valid regex"))
}

fn bare_score_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|[^\w.])(\d(?:\.\d+)?)(?:[^\w%.]|$)").expect("valid regex"))
}

fn money_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d{1,3}(?:,\d{3})+|\d+(?:\.\d+)?)\s*(billion|bn|million|mn|m|thousand|k)?\b")
            .expect("valid regex")
    })
}

fn percent_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(-?\d+(?:\.\d+)?)\s*(?:%|percent|pct)").expect("valid regex")
    })
}

/// Extract a score as `(raw, scale)`.
///
/// Understands `4/5`, `7/10`, and a bare single digit between 1 and 5.
pub fn parse_score(text: &str) -> Option<(f64, f64)> {
    if let Some(caps) = slash_score_regex().captures(text) {
        let raw: f64 = caps[1].parse().ok()?;
        let scale: f64 = caps[2].parse().ok()?;
        return Some((raw, scale));
    }

    bare_score_regex()
        .captures_iter(text)
        .filter_map(|caps| caps[1].parse::<f64>().ok())
        .find(|value| (1.0..=5.0).contains(value))
        .map(|value| (value, 5.0))
}

/// Extract a money amount in millions. Bare numbers are read as millions;
/// four digit integers without a unit are taken to be years and skipped.
pub fn parse_money_millions(text: &str) -> Option<f64> {
    money_regex().captures_iter(text).find_map(|caps| {
        let digits = caps[1].replace(',', "");
        let value: f64 = digits.parse().ok()?;
        let unit = caps.get(2).map(|m| m.as_str().to_lowercase());

        match unit.as_deref() {
            Some("billion") | Some("bn") => Some(value * 1_000.0),
            Some("million") | Some("mn") | Some("m") => Some(value),
            Some("thousand") | Some("k") => Some(value / 1_000.0),
            _ => {
                let looks_like_year = digits.len() == 4
                    && !digits.contains('.')
                    && (1900.0..=2100.0).contains(&value);
                if looks_like_year {
                    None
                } else {
                    Some(value)
                }
            }
        }
    })
}

pub fn parse_percent(text: &str) -> Option<f64> {
    percent_regex()
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
}
