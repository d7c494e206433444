//! CSS selector specificity (Selectors Level 4).

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

/// `(ids, classes/attributes/pseudo-classes, types/pseudo-elements)`, compared lexicographically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Specificity(pub u32, pub u32, pub u32);

impl Specificity {
    fn add(self, other: Specificity) -> Specificity {
        Specificity(self.0 + other.0, self.1 + other.1, self.2 + other.2)
    }
}

impl Ord for Specificity {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.0, self.1, self.2).cmp(&(other.0, other.1, other.2))
    }
}

impl PartialOrd for Specificity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Specificity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.0, self.1, self.2)
    }
}

/// Split a selector list on top-level commas, ignoring commas inside `()`, `[]` or strings.
pub fn split_selector_list(list: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut current = String::new();
    let mut chars = list.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(_), '\\') => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                continue;
            }
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                let part = current.trim();
                if !part.is_empty() {
                    parts.push(part.to_string());
                }
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }

    let part = current.trim();
    if !part.is_empty() {
        parts.push(part.to_string());
    }
    parts
}

/// Specificity of a complex selector; for a list, the most specific member.
pub fn specificity(selector: &str) -> Specificity {
    split_selector_list(selector)
        .iter()
        .map(|s| complex_specificity(s))
        .max()
        .unwrap_or_default()
}

const LEGACY_PSEUDO_ELEMENTS: &[&str] = &["before", "after", "first-line", "first-letter"];

fn complex_specificity(selector: &str) -> Specificity {
    let chars: Vec<char> = selector.chars().collect();
    let mut score = Specificity::default();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '#' => {
                score.0 += 1;
                i = skip_ident(&chars, i + 1);
            }
            '.' => {
                score.1 += 1;
                i = skip_ident(&chars, i + 1);
            }
            '[' => {
                score.1 += 1;
                i = skip_block(&chars, i, '[', ']');
            }
            ':' => {
                if chars.get(i + 1) == Some(&':') {
                    score.2 += 1;
                    i = skip_ident(&chars, i + 2);
                    if chars.get(i) == Some(&'(') {
                        i = skip_block(&chars, i, '(', ')');
                    }
                    continue;
                }

                let name_end = skip_ident(&chars, i + 1);
                let name: String = chars[i + 1..name_end].iter().collect::<String>().to_lowercase();
                i = name_end;

                let argument = if chars.get(i) == Some(&'(') {
                    let end = skip_block(&chars, i, '(', ')');
                    let close = end.saturating_sub(1).max(i + 1);
                    let inner: String = chars[i + 1..close].iter().collect();
                    i = end;
                    Some(inner)
                } else {
                    None
                };

                score = score.add(pseudo_class_specificity(&name, argument.as_deref()));
            }
            '*' | ' ' | '>' | '+' | '~' | '\t' | '\n' | '|' => i += 1,
            c if is_ident_char(c) || c == '\\' => {
                score.2 += 1;
                i = skip_ident(&chars, i);
            }
            _ => i += 1,
        }
    }

    score
}

fn pseudo_class_specificity(name: &str, argument: Option<&str>) -> Specificity {
    match (name, argument) {
        ("where", _) => Specificity::default(),
        ("is" | "not" | "has" | "matches" | "-webkit-any", Some(arg)) => specificity(arg),
        ("nth-child" | "nth-last-child", Some(arg)) => {
            let of_selector = arg
                .to_ascii_lowercase()
                .find(" of ")
                .map(|idx| specificity(&arg[idx + 4..]))
                .unwrap_or_default();
            Specificity(0, 1, 0).add(of_selector)
        }
        (legacy, None) if LEGACY_PSEUDO_ELEMENTS.contains(&legacy) => Specificity(0, 0, 1),
        _ => Specificity(0, 1, 0),
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

fn skip_ident(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() {
        if chars[i] == '\\' {
            i += 2;
        } else if is_ident_char(chars[i]) {
            i += 1;
        } else {
            break;
        }
    }
    i.min(chars.len())
}

/// `start` points at `open`; returns the index just past the matching `close`.
fn skip_block(chars: &[char], start: usize, open: char, close: char) -> usize {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut i = start;

    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(_) if c == '\\' => i += 1,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == open => depth += 1,
            None if c == close => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            None => {}
        }
        i += 1;
    }
    chars.len()
}
