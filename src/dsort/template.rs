//! Brace-range name templates.
//!
//! `input-{0..99}` names `input-0` ... `input-99`, `out-{0000..9999..2}` every other
//! zero-padded number, `{a,b}-{0..1}` the cartesian product `a-0, a-1, b-0, b-1`.

use regex::Regex;

use crate::config::PadWidth;
use crate::error::{Result, SortError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Group {
    Range {
        start: u64,
        end: u64,
        step: u64,
        /// Zero-padding width, 0 for none.
        width: usize,
    },
    List(Vec<String>),
}

impl Group {
    fn len(&self) -> u64 {
        match self {
            // Checked at parse time: never overflows
            Group::Range { start, end, step, .. } => (end - start) / step + 1,
            Group::List(items) => items.len() as u64,
        }
    }

    fn render(&self, index: u64, out: &mut String) {
        match self {
            Group::Range {
                start, step, width, ..
            } => {
                let value = start + index * step;
                out.push_str(&format!("{:0width$}", value, width = *width));
            }
            Group::List(items) => out.push_str(&items[index as usize]),
        }
    }
}

/// A parsed brace-range pattern. Expansion is lazy: see [`Template::iter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    /// Literal text around the groups; always `groups.len() + 1` entries.
    literals: Vec<String>,
    groups: Vec<Group>,
}

impl Template {
    pub fn parse(pattern: &str, pad: PadWidth) -> Result<Self> {
        let re = Regex::new(r"\{([^{}]*)\}").map_err(|e| SortError::invalid_spec(e.to_string()))?;

        let mut literals = Vec::new();
        let mut groups = Vec::new();
        let mut last = 0;

        for caps in re.captures_iter(pattern) {
            let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            literals.push(literal(pattern, &pattern[last..whole.start()])?);
            groups.push(parse_group(pattern, inner.as_str(), pad)?);
            last = whole.end();
        }
        literals.push(literal(pattern, &pattern[last..])?);

        if groups.is_empty() {
            return Err(SortError::invalid_spec(format!(
                "template '{}' has no brace range",
                pattern
            )));
        }

        Ok(Self {
            source: pattern.to_string(),
            literals,
            groups,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of names the template expands to (saturating).
    pub fn count(&self) -> u64 {
        self.groups
            .iter()
            .fold(1u64, |acc, group| acc.saturating_mul(group.len()))
    }

    /// Fresh iterator over every name, left-most group varying slowest.
    pub fn iter(&self) -> TemplateIter<'_> {
        TemplateIter {
            template: self,
            indices: vec![0; self.groups.len()],
            done: false,
        }
    }

    fn render(&self, indices: &[u64]) -> String {
        let mut out = String::with_capacity(self.source.len());
        for (i, group) in self.groups.iter().enumerate() {
            out.push_str(&self.literals[i]);
            group.render(indices[i], &mut out);
        }
        out.push_str(&self.literals[self.groups.len()]);
        out
    }
}

impl<'a> IntoIterator for &'a Template {
    type Item = String;
    type IntoIter = TemplateIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct TemplateIter<'a> {
    template: &'a Template,
    indices: Vec<u64>,
    done: bool,
}

impl Iterator for TemplateIter<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.done {
            return None;
        }
        let name = self.template.render(&self.indices);

        // Odometer step, right-most group first
        self.done = true;
        for (i, group) in self.template.groups.iter().enumerate().rev() {
            self.indices[i] += 1;
            if self.indices[i] < group.len() {
                self.done = false;
                break;
            }
            self.indices[i] = 0;
        }

        Some(name)
    }
}

fn literal(pattern: &str, text: &str) -> Result<String> {
    if text.contains('{') || text.contains('}') {
        return Err(SortError::invalid_spec(format!(
            "unbalanced braces in template '{}'",
            pattern
        )));
    }
    Ok(text.to_string())
}

fn parse_group(pattern: &str, inner: &str, pad: PadWidth) -> Result<Group> {
    let range = Regex::new(r"^(\d+)\.\.(\d+)(?:\.\.(\d+))?$")
        .map_err(|e| SortError::invalid_spec(e.to_string()))?;

    if let Some(caps) = range.captures(inner) {
        let start_lit = &caps[1];
        let end_lit = &caps[2];
        let start = parse_number(pattern, start_lit)?;
        let end = parse_number(pattern, end_lit)?;
        let step = match caps.get(3) {
            Some(step) => parse_number(pattern, step.as_str())?,
            None => 1,
        };

        if start > end {
            return Err(SortError::invalid_spec(format!(
                "range {{{}}} in '{}' is empty",
                inner, pattern
            )));
        }
        if step == 0 {
            return Err(SortError::invalid_spec(format!(
                "range {{{}}} in '{}' has zero step",
                inner, pattern
            )));
        }
        if ((end - start) / step).checked_add(1).is_none() {
            return Err(SortError::invalid_spec(format!(
                "range {{{}}} in '{}' has too many values",
                inner, pattern
            )));
        }

        let padded = has_leading_zero(start_lit) || has_leading_zero(end_lit);
        let width = match (padded, pad) {
            (false, _) => 0,
            (true, PadWidth::Widest) => start_lit.len().max(end_lit.len()),
            (true, PadWidth::Start) => start_lit.len(),
        };

        return Ok(Group::Range {
            start,
            end,
            step,
            width,
        });
    }

    if inner.contains(',') {
        let items: Vec<String> = inner.split(',').map(str::to_string).collect();
        if items.iter().any(|item| item.is_empty()) {
            return Err(SortError::invalid_spec(format!(
                "empty item in {{{}}} of '{}'",
                inner, pattern
            )));
        }
        return Ok(Group::List(items));
    }

    Err(SortError::invalid_spec(format!(
        "malformed brace group {{{}}} in '{}'",
        inner, pattern
    )))
}

fn parse_number(pattern: &str, literal: &str) -> Result<u64> {
    literal.parse().map_err(|_| {
        SortError::invalid_spec(format!("number '{}' in '{}' out of range", literal, pattern))
    })
}

fn has_leading_zero(literal: &str) -> bool {
    literal.len() > 1 && literal.starts_with('0')
}
