//! `SegmentTemplate` identifier substitution.
//!
//! Supports `$RepresentationID$`, `$Number$`, `$Time$` and `$Bandwidth$`, each optionally with a
//! `%0<width>d` zero-padding format tag, and the `$$` escape for a literal dollar sign.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static TEMPLATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\$|\$(RepresentationID|Number|Time|Bandwidth)(?:%0(\d+)d)?\$").unwrap()
});

/// Values available for substitution. Identifiers without a value are left untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateVars<'a> {
    pub representation_id: &'a str,
    pub bandwidth: u64,
    pub number: Option<u64>,
    pub time: Option<u64>,
}

impl<'a> TemplateVars<'a> {
    pub fn new(representation_id: &'a str, bandwidth: u64) -> Self {
        Self {
            representation_id,
            bandwidth,
            number: None,
            time: None,
        }
    }

    pub fn with_number(mut self, number: u64) -> Self {
        self.number = Some(number);
        self
    }

    pub fn with_time(mut self, time: u64) -> Self {
        self.time = Some(time);
        self
    }

    fn lookup(&self, identifier: &str) -> Option<String> {
        match identifier {
            "RepresentationID" => Some(self.representation_id.to_string()),
            "Bandwidth" => Some(self.bandwidth.to_string()),
            "Number" => self.number.map(|n| n.to_string()),
            "Time" => self.time.map(|t| t.to_string()),
            _ => None,
        }
    }
}

/// Expands every identifier of `template` using `vars`.
pub fn resolve(template: &str, vars: &TemplateVars<'_>) -> String {
    TEMPLATE_REGEX
        .replace_all(template, |caps: &Captures<'_>| {
            let Some(identifier) = caps.get(1) else {
                return "$".to_string();
            };
            let Some(value) = vars.lookup(identifier.as_str()) else {
                return caps[0].to_string();
            };
            match caps.get(2).and_then(|w| w.as_str().parse::<usize>().ok()) {
                Some(width) => format!("{value:0>width$}"),
                None => value,
            }
        })
        .into_owned()
}
