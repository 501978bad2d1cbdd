//! File name templates
//!
//! A pattern is plain text with `{Token}` or `{Token:format}` placeholders:
//!
//! | Token | Value |
//! |-------|-------|
//! | `MachineName` | host name |
//! | `ApplicationName` | configured application name |
//! | `GroupName` | record group |
//! | `DateTimeUtc` | UTC reading, default format `yyyyMMdd` |
//! | `DateTime` | local reading, default format `yyyyMMdd` |
//!
//! Token names match case-insensitively. Unknown tokens stay in the output
//! verbatim so a misconfigured pattern is visible in the file name.
//!
//! Date formats use the `yyyy MM dd HH mm ss fff` vocabulary; `MMM`/`MMMM`
//! give the English month name (abbreviated/full) and `ddd`/`dddd` the
//! weekday name. Text inside single quotes and characters after `\` are
//! copied literally.

use chrono::{Datelike, NaiveDateTime, Timelike};
use std::fmt::Write as _;

use crate::clock::Clock;

const DEFAULT_DATE_FORMAT: &str = "yyyyMMdd";

/// Renders name patterns for one machine.
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    machine_name: String,
}

enum Token<'a> {
    Literal(&'a str),
    Placeholder { raw: &'a str, name: &'a str, format: Option<&'a str> },
}

impl TemplateEngine {
    /// Engine using the host name of this machine.
    pub fn new() -> Self {
        Self::with_machine_name(gethostname::gethostname().to_string_lossy())
    }

    pub fn with_machine_name(machine_name: impl Into<String>) -> Self {
        Self {
            machine_name: machine_name.into(),
        }
    }

    pub fn machine_name(&self) -> &str {
        &self.machine_name
    }

    /// Concrete file name for `group_name` at the clock's current time.
    pub fn generate_file_name(
        &self,
        application_name: &str,
        clock: &dyn Clock,
        group_name: &str,
        pattern: &str,
    ) -> String {
        let utc = clock.utc_now();
        let utc_naive = utc.naive_utc();
        let local = clock.to_local(utc);
        let mut out = String::with_capacity(pattern.len() + 32);

        for token in tokens(pattern) {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Placeholder { raw, name, format } => {
                    if name.eq_ignore_ascii_case("MachineName") {
                        out.push_str(&self.machine_name);
                    } else if name.eq_ignore_ascii_case("ApplicationName") {
                        out.push_str(application_name);
                    } else if name.eq_ignore_ascii_case("GroupName") {
                        out.push_str(group_name);
                    } else if name.eq_ignore_ascii_case("DateTimeUtc") {
                        format_date(&mut out, &utc_naive, format.unwrap_or(DEFAULT_DATE_FORMAT));
                    } else if name.eq_ignore_ascii_case("DateTime") {
                        format_date(&mut out, &local, format.unwrap_or(DEFAULT_DATE_FORMAT));
                    } else {
                        out.push_str(raw);
                    }
                }
            }
        }

        out
    }

    /// Glob matching every group/date/rotation variant of `pattern`.
    ///
    /// Group and date tokens become `*`; the final extension gains a leading
    /// `*` so rotated names (`name.3.log`) match alongside `name.log`.
    pub fn generate_wildcard_file_name(&self, application_name: &str, pattern: &str) -> String {
        let mut out = String::with_capacity(pattern.len() + 8);

        for token in tokens(pattern) {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Placeholder { raw, name, .. } => {
                    if name.eq_ignore_ascii_case("MachineName") {
                        out.push_str(&self.machine_name);
                    } else if name.eq_ignore_ascii_case("ApplicationName") {
                        out.push_str(application_name);
                    } else if name.eq_ignore_ascii_case("GroupName")
                        || name.eq_ignore_ascii_case("DateTimeUtc")
                        || name.eq_ignore_ascii_case("DateTime")
                    {
                        out.push('*');
                    } else {
                        out.push_str(raw);
                    }
                }
            }
        }

        match out.rfind('.') {
            Some(dot) => out.insert(dot + 1, '*'),
            None => out.push('*'),
        }
        out
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// `name.ext` -> `name.{index}.ext`; index 0 keeps the plain name.
pub fn rotated_file_name(base_file_name: &str, index: u32) -> String {
    if index == 0 {
        return base_file_name.to_string();
    }
    match base_file_name.rfind('.') {
        Some(dot) if dot > 0 => format!(
            "{}.{}{}",
            &base_file_name[..dot],
            index,
            &base_file_name[dot..]
        ),
        _ => format!("{}.{}", base_file_name, index),
    }
}

fn tokens(pattern: &str) -> impl Iterator<Item = Token<'_>> {
    let mut rest = pattern;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }

        let Some(open) = rest.find('{') else {
            let text = rest;
            rest = "";
            return Some(Token::Literal(text));
        };

        if open > 0 {
            let text = &rest[..open];
            rest = &rest[open..];
            return Some(Token::Literal(text));
        }

        let Some(close) = rest.find('}') else {
            let text = rest;
            rest = "";
            return Some(Token::Literal(text));
        };

        let raw = &rest[..=close];
        let inner = &rest[1..close];
        rest = &rest[close + 1..];

        let (name, format) = match inner.split_once(':') {
            Some((name, format)) => (name.trim(), Some(format).filter(|f| !f.is_empty())),
            None => (inner.trim(), None),
        };
        Some(Token::Placeholder { raw, name, format })
    })
}

fn format_date(out: &mut String, value: &NaiveDateTime, format: &str) {
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                for literal in chars.by_ref() {
                    if literal == '\'' {
                        break;
                    }
                    out.push(literal);
                }
                continue;
            }
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
                continue;
            }
            _ => {}
        }

        let mut run = 1;
        while chars.next_if_eq(&c).is_some() {
            run += 1;
        }

        match c {
            'y' => {
                let year = value.year();
                if run <= 2 {
                    let _ = write!(out, "{:0width$}", year.rem_euclid(100), width = run);
                } else {
                    let _ = write!(out, "{:0width$}", year, width = run);
                }
            }
            'M' => match run {
                1 | 2 => {
                    let _ = write!(out, "{:0width$}", value.month(), width = run);
                }
                3 => {
                    let _ = write!(out, "{}", value.format("%b"));
                }
                _ => {
                    let _ = write!(out, "{}", value.format("%B"));
                }
            },
            'd' => match run {
                1 | 2 => {
                    let _ = write!(out, "{:0width$}", value.day(), width = run);
                }
                3 => {
                    let _ = write!(out, "{}", value.format("%a"));
                }
                _ => {
                    let _ = write!(out, "{}", value.format("%A"));
                }
            },
            'H' => {
                let _ = write!(out, "{:0width$}", value.hour(), width = run.min(2));
            }
            'h' => {
                let (_, hour12) = value.hour12();
                let _ = write!(out, "{:0width$}", hour12, width = run.min(2));
            }
            'm' => {
                let _ = write!(out, "{:0width$}", value.minute(), width = run.min(2));
            }
            's' => {
                let _ = write!(out, "{:0width$}", value.second(), width = run.min(2));
            }
            'f' => {
                let digits = run.min(9);
                let nanos = value.nanosecond() % 1_000_000_000;
                let scaled = nanos / 10u32.pow(9 - digits as u32);
                let _ = write!(out, "{:0width$}", scaled, width = digits);
            }
            other => {
                for _ in 0..run {
                    out.push(other);
                }
            }
        }
    }
}
