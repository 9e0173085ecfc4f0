// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use comfy_table::{presets::UTF8_FULL, Cell, Table};

const UA: &str = concat!(
    "pocketledger/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/alphavelocity/pocketledger)"
);

pub fn http_client() -> crate::error::Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .user_agent(UA)
        .build()
        .map_err(|e| crate::error::LedgerError::Transport(e.to_string()))
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))
}

pub fn parse_month(s: &str) -> Result<String> {
    NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d")
        .with_context(|| format!("Invalid month '{}', expected YYYY-MM", s))?;
    Ok(s.to_string())
}

/// Parses a decimal amount string ("12.34", "-5", "0.5") into signed
/// minor units without going through floating point.
pub fn parse_amount_minor(s: &str) -> Result<i64> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (whole, frac) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        anyhow::bail!("Invalid amount '{}'", s);
    }
    if frac.len() > 2 {
        anyhow::bail!("Invalid amount '{}': at most 2 decimal places", s);
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        anyhow::bail!("Invalid amount '{}'", s);
    }
    let whole_part: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().with_context(|| format!("Invalid amount '{}'", s))?
    };
    let mut frac_part: i64 = if frac.is_empty() {
        0
    } else {
        frac.parse().with_context(|| format!("Invalid amount '{}'", s))?
    };
    if frac.len() == 1 {
        frac_part *= 10;
    }
    let minor = whole_part
        .checked_mul(100)
        .and_then(|v| v.checked_add(frac_part))
        .with_context(|| format!("Amount '{}' out of range", s))?;
    Ok(if negative { -minor } else { minor })
}

/// Formats minor units as a decimal string ("-2500" -> "-25.00").
pub fn fmt_minor(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

pub fn pretty_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut t = Table::new();
    t.load_preset(UTF8_FULL);
    t.set_header(headers.iter().map(|h| Cell::new(*h)));
    for r in rows {
        t.add_row(r.into_iter().map(Cell::new));
    }
    t
}

pub fn maybe_print_json<T: serde::Serialize>(
    json_flag: bool,
    jsonl_flag: bool,
    v: &T,
) -> Result<bool> {
    if json_flag {
        println!("{}", serde_json::to_string_pretty(v)?);
        return Ok(true);
    }
    if jsonl_flag {
        // If v is an array, stream each element; else stream single line
        let val = serde_json::to_value(v)?;
        if let Some(arr) = val.as_array() {
            for item in arr {
                println!("{}", serde_json::to_string(item)?);
            }
        } else {
            println!("{}", serde_json::to_string(&val)?);
        }
        return Ok(true);
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_parse_to_minor_units() {
        assert_eq!(parse_amount_minor("12.34").unwrap(), 1234);
        assert_eq!(parse_amount_minor("-25").unwrap(), -2500);
        assert_eq!(parse_amount_minor("0.5").unwrap(), 50);
        assert_eq!(parse_amount_minor("-.99").unwrap(), -99);
        assert!(parse_amount_minor("1.234").is_err());
        assert!(parse_amount_minor("abc").is_err());
        assert!(parse_amount_minor("").is_err());
    }

    #[test]
    fn minor_units_format_back() {
        assert_eq!(fmt_minor(-2500), "-25.00");
        assert_eq!(fmt_minor(1234), "12.34");
        assert_eq!(fmt_minor(5), "0.05");
    }
}
