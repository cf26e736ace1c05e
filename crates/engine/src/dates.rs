use chrono::{Datelike, NaiveDate};

/// Confidence attached to deterministically extracted dates. Sits exactly at
/// the merge floor: enough to fill an empty field, with the fill-empty-only
/// rule keeping it from ever displacing a classifier extraction.
pub const FALLBACK_CONFIDENCE: f64 = 0.6;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedDate {
    pub date: NaiveDate,
    pub snippet: String,
}

/// Deterministic scan for an explicit date in free text: ISO `2026-01-15`,
/// `Jan 15`, `January 15, 2026`, `15 January`. Returns the first hit. Years
/// are inferred from `reference` when omitted, rolling forward when the date
/// has already passed.
pub fn extract_due_date(text: &str, reference: NaiveDate) -> Option<ExtractedDate> {
    let tokens = tokenize(text);

    for (index, token) in tokens.iter().enumerate() {
        if let Some(date) = parse_iso(token) {
            return Some(ExtractedDate { date, snippet: token.clone() });
        }

        if let Some(month) = month_number(token) {
            // "Jan 15" / "January 15, 2026"
            if let Some(day_token) = tokens.get(index + 1) {
                if let Some(day) = parse_day(day_token) {
                    let year = tokens.get(index + 2).and_then(|t| parse_year(t));
                    if let Some(date) = resolve(year, month, day, reference) {
                        let mut snippet = format!("{token} {day_token}");
                        if let Some(year) = year {
                            snippet.push_str(&format!(" {year}"));
                        }
                        return Some(ExtractedDate { date, snippet });
                    }
                }
            }
            // "15 January"
            if index > 0 {
                if let Some(day) = parse_day(&tokens[index - 1]) {
                    let year = tokens.get(index + 1).and_then(|t| parse_year(t));
                    if let Some(date) = resolve(year, month, day, reference) {
                        return Some(ExtractedDate {
                            date,
                            snippet: format!("{} {token}", tokens[index - 1]),
                        });
                    }
                }
            }
        }
    }

    None
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|raw| raw.trim_matches(|c: char| matches!(c, ',' | '.' | '?' | '!' | ';' | ':' | ')' | '(')).to_string())
        .filter(|token| !token.is_empty())
        .collect()
}

fn parse_iso(token: &str) -> Option<NaiveDate> {
    let bytes = token.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    NaiveDate::parse_from_str(token, "%Y-%m-%d").ok()
}

fn month_number(token: &str) -> Option<u32> {
    let key = token.to_ascii_lowercase();
    let months = [
        ("jan", 1),
        ("feb", 2),
        ("mar", 3),
        ("apr", 4),
        ("may", 5),
        ("jun", 6),
        ("jul", 7),
        ("aug", 8),
        ("sep", 9),
        ("oct", 10),
        ("nov", 11),
        ("dec", 12),
    ];
    months.iter().find_map(|(prefix, number)| {
        let full = matches!(
            key.as_str(),
            "january"
                | "february"
                | "march"
                | "april"
                | "may"
                | "june"
                | "july"
                | "august"
                | "september"
                | "october"
                | "november"
                | "december"
        );
        (key == *prefix || (full && key.starts_with(prefix))).then_some(*number)
    })
}

fn parse_day(token: &str) -> Option<u32> {
    let digits = token.trim_end_matches(|c: char| matches!(c, 's' | 't' | 'h' | 'n' | 'd' | 'r'));
    let day = digits.parse::<u32>().ok()?;
    (1..=31).contains(&day).then_some(day)
}

fn parse_year(token: &str) -> Option<i32> {
    let year = token.parse::<i32>().ok()?;
    (2000..=2100).contains(&year).then_some(year)
}

fn resolve(year: Option<i32>, month: u32, day: u32, reference: NaiveDate) -> Option<NaiveDate> {
    match year {
        Some(year) => NaiveDate::from_ymd_opt(year, month, day),
        None => {
            let candidate = NaiveDate::from_ymd_opt(reference.year(), month, day)?;
            if candidate < reference {
                NaiveDate::from_ymd_opt(reference.year() + 1, month, day)
            } else {
                Some(candidate)
            }
        }
    }
}
