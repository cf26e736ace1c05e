/// Reduces a raw email body to the sender's own words before it reaches the
/// classifier: quoted-reply blocks, forwarded headers, and trailing
/// signatures are noise that skews extraction.
pub fn clean_body(raw: &str) -> String {
    let stripped = strip_quoted_replies(raw);
    let unsigned = strip_signature(&stripped);
    collapse_newlines(&unsigned).trim().to_string()
}

/// Drops `>` quote lines, and truncates at the first reply or forward
/// header. Everything below such a header is the counterpart's text.
fn strip_quoted_replies(raw: &str) -> String {
    let mut kept = Vec::new();

    for line in raw.lines() {
        let trimmed = line.trim();
        if is_reply_header(trimmed) {
            break;
        }
        if trimmed.starts_with('>') {
            continue;
        }
        kept.push(line);
    }

    kept.join("\n")
}

fn is_reply_header(line: &str) -> bool {
    if line.starts_with("On ") && line.ends_with("wrote:") {
        return true;
    }
    if line.starts_with("From:") {
        return true;
    }
    if line.contains("-----Original Message-----") {
        return true;
    }
    if line.starts_with("---------- Forwarded message") || line.starts_with("Begin forwarded message") {
        return true;
    }
    // Bare separator line opening a quoted block.
    line.len() >= 5 && line.chars().all(|c| c == '-' || c == '_')
}

fn strip_signature(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();

    let cut = lines.iter().enumerate().skip(1).find_map(|(index, line)| {
        let trimmed = line.trim();
        if trimmed == "--" {
            return Some(index);
        }
        let lowered = trimmed.to_ascii_lowercase();
        if lowered.starts_with("sent from ") {
            return Some(index);
        }
        let phrase = lowered.trim_end_matches(|c| matches!(c, ',' | '!' | '.'));
        let closings = [
            "regards",
            "best regards",
            "kind regards",
            "warm regards",
            "best",
            "thanks",
            "thank you",
            "cheers",
            "sincerely",
        ];
        closings.contains(&phrase).then_some(index)
    });

    match cut {
        Some(index) => lines[..index].join("\n"),
        None => text.to_string(),
    }
}

/// Collapses runs of three or more newlines down to two.
fn collapse_newlines(text: &str) -> String {
    let mut collapsed = String::with_capacity(text.len());
    let mut newline_run = 0usize;

    for character in text.chars() {
        if character == '\n' {
            newline_run += 1;
            if newline_run <= 2 {
                collapsed.push('\n');
            }
        } else {
            newline_run = 0;
            collapsed.push(character);
        }
    }

    collapsed
}

#[cfg(test)]
mod tests {
    use super::clean_body;

    #[test]
    fn strips_quoted_reply_block_with_wrote_header() {
        let raw = "I'll have it by Friday.\n\nOn Tue, Jan 5 at 3:00 PM, Boss <boss@x.com> wrote:\n> original text";
        assert_eq!(clean_body(raw), "I'll have it by Friday.");
    }

    #[test]
    fn strips_original_message_block() {
        let raw = "Done, see attached.\n\n-----Original Message-----\nFrom: Boss\nSubject: report";
        assert_eq!(clean_body(raw), "Done, see attached.");
    }

    #[test]
    fn strips_from_header_block() {
        let raw = "Working on it.\n\nFrom: Boss <boss@x.com>\nSent: Monday\nblah";
        assert_eq!(clean_body(raw), "Working on it.");
    }

    #[test]
    fn strips_interleaved_quote_lines() {
        let raw = "Agreed on the plan.\n> what about the deadline?\nStill Jan 10.";
        assert_eq!(clean_body(raw), "Agreed on the plan.\nStill Jan 10.");
    }

    #[test]
    fn strips_double_dash_signature() {
        let raw = "Shipping tomorrow.\n--\nRiley Johnson\nACME Corp";
        assert_eq!(clean_body(raw), "Shipping tomorrow.");
    }

    #[test]
    fn strips_closing_phrase_signature() {
        let raw = "The draft is ready for review.\n\nBest regards,\nRiley";
        assert_eq!(clean_body(raw), "The draft is ready for review.");
    }

    #[test]
    fn strips_sent_from_device_line() {
        let raw = "ok will do\n\nSent from my iPhone";
        assert_eq!(clean_body(raw), "ok will do");
    }

    #[test]
    fn keeps_thanks_mid_sentence() {
        let raw = "Thanks for the update! I'll review today.";
        assert_eq!(clean_body(raw), "Thanks for the update! I'll review today.");
    }

    #[test]
    fn keeps_a_message_that_is_only_a_closing_word() {
        assert_eq!(clean_body("Thanks!"), "Thanks!");
    }

    #[test]
    fn collapses_three_or_more_newlines_to_two() {
        let raw = "first\n\n\n\nsecond";
        assert_eq!(clean_body(raw), "first\n\nsecond");
    }

    #[test]
    fn truncates_at_forwarded_message_header() {
        let raw = "FYI below.\n\n---------- Forwarded message ---------\nFrom: someone";
        assert_eq!(clean_body(raw), "FYI below.");
    }
}
