//! Picks likely person names and addresses out of a natural-language request.

/// Capitalised words that start requests or name dates rather than people.
const NOT_NAMES: &[&str] = &[
    "a", "an", "the", "i", "i'm", "i'd", "hi", "hello", "hey", "dear", "please", "can", "could",
    "would", "will", "you", "we", "my", "our", "email", "mail", "send", "write", "draft", "reply",
    "tell", "ask", "let", "remind", "schedule", "book", "set", "invite", "meet", "meeting", "call",
    "about", "and", "or", "with", "to", "from", "for", "on", "at", "in", "by", "thanks", "regards",
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday", "today",
    "tomorrow", "january", "february", "march", "april", "may", "june", "july", "august",
    "september", "october", "november", "december", "zoom", "google", "gmail",
];

fn clean(token: &str) -> &str {
    let token = token.trim_matches(|c: char| !c.is_alphanumeric() && c != '@' && c != '.' && c != '\'');
    let token = token.trim_end_matches('.');
    token
        .strip_suffix("'s")
        .or_else(|| token.strip_suffix("’s"))
        .unwrap_or(token)
}

fn is_name_word(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) if first.is_uppercase() => {
            chars.all(|c| c.is_alphabetic() || c == '-' || c == '\'')
                && !NOT_NAMES.contains(&word.to_lowercase().as_str())
        }
        _ => false,
    }
}

fn flush(run: &mut Vec<&str>, names: &mut Vec<String>) {
    if !run.is_empty() {
        let name = run.join(" ");
        if !names.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
            names.push(name);
        }
        run.clear();
    }
}

/// Runs of capitalised words ("John Doe") and bare email addresses, in order
/// of appearance and without duplicates.
pub fn extract_names(prompt: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut run: Vec<&str> = Vec::new();

    for raw in prompt.split_whitespace() {
        let token = clean(raw);
        let ends_phrase = raw.ends_with([',', ';', ':', '.', '!', '?']);

        if token.contains('@') {
            flush(&mut run, &mut names);
            if !names.iter().any(|n| n.eq_ignore_ascii_case(token)) {
                names.push(token.to_string());
            }
            continue;
        }

        if is_name_word(token) {
            run.push(token);
            if ends_phrase {
                flush(&mut run, &mut names);
            }
        } else {
            flush(&mut run, &mut names);
        }
    }
    flush(&mut run, &mut names);

    names
}
