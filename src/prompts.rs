//! Instructions appended to the persona system message.

use crate::store::ChatMessage;
use chrono::NaiveDate;

/// Drafting instructions. `sender_name` and `sender_email` sign off the email.
pub fn draft_instructions(sender_name: &str, sender_email: &str, today: NaiveDate) -> String {
    format!(
        "You are helping the user draft an email.\n\
         Write a professional, concise email based on the user's request.\n\
         Put the subject alone on the first line, then the body.\n\
         Sign the email as {} ({}).\n\
         Do not use placeholders or dummy text: the email will be sent exactly as written.\n\
         Today's date is {}.",
        sender_name,
        sender_email,
        today.format("%d/%m/%Y")
    )
}

/// The previous turns of a conversation, rendered as one system message.
pub fn conversation_context(messages: &[ChatMessage]) -> Option<String> {
    if messages.is_empty() {
        return None;
    }

    let history = messages
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n");

    Some(format!(
        "Here is the conversation so far. Keep it in mind when you answer:\n{}",
        history
    ))
}

/// Splits a generated email into subject and body. The first non-blank line
/// is the subject, without any leading `Subject:` label.
pub fn split_subject_and_body(text: &str) -> (String, String) {
    let text = text.trim();
    let (first, rest) = match text.split_once('\n') {
        Some((first, rest)) => (first, rest),
        None => (text, ""),
    };

    let first = first.trim();
    let subject = match first.get(..8) {
        Some(label) if label.eq_ignore_ascii_case("subject:") => first[8..].trim(),
        _ => first,
    };

    (subject.to_string(), rest.trim().to_string())
}
