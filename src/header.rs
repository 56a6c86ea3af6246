//! Extraction of `(display name, address)` pairs from raw `From`/`To` header values.
//!
//! Parsing never fails: anything that does not look like `Name <address>` is
//! returned unchanged as both the name and the address.

use crate::contact::Contact;

/// Parses one mailbox, e.g. `"Jane Doe" <jane@x.com>` or `jane@x.com`.
pub fn parse_header(value: &str) -> (String, String) {
    if let Some(open) = value.find('<') {
        if let Some(len) = value[open + 1..].find('>') {
            let name = value[..open].trim().trim_matches('"').trim();
            let address = value[open + 1..open + 1 + len].trim();
            return (name.to_string(), address.to_string());
        }
    }

    let trimmed = value.trim();
    (trimmed.to_string(), trimmed.to_string())
}

/// Splits a recipient list on `", "` and parses each mailbox.
pub fn parse_address_list(value: &str) -> Vec<(String, String)> {
    value
        .split(", ")
        .filter(|part| !part.trim().is_empty())
        .map(parse_header)
        .collect()
}

/// Parses a header value into contacts, skipping entries with no address at all.
pub fn contacts_from_header(value: &str) -> Vec<Contact> {
    parse_address_list(value)
        .into_iter()
        .filter(|(_, address)| !address.is_empty())
        .map(|(name, address)| Contact::new(name, address))
        .collect()
}
