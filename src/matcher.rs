//! Matching free-text candidate names against harvested contacts.

use crate::contact::{Contact, ContactSet};

/// Returns every contact whose name or address contains one of the candidates,
/// compared case-insensitively and deduplicated by address.
///
/// Blank candidates are skipped: an empty needle would match the whole pool.
pub fn match_contacts<'a, S, I>(candidates: &[S], pool: I) -> ContactSet
where
    S: AsRef<str>,
    I: IntoIterator<Item = &'a Contact> + Clone,
{
    let needles: Vec<String> = candidates
        .iter()
        .map(|c| c.as_ref().trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .collect();

    let mut matches = ContactSet::new();
    for needle in &needles {
        for contact in pool.clone() {
            if contact.matches_lowercase(needle) {
                matches.insert(contact.clone());
            }
        }
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Vec<Contact> {
        vec![
            Contact::new("Bob Stone", "bob@y.com"),
            Contact::new("Alice", "alice@z.com"),
            Contact::new("Bobby", "BOB@y.com"),
        ]
    }

    #[test]
    fn test_substring_on_name_or_address() {
        let pool = pool();
        let found = match_contacts(&["stone"], &pool);
        assert_eq!(found.len(), 1);
        let found = match_contacts(&["z.com"], &pool);
        assert!(found.contains("alice@z.com"));
    }

    #[test]
    fn test_blank_candidate_matches_nothing() {
        let pool = pool();
        assert!(match_contacts(&["   "], &pool).is_empty());
        assert!(match_contacts::<&str, _>(&[], &pool).is_empty());
    }

    #[test]
    fn test_dedup_keeps_first_name() {
        let pool = pool();
        let found = match_contacts(&["bob"], &pool);
        assert_eq!(found.len(), 1);
        assert_eq!(found.get("bob@y.com").unwrap().name, "Bob Stone");
    }
}
