//! Contact value type and an address-keyed set of contacts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// A mailbox seen in a message header.
///
/// Two contacts are equal when their addresses match case-insensitively; the
/// display name does not take part in equality or hashing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub address: String,
}

impl Contact {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    pub fn key(&self) -> String {
        self.address.to_lowercase()
    }

    /// Case-insensitive containment of an already-lowercased needle in the name or address.
    pub fn matches_lowercase(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle) || self.address.to_lowercase().contains(needle)
    }
}

impl PartialEq for Contact {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Contact {}

impl Hash for Contact {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// Contacts deduplicated by address. The first contact inserted for an
/// address keeps its display name; iteration follows insertion order.
#[derive(Debug, Clone, Default)]
pub struct ContactSet {
    contacts: Vec<Contact>,
    index: HashMap<String, usize>,
}

impl ContactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when a contact with the same address was already present.
    pub fn insert(&mut self, contact: Contact) -> bool {
        let key = contact.key();
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key, self.contacts.len());
        self.contacts.push(contact);
        true
    }

    pub fn extend<I: IntoIterator<Item = Contact>>(&mut self, contacts: I) {
        for contact in contacts {
            self.insert(contact);
        }
    }

    pub fn merge(&mut self, other: ContactSet) {
        self.extend(other.contacts);
    }

    pub fn get(&self, address: &str) -> Option<&Contact> {
        self.index
            .get(&address.to_lowercase())
            .map(|&i| &self.contacts[i])
    }

    pub fn contains(&self, address: &str) -> bool {
        self.index.contains_key(&address.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Contact> {
        self.contacts.iter()
    }

    pub fn into_vec(self) -> Vec<Contact> {
        self.contacts
    }
}

impl FromIterator<Contact> for ContactSet {
    fn from_iter<I: IntoIterator<Item = Contact>>(iter: I) -> Self {
        let mut set = ContactSet::new();
        set.extend(iter);
        set
    }
}

impl IntoIterator for ContactSet {
    type Item = Contact;
    type IntoIter = std::vec::IntoIter<Contact>;

    fn into_iter(self) -> Self::IntoIter {
        self.contacts.into_iter()
    }
}

impl<'a> IntoIterator for &'a ContactSet {
    type Item = &'a Contact;
    type IntoIter = std::slice::Iter<'a, Contact>;

    fn into_iter(self) -> Self::IntoIter {
        self.contacts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_ignores_name_and_case() {
        assert_eq!(
            Contact::new("Bob", "Bob@Y.com"),
            Contact::new("Robert", "bob@y.com")
        );
    }

    #[test]
    fn test_first_insert_wins() {
        let mut set = ContactSet::new();
        assert!(set.insert(Contact::new("Bob", "bob@y.com")));
        assert!(!set.insert(Contact::new("Robert", "BOB@y.com")));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("bob@y.com").unwrap().name, "Bob");
    }
}
