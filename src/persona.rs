//! AI personas the assistant speaks as.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "non-binary",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: u64,
    pub name: String,
    pub gender: Gender,
    pub country: String,
    pub language: String,
    pub role: String,
    pub characteristic: String,
    #[serde(default)]
    pub expertise: Option<String>,
}

impl Persona {
    /// The system prompt that gives the model this persona's voice.
    pub fn system_message(&self) -> String {
        format!(
            "You are {}, a {} AI from {}. You work as a {} and are known for being {}. \
             Your area of expertise is {}. You speak {}.",
            self.name,
            self.gender.as_str(),
            self.country,
            self.role,
            self.characteristic.to_lowercase(),
            self.expertise.as_deref().unwrap_or("general assistance"),
            self.language
        )
    }
}

/// Personas available on a fresh store. Ids start at 1.
pub fn default_personas() -> Vec<Persona> {
    vec![Persona {
        id: 1,
        name: "Atlas".to_string(),
        gender: Gender::Male,
        country: "United States".to_string(),
        language: "English".to_string(),
        role: "Secretary".to_string(),
        characteristic: "Charismatic".to_string(),
        expertise: Some("General".to_string()),
    }]
}
