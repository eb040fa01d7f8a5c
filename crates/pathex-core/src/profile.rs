use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A render profile (colour scheme / styling) name, normalised to lowercase.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Profile(String);

impl Profile {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The enumeration of profiles the service accepts, plus the one used when a request names none.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileSet {
    names: Vec<Profile>,
    default: Profile,
}

impl ProfileSet {
    pub fn new<I, S>(names: I, default: &str) -> Result<Self, ParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut profiles = Vec::new();
        for name in names {
            let profile = normalise(name.as_ref())?;
            if !profiles.contains(&profile) {
                profiles.push(profile);
            }
        }
        let default = normalise(default)?;
        if !profiles.contains(&default) {
            return Err(ParseError::UnknownProfile(default.0));
        }
        Ok(Self {
            names: profiles,
            default,
        })
    }

    pub fn names(&self) -> &[Profile] {
        &self.names
    }

    pub fn default_profile(&self) -> &Profile {
        &self.default
    }

    pub fn resolve(&self, requested: Option<&str>) -> Result<Profile, ParseError> {
        let Some(requested) = requested.filter(|value| !value.trim().is_empty()) else {
            return Ok(self.default.clone());
        };
        let profile = normalise(requested)?;
        if self.names.contains(&profile) {
            Ok(profile)
        } else {
            Err(ParseError::UnknownProfile(requested.to_string()))
        }
    }
}

impl Default for ProfileSet {
    /// `modern` and `standard`, defaulting to `modern`.
    fn default() -> Self {
        let modern = Profile("modern".to_owned());
        Self {
            names: vec![modern.clone(), Profile("standard".to_owned())],
            default: modern,
        }
    }
}

fn normalise(name: &str) -> Result<Profile, ParseError> {
    let name = name.trim().to_ascii_lowercase();
    // Profiles are directory names in the cache layout.
    if name.is_empty()
        || !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_'))
    {
        return Err(ParseError::UnknownProfile(name));
    }
    Ok(Profile(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_case_insensitively_with_default() {
        let set = ProfileSet::new(["Modern", "standard"], "modern").unwrap();
        assert_eq!(set.resolve(None).unwrap().as_str(), "modern");
        assert_eq!(set.resolve(Some("")).unwrap().as_str(), "modern");
        assert_eq!(set.resolve(Some("STANDARD")).unwrap().as_str(), "standard");
        assert!(set.resolve(Some("neon")).is_err());
        assert!(set.resolve(Some("../modern")).is_err());
    }

    #[test]
    fn default_must_be_listed() {
        assert!(ProfileSet::new(["modern"], "standard").is_err());
    }
}
