//! Registered users and password hash handling.
//!
//! Secrets are stored as argon2 PHC strings. Plaintext passwords are only ever
//! compared through `verify_password`.

use crate::auth::AuthFailure;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// A single registered user
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserRecord {
    /// Display name shown once logged in
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Argon2 PHC hash of the password
    pub password: String,
}

#[derive(Debug, Error)]
#[error("password hashing failed: {0}")]
pub struct HashError(String);

/// Immutable map of username -> user record.
///
/// Usernames are case-insensitive: keys are lowercased on construction and
/// lookups lowercase their input. Entries that only differ by case cannot
/// both be kept; the first in sorted order wins and the name is reported by
/// `collisions()`.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    users: HashMap<String, UserRecord>,
    collisions: Vec<String>,
}

impl Credentials {
    pub fn new(users: HashMap<String, UserRecord>) -> Self {
        let mut entries: Vec<_> = users.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut normalized = HashMap::new();
        let mut collisions = Vec::new();
        for (username, record) in entries {
            let key = normalize_username(&username);
            if normalized.contains_key(&key) {
                if !collisions.contains(&key) {
                    collisions.push(key);
                }
                continue;
            }
            normalized.insert(key, record);
        }
        collisions.sort();
        Self {
            users: normalized,
            collisions,
        }
    }

    /// Normalized usernames that more than one entry mapped to
    pub fn collisions(&self) -> &[String] {
        &self.collisions
    }

    pub fn get(&self, username: &str) -> Option<&UserRecord> {
        self.users.get(&normalize_username(username))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Sorted list of usernames
    pub fn usernames(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.users.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &UserRecord)> {
        self.users.iter()
    }

    /// Check a username/password pair against the stored hash
    pub fn verify(&self, username: &str, password: &str) -> Result<&UserRecord, AuthFailure> {
        let record = self.get(username).ok_or(AuthFailure::UnknownUser)?;
        if verify_password(&record.password, password) {
            Ok(record)
        } else {
            Err(AuthFailure::BadPassword)
        }
    }
}

pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

/// Hash a password into an argon2 PHC string with a random salt
pub fn hash_password(password: &str) -> Result<String, HashError> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| HashError(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| HashError(e.to_string()))?;
    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| HashError(e.to_string()))?
        .to_string();
    Ok(phc)
}

/// Verify a password against a PHC string. Unparseable hashes never match.
pub fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// True if `hash` is a syntactically valid PHC string
pub fn is_valid_hash(hash: &str) -> bool {
    PasswordHash::new(hash).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(username: &str, password: &str) -> Credentials {
        let mut users = HashMap::new();
        users.insert(
            username.to_string(),
            UserRecord {
                name: "Test User".to_string(),
                email: None,
                password: hash_password(password).unwrap(),
            },
        );
        Credentials::new(users)
    }

    #[test]
    fn test_hash_is_not_plaintext() {
        let hash = hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(!hash.contains("hunter22"));
        assert!(is_valid_hash(&hash));
    }

    #[test]
    fn test_hash_uses_fresh_salt() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
        assert!(verify_password(&a, "same"));
        assert!(verify_password(&b, "same"));
    }

    #[test]
    fn test_verify_password() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password(&hash, "correct horse"));
        assert!(!verify_password(&hash, "correct horse "));
        assert!(!verify_password("not-a-hash", "correct horse"));
    }

    #[test]
    fn test_verify_credentials() {
        let store = store_with("jsmith", "abc12345");
        assert!(store.verify("jsmith", "abc12345").is_ok());
        assert_eq!(
            store.verify("jsmith", "wrong").unwrap_err(),
            AuthFailure::BadPassword
        );
        assert_eq!(
            store.verify("nobody", "abc12345").unwrap_err(),
            AuthFailure::UnknownUser
        );
    }

    #[test]
    fn test_usernames_are_case_insensitive() {
        let store = store_with("JSmith", "abc12345");
        assert_eq!(store.usernames(), vec!["jsmith"]);
        assert!(store.verify("JSMITH", "abc12345").is_ok());
        assert!(store.get(" jsmith ").is_some());
    }

    #[test]
    fn test_case_collisions_are_reported() {
        let mut users = HashMap::new();
        for (username, password) in [("JSmith", "upper-pw1"), ("jsmith", "lower-pw1")] {
            users.insert(
                username.to_string(),
                UserRecord {
                    name: username.to_string(),
                    email: None,
                    password: hash_password(password).unwrap(),
                },
            );
        }
        let store = Credentials::new(users);
        assert_eq!(store.collisions(), ["jsmith".to_string()]);
        assert_eq!(store.len(), 1);
        // "JSmith" sorts before "jsmith"
        assert_eq!(store.get("jsmith").unwrap().name, "JSmith");
    }

    #[test]
    fn test_no_collisions_for_distinct_names() {
        let store = store_with("jsmith", "abc12345");
        assert!(store.collisions().is_empty());
    }

    #[test]
    fn test_empty_store_rejects_everyone() {
        let store = Credentials::default();
        assert!(store.is_empty());
        assert_eq!(
            store.verify("admin", "admin").unwrap_err(),
            AuthFailure::UnknownUser
        );
    }
}
