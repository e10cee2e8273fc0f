//! Account registration and login.
//!
//! Passwords are stored as Argon2id PHC strings; plaintext never reaches the store.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AuthError;
use crate::models::User;
use crate::store::Repository;

// User as returned by the API (no password hash)
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub nickname: String,
    pub email: String,
    pub created_at: DateTime<FixedOffset>,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            nickname: u.nickname,
            email: u.email,
            created_at: u.created_at,
        }
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|e| AuthError::Hashing(e.to_string()))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Hashing(e.to_string())),
    }
}

fn require(value: &str, what: &str) -> Result<(), AuthError> {
    if value.trim().is_empty() {
        return Err(AuthError::Validation(format!("Please enter {what}")));
    }
    Ok(())
}

/// Create a new account.
///
/// Email is normalized to lower case; both email and nickname must be unused.
pub fn register(
    repo: &dyn Repository,
    nickname: &str,
    email: &str,
    password: &str,
    now: DateTime<FixedOffset>,
) -> Result<User, AuthError> {
    require(nickname, "a nickname")?;
    require(email, "your email")?;
    require(password, "a password")?;

    let email = email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(AuthError::Validation("Please enter a valid email".to_string()));
    }

    if repo.find_user_by_email(&email)?.is_some() {
        return Err(AuthError::Conflict("Email already in use"));
    }
    if repo.find_user_by_nickname(nickname)?.is_some() {
        return Err(AuthError::Conflict("Nickname already in use"));
    }

    let user = User {
        id: Uuid::new_v4(),
        nickname: nickname.trim().to_string(),
        email,
        password_hash: hash_password(password)?,
        created_at: now,
    };
    repo.insert_user(user.clone())?;

    tracing::info!(user_id = %user.id, "user registered");
    Ok(user)
}

/// Check credentials. Unknown email and wrong password fail the same way.
pub fn login(repo: &dyn Repository, email: &str, password: &str) -> Result<User, AuthError> {
    require(email, "your email")?;
    require(password, "your password")?;

    let Some(user) = repo.find_user_by_email(email)? else {
        return Err(AuthError::InvalidCredentials);
    };
    if !verify_password(password, &user.password_hash)? {
        tracing::debug!(user_id = %user.id, "password mismatch");
        return Err(AuthError::InvalidCredentials);
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Local;

    fn now() -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }

    #[test]
    fn register_then_login() {
        let repo = MemoryStore::new();
        let user = register(&repo, "kim", " Kim@Example.com ", "hunter22", now()).unwrap();
        assert_eq!(user.email, "kim@example.com");
        assert_ne!(user.password_hash, "hunter22");

        let found = login(&repo, "KIM@example.com", "hunter22").unwrap();
        assert_eq!(found.id, user.id);
    }

    #[test]
    fn wrong_password_and_unknown_email_look_the_same() {
        let repo = MemoryStore::new();
        register(&repo, "kim", "kim@example.com", "hunter22", now()).unwrap();

        let a = login(&repo, "kim@example.com", "nope").unwrap_err();
        let b = login(&repo, "lee@example.com", "hunter22").unwrap_err();
        assert_eq!(a.to_string(), b.to_string());
        assert!(matches!(a, AuthError::InvalidCredentials));
    }

    #[test]
    fn duplicate_email_or_nickname_conflicts() {
        let repo = MemoryStore::new();
        register(&repo, "kim", "kim@example.com", "pw", now()).unwrap();

        let err = register(&repo, "other", "KIM@example.com", "pw", now()).unwrap_err();
        assert_eq!(err.to_string(), "Email already in use");
        let err = register(&repo, "kim", "new@example.com", "pw", now()).unwrap_err();
        assert_eq!(err.to_string(), "Nickname already in use");
    }

    #[test]
    fn blank_fields_are_rejected() {
        let repo = MemoryStore::new();
        let err = register(&repo, " ", "a@b.c", "pw", now()).unwrap_err();
        assert_eq!(err.to_string(), "Please enter a nickname");
        assert!(matches!(
            register(&repo, "kim", "not-an-email", "pw", now()),
            Err(AuthError::Validation(_))
        ));
        assert!(repo.list_users().unwrap().is_empty());
    }
}
