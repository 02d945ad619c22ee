//! # Public Profile
//!
//! The public half of a synced identity record.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        PUBLIC PROFILE                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  username: String       account name, fixed at creation                 │
//! │  displayName: String    1-64 characters, defaults to the username       │
//! │  avatar: String|null    URL or data URI, max 256KB                      │
//! │  bio: String|null       0-512 characters                                │
//! │  updatedAt: i64         Unix milliseconds of the last change            │
//! │                                                                         │
//! │  Updates are applied one field at a time through ProfileUpdate and     │
//! │  validated before they touch the profile.                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Maximum length for display name
pub const MAX_DISPLAY_NAME_LENGTH: usize = 64;

/// Maximum length for bio
pub const MAX_BIO_LENGTH: usize = 512;

/// Maximum size for avatar data
pub const MAX_AVATAR_SIZE: usize = 256 * 1024; // 256KB

/// Public profile carried in synced identity records
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    /// Account username
    pub username: String,

    /// Human-readable display name
    pub display_name: String,

    /// Optional avatar
    pub avatar: Option<String>,

    /// Optional bio
    pub bio: Option<String>,

    /// Last change, Unix milliseconds
    pub updated_at: i64,
}

/// A single-field profile change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileUpdate {
    /// Change display name
    DisplayName(String),
    /// Set or clear the avatar
    Avatar(Option<String>),
    /// Set or clear the bio
    Bio(Option<String>),
}

impl PublicProfile {
    /// A fresh profile whose display name is the username
    pub fn new(username: impl Into<String>, updated_at: i64) -> Self {
        let username = username.into();
        Self {
            display_name: username.clone(),
            username,
            avatar: None,
            bio: None,
            updated_at,
        }
    }

    /// Validate every field
    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(Error::Validation("Username cannot be empty".into()));
        }
        validate_display_name(&self.display_name)?;
        validate_avatar(self.avatar.as_deref())?;
        validate_bio(self.bio.as_deref())
    }

    /// Apply an update, stamping `updated_at` on success
    ///
    /// The profile is left unchanged when the update is rejected.
    pub fn apply_update(&mut self, update: ProfileUpdate, now_millis: i64) -> Result<()> {
        match update {
            ProfileUpdate::DisplayName(name) => {
                validate_display_name(&name)?;
                self.display_name = name;
            }
            ProfileUpdate::Avatar(avatar) => {
                validate_avatar(avatar.as_deref())?;
                self.avatar = avatar;
            }
            ProfileUpdate::Bio(bio) => {
                validate_bio(bio.as_deref())?;
                self.bio = bio;
            }
        }
        self.updated_at = now_millis;
        Ok(())
    }
}

fn validate_display_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Validation("Display name cannot be empty".into()));
    }
    if name.chars().count() > MAX_DISPLAY_NAME_LENGTH {
        return Err(Error::Validation(format!(
            "Display name too long: max {} characters",
            MAX_DISPLAY_NAME_LENGTH
        )));
    }
    Ok(())
}

fn validate_avatar(avatar: Option<&str>) -> Result<()> {
    match avatar {
        Some(a) if a.len() > MAX_AVATAR_SIZE => Err(Error::Validation(format!(
            "Avatar too large: max {} bytes",
            MAX_AVATAR_SIZE
        ))),
        _ => Ok(()),
    }
}

fn validate_bio(bio: Option<&str>) -> Result<()> {
    match bio {
        Some(b) if b.chars().count() > MAX_BIO_LENGTH => Err(Error::Validation(format!(
            "Bio too long: max {} characters",
            MAX_BIO_LENGTH
        ))),
        _ => Ok(()),
    }
}

// ============================================================================
// TESTS
// ============================================================================
