//! User context: owns users, publishes their lifecycle.

use crate::emitter::Emitter;
use crate::error::{Result, TrackerError};
use crate::events::TrackerEvent;
use crate::types::{UserId, non_empty};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::info;
use tracker_core::CorrelationContext;

/// A registered user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Identity
    pub id: UserId,
    /// Unique contact address
    pub email: String,
    /// Display name
    pub name: String,
}

/// Partial update of a [`User`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserPatch {
    /// New contact address
    pub email: Option<String>,
    /// New display name
    pub name: Option<String>,
}

fn valid_email(email: &str) -> Result<String> {
    let email = email.trim();
    if email.len() < 3 || !email.contains('@') {
        return Err(TrackerError::Validation(format!("invalid email: {email}")));
    }
    Ok(email.to_lowercase())
}

/// Application service of the user context.
pub struct UserService {
    users: Mutex<HashMap<UserId, User>>,
    emitter: Emitter,
}

impl UserService {
    /// Create an empty user context.
    #[must_use]
    pub fn new(emitter: Emitter) -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            emitter,
        }
    }

    /// Register a user and publish `UserCreated`.
    ///
    /// # Errors
    ///
    /// [`TrackerError::Validation`] for a malformed or already registered
    /// email, or a blank name.
    pub async fn create_user(
        &self,
        email: &str,
        name: &str,
        ctx: &CorrelationContext,
    ) -> Result<User> {
        let email = valid_email(email)?;
        let name = non_empty("name", name)?;

        let user = {
            let mut users = self.users.lock().await;
            if users.values().any(|u| u.email == email) {
                return Err(TrackerError::Validation(format!(
                    "email already registered: {email}"
                )));
            }
            let user = User {
                id: UserId::from_uuid(self.emitter.next_id()),
                email,
                name,
            };
            users.insert(user.id, user.clone());
            user
        };

        info!(user_id = %user.id, correlation_id = %ctx.correlation_id(), "User created");
        self.emitter
            .emit(
                TrackerEvent::UserCreated {
                    user_id: user.id,
                    email: user.email.clone(),
                },
                ctx,
            )
            .await;
        Ok(user)
    }

    /// Apply `patch` and publish `UserPatched`.
    ///
    /// # Errors
    ///
    /// [`TrackerError::NotFound`] for an unknown user,
    /// [`TrackerError::Validation`] for invalid values.
    pub async fn patch_user(
        &self,
        id: UserId,
        patch: UserPatch,
        ctx: &CorrelationContext,
    ) -> Result<User> {
        let email = patch.email.as_deref().map(valid_email).transpose()?;
        let name = patch.name.as_deref().map(|n| non_empty("name", n)).transpose()?;

        let user = {
            let mut users = self.users.lock().await;
            if let Some(email) = &email {
                if users.values().any(|u| u.id != id && &u.email == email) {
                    return Err(TrackerError::Validation(format!(
                        "email already registered: {email}"
                    )));
                }
            }
            let user = users
                .get_mut(&id)
                .ok_or_else(|| TrackerError::not_found("User", id))?;
            if let Some(email) = email {
                user.email = email;
            }
            if let Some(name) = name {
                user.name = name;
            }
            user.clone()
        };

        info!(user_id = %id, correlation_id = %ctx.correlation_id(), "User patched");
        self.emitter
            .emit(
                TrackerEvent::UserPatched {
                    user_id: id,
                    email: user.email.clone(),
                },
                ctx,
            )
            .await;
        Ok(user)
    }

    /// Remove a user and publish `UserDeleted`.
    ///
    /// # Errors
    ///
    /// [`TrackerError::NotFound`] for an unknown user.
    pub async fn delete_user(&self, id: UserId, ctx: &CorrelationContext) -> Result<()> {
        self.users
            .lock()
            .await
            .remove(&id)
            .ok_or_else(|| TrackerError::not_found("User", id))?;

        info!(user_id = %id, correlation_id = %ctx.correlation_id(), "User deleted");
        self.emitter
            .emit(TrackerEvent::UserDeleted { user_id: id }, ctx)
            .await;
        Ok(())
    }

    /// Look a user up.
    pub async fn user(&self, id: UserId) -> Option<User> {
        self.users.lock().await.get(&id).cloned()
    }
}
