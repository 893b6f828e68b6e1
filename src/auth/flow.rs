//! Register, login, refresh, and the password lifecycle.
//!
//! `AuthFlow` is the only place plaintext passwords are seen. Every path that
//! accepts a new password hashes it here before the store is touched.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{AuthError, AuthResult};
use super::password;
use super::store::{CredentialStore, UserChanges};
use super::tokens::{TokenKind, TokenService};
use crate::api::metrics;
use crate::db::{
    EmergencyContact, NewUser, Role, UpdateProfileRequest, User, UserFilter, UserStatus,
};
use crate::notifications::{self, Notification, Notifier};

/// A freshly authenticated user with an access/refresh pair
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Clone)]
pub struct AuthFlow {
    store: Arc<dyn CredentialStore>,
    tokens: Arc<TokenService>,
    notifier: Arc<dyn Notifier>,
    reset_url_base: String,
}

impl AuthFlow {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        tokens: Arc<TokenService>,
        notifier: Arc<dyn Notifier>,
        reset_url_base: impl Into<String>,
    ) -> Self {
        Self {
            store,
            tokens,
            notifier,
            reset_url_base: reset_url_base.into(),
        }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    fn open_session(&self, user: User) -> AuthResult<Session> {
        let access_token = self.tokens.issue_access_token(&user)?;
        let refresh_token = self.tokens.issue_refresh_token(&user)?;
        Ok(Session {
            user,
            access_token,
            refresh_token,
        })
    }

    fn notify(&self, to: &str, notification: Notification) {
        notifications::dispatch(&self.notifier, to, notification);
    }

    /// Create an account and sign it in.
    ///
    /// The record is committed before the welcome email is queued, so a mail
    /// outage cannot undo a registration.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: Option<Role>,
    ) -> AuthResult<Session> {
        let role = role.unwrap_or_default();
        if !role.is_self_assignable() {
            return Err(AuthError::validation(format!(
                "Role '{}' cannot be chosen at registration",
                role
            )));
        }

        let email = normalize_email(email);
        if self.store.find_by_email(&email).await?.is_some() {
            return Err(AuthError::Conflict);
        }

        let password_hash = password::hash_password_async(password).await?;
        let user = self
            .store
            .create(NewUser {
                name: name.trim().to_string(),
                email,
                password_hash,
                role,
            })
            .await?;

        info!(user_id = %user.id, email = %user.email, role = %user.role, "New user registered");
        metrics::record_registration();

        self.notify(&user.email, Notification::Welcome { name: user.name.clone() });
        self.open_session(user)
    }

    /// Unknown email and wrong password fail identically, in both message and
    /// cost.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<Session> {
        let email = normalize_email(email);

        let user = match self.store.find_by_email(&email).await? {
            Some(user) => user,
            None => {
                password::verify_dummy(password).await;
                metrics::record_login("invalid_credentials");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !password::verify_password_async(password, &user.password_hash).await? {
            metrics::record_login("invalid_credentials");
            return Err(AuthError::InvalidCredentials);
        }

        if !user.status.is_active() {
            warn!(user_id = %user.id, status = %user.status, "Login refused for inactive account");
            metrics::record_login("disabled");
            return Err(AuthError::AccountDisabled);
        }

        let now = Utc::now();
        self.store.record_login(&user.id, now).await?;
        let user = User {
            last_login: Some(crate::db::timestamp(now)),
            ..user
        };

        info!(user_id = %user.id, "User logged in");
        metrics::record_login("success");
        self.open_session(user)
    }

    /// Tokens are stateless, so there is nothing to revoke server-side
    pub fn logout(&self, user: &User, all_devices: bool) {
        info!(user_id = %user.id, all_devices, "User logged out");
    }

    /// Mint a new access token. The refresh token is not rotated.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<String> {
        let claims = self.tokens.verify(refresh_token, TokenKind::Refresh)?;
        let user = self
            .store
            .find_by_id(&claims.sub)
            .await?
            .ok_or(AuthError::NotFound)?;
        self.tokens.issue_access_token(&user)
    }

    /// Issue a reset token, mirror it on the record, and mail the link.
    ///
    /// Returns the token; the HTTP layer never echoes it back.
    pub async fn forgot_password(&self, email: &str) -> AuthResult<String> {
        let email = normalize_email(email);
        let user = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::NotFound)?;

        let (token, expires_at) = self.tokens.issue_reset_token(&user)?;
        self.store.set_reset_token(&user.id, &token, expires_at).await?;

        info!(user_id = %user.id, "Password reset requested");

        let reset_url = format!(
            "{}/reset-password?token={}",
            self.reset_url_base.trim_end_matches('/'),
            token
        );
        self.notify(&user.email, Notification::PasswordReset { reset_url });

        Ok(token)
    }

    /// Consume a reset token. Signature, the persisted copy and its expiry must
    /// all agree; any mismatch is `TokenInvalid`.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> AuthResult<()> {
        let result = self.try_reset_password(token, new_password).await;
        match &result {
            Ok(()) => metrics::record_password_reset("success"),
            Err(e) if !e.is_fault() => metrics::record_password_reset("rejected"),
            Err(_) => {}
        }
        result
    }

    async fn try_reset_password(&self, token: &str, new_password: &str) -> AuthResult<()> {
        let claims = self
            .tokens
            .verify(token, TokenKind::Reset)
            .map_err(|_| AuthError::TokenInvalid)?;

        let user = self
            .store
            .find_by_reset_token(token)
            .await?
            .filter(|user| user.id == claims.sub)
            .ok_or(AuthError::TokenInvalid)?;

        let password_hash = password::hash_password_async(new_password).await?;

        // Lost a race with another reset or a replacement token
        if !self
            .store
            .complete_password_reset(&user.id, token, &password_hash)
            .await?
        {
            return Err(AuthError::TokenInvalid);
        }

        info!(user_id = %user.id, "Password reset completed");
        self.notify(&user.email, Notification::PasswordChanged);
        Ok(())
    }

    pub async fn change_password(
        &self,
        user: &User,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        if !password::verify_password_async(current_password, &user.password_hash).await? {
            return Err(AuthError::InvalidCredentials);
        }

        let password_hash = password::hash_password_async(new_password).await?;
        self.store
            .save(
                &user.id,
                &UserChanges {
                    password_hash: Some(password_hash),
                    ..Default::default()
                },
            )
            .await?;

        info!(user_id = %user.id, "Password changed");
        self.notify(&user.email, Notification::PasswordChanged);
        Ok(())
    }

    /// Apply a self-service profile edit
    pub async fn update_profile(&self, user: &User, update: UpdateProfileRequest) -> AuthResult<User> {
        let mut changes = UserChanges {
            name: update.name.map(|n| n.trim().to_string()),
            disability_type: update.disability_type,
            ..Default::default()
        };

        if let Some(email) = update.email {
            let email = normalize_email(&email);
            if email != user.email {
                if self.store.find_by_email(&email).await?.is_some() {
                    return Err(AuthError::Conflict);
                }
                changes.email = Some(email);
            }
        }

        let password_changed = update.password.is_some();
        if let Some(password) = update.password {
            changes.password_hash = Some(password::hash_password_async(&password).await?);
        }

        if let Some(prefs) = update.accessibility_preferences {
            changes.accessibility_preferences =
                Some(serde_json::to_string(&prefs).map_err(AuthError::internal)?);
        }

        let updated = self.store.save(&user.id, &changes).await?;
        info!(user_id = %user.id, password_changed, "Profile updated");
        if password_changed {
            self.notify(&updated.email, Notification::PasswordChanged);
        }
        Ok(updated)
    }

    /// Replace the emergency contact, keeping any other contact details
    pub async fn update_emergency_contact(
        &self,
        user: &User,
        emergency_contact: EmergencyContact,
    ) -> AuthResult<User> {
        let mut contact = user.contact_info().unwrap_or_default();
        contact.emergency_contact = Some(EmergencyContact {
            name: emergency_contact.name.trim().to_string(),
            relation: emergency_contact.relation.trim().to_string(),
            phone: emergency_contact.phone.trim().to_string(),
        });

        let changes = UserChanges {
            contact: Some(serde_json::to_string(&contact).map_err(AuthError::internal)?),
            ..Default::default()
        };
        let updated = self.store.save(&user.id, &changes).await?;
        info!(user_id = %user.id, "Emergency contact updated");
        Ok(updated)
    }

    pub async fn list_users(&self, filter: UserFilter) -> AuthResult<Vec<User>> {
        self.store.list(filter).await
    }

    /// Admin action
    pub async fn set_role(&self, actor: &User, user_id: &str, role: Role) -> AuthResult<User> {
        let target = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        let updated = self
            .store
            .save(
                &target.id,
                &UserChanges {
                    role: Some(role),
                    ..Default::default()
                },
            )
            .await?;

        info!(actor = %actor.id, user_id = %updated.id, from = %target.role, to = %role, "Role changed");
        self.notify(&updated.email, Notification::RoleChanged { role });
        Ok(updated)
    }

    /// Admin action. `deleted` is terminal.
    pub async fn set_status(&self, actor: &User, user_id: &str, status: UserStatus) -> AuthResult<User> {
        let target = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        if !target.status.can_transition_to(status) {
            return Err(AuthError::validation("Deleted accounts cannot be changed"));
        }

        let updated = self
            .store
            .save(
                &target.id,
                &UserChanges {
                    status: Some(status),
                    ..Default::default()
                },
            )
            .await?;

        info!(actor = %actor.id, user_id = %updated.id, from = %target.status, to = %status, "Status changed");

        match (target.status, status) {
            (UserStatus::Active, UserStatus::Suspended) => {
                self.notify(&updated.email, Notification::AccountSuspended)
            }
            (UserStatus::Suspended, UserStatus::Active) => {
                self.notify(&updated.email, Notification::AccountReactivated)
            }
            _ => {}
        }

        Ok(updated)
    }
}
