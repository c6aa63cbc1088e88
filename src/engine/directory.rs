use tracing::info;
use ulid::Ulid;

use crate::limits::MAX_USERS;
use crate::model::*;
use crate::notify::Notice;

use super::{clear_user_refs, validate, Engine, EngineError};

/// Editable profile fields. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
}

impl Engine {
    pub async fn register_user(
        &self,
        id: Ulid,
        name: &str,
        email: &str,
        phone: &str,
        status: UserStatus,
        password: &str,
    ) -> Result<User, EngineError> {
        let _gate = self.gate.read().await;
        let _dir = self.directory_lock.lock().await;
        self.register_locked(id, name, email, phone, status, password)
            .await
    }

    /// Caller holds the gate and the directory lock.
    async fn register_locked(
        &self,
        id: Ulid,
        name: &str,
        email: &str,
        phone: &str,
        status: UserStatus,
        password: &str,
    ) -> Result<User, EngineError> {
        validate::name("name", name)?;
        validate::text(Some(phone))?;
        validate::password(password)?;
        let email = validate::email(email)?;
        if self.users.len() >= MAX_USERS {
            return Err(EngineError::LimitExceeded("too many users"));
        }
        if self.users.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id.to_string()));
        }
        if self.emails.contains_key(&email) {
            return Err(EngineError::AlreadyExists(email));
        }

        let role = if self.is_admin_email(&email) {
            Role::Admin
        } else {
            Role::Member
        };
        let user = User {
            id,
            name: name.to_string(),
            email,
            phone: phone.to_string(),
            status,
            role,
            suspended: false,
            suspension_reason: String::new(),
            password: password.to_string(),
        };
        let event = Event::UserRegistered { user: user.clone() };
        self.wal_append(&event).await?;
        self.apply_directory(&event);
        Ok(user)
    }

    fn is_admin_email(&self, email: &str) -> bool {
        self.settings
            .admin_email
            .as_deref()
            .is_some_and(|admin| admin.eq_ignore_ascii_case(email))
    }

    /// Make sure the configured admin account exists and holds the admin role.
    pub async fn ensure_admin(&self) -> Result<Option<User>, EngineError> {
        let Some(admin_email) = self.settings.admin_email.clone() else {
            return Ok(None);
        };
        let _gate = self.gate.read().await;
        let _dir = self.directory_lock.lock().await;

        if let Some(id) = self.user_id_by_email(&admin_email) {
            let user = self.require_user(id)?;
            if user.is_admin() {
                return Ok(Some(user));
            }
            let event = Event::UserRoleChanged { id, role: Role::Admin };
            self.wal_append(&event).await?;
            self.apply_directory(&event);
            info!("granted admin role to {}", user.email);
            return self.require_user(id).map(Some);
        }

        let Some(password) = self.settings.admin_password.as_deref() else {
            return Err(EngineError::Invalid(format!(
                "no initial password configured for admin account {admin_email}"
            )));
        };
        let user = self
            .register_locked(
                Ulid::new(),
                "Administrator",
                &admin_email,
                "",
                UserStatus::Staff,
                password,
            )
            .await?;
        info!("registered admin account {}", user.email);
        Ok(Some(user))
    }

    pub async fn update_user(&self, id: Ulid, patch: UserPatch) -> Result<User, EngineError> {
        if let Some(name) = &patch.name {
            validate::name("name", name)?;
        }
        validate::text(patch.phone.as_deref())?;
        if let Some(password) = &patch.password {
            validate::password(password)?;
        }
        let _gate = self.gate.read().await;
        let _dir = self.directory_lock.lock().await;

        let current = self.require_user(id)?;
        let event = Event::UserUpdated {
            id,
            name: patch.name.unwrap_or(current.name),
            phone: patch.phone.unwrap_or(current.phone),
            password: patch.password.unwrap_or(current.password),
        };
        self.wal_append(&event).await?;
        self.apply_directory(&event);
        self.require_user(id)
    }

    /// Suspend or reinstate an account. Suspending always notifies the user.
    pub async fn set_suspended(
        &self,
        id: Ulid,
        suspended: bool,
        reason: &str,
    ) -> Result<User, EngineError> {
        validate::reason(reason)?;
        let _gate = self.gate.read().await;
        let _dir = self.directory_lock.lock().await;

        self.require_user(id)?;
        let event = Event::UserSuspended {
            id,
            suspended,
            reason: reason.to_string(),
        };
        self.wal_append(&event).await?;
        self.apply_directory(&event);
        let user = self.require_user(id)?;

        if suspended {
            self.dispatch(Notice::AccountSuspended {
                email: user.email.clone(),
                name: user.name.clone(),
                reason: reason.to_string(),
            });
        }
        Ok(user)
    }

    pub async fn set_role(&self, id: Ulid, role: Role) -> Result<User, EngineError> {
        let _gate = self.gate.read().await;
        let _dir = self.directory_lock.lock().await;

        self.require_user(id)?;
        let event = Event::UserRoleChanged { id, role };
        self.wal_append(&event).await?;
        self.apply_directory(&event);
        self.require_user(id)
    }

    /// Remove an account. Its bookings stay, with the user reference cleared.
    pub async fn delete_user(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.gate.read().await;
        let _dir = self.directory_lock.lock().await;

        self.require_user(id)?;
        let event = Event::UserDeleted { id };
        self.wal_append(&event).await?;
        self.apply_directory(&event);

        // room locks only, one at a time: never waits on a building lock
        for rs in self.room_arcs() {
            let mut guard = rs.write().await;
            clear_user_refs(&mut guard, id);
        }
        Ok(())
    }

    pub fn get_user(&self, id: Ulid) -> Option<User> {
        self.users.get(&id).map(|u| u.value().clone())
    }

    pub fn user_by_email(&self, email: &str) -> Option<User> {
        self.user_id_by_email(email).and_then(|id| self.get_user(id))
    }

    /// All users ordered by email.
    pub fn list_users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.iter().map(|e| e.value().clone()).collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        users
    }

    fn require_user(&self, id: Ulid) -> Result<User, EngineError> {
        self.get_user(id).ok_or(EngineError::NotFound(id))
    }
}
