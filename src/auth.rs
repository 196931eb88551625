use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{DashboardError, Result};
use crate::models::{Permissions, Role, User};
use crate::schema::{RowKey, Table};
use crate::store::RecordStore;

/// Hash a password with SHA-256
///
/// # Returns
/// * `String` - 64 lowercase hex characters
pub fn hash_password(password: &str) -> String {
    Sha256::digest(password.as_bytes())
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

/// Check a password against a stored hash (plain string equality)
pub fn verify_password(password: &str, hash: &str) -> bool {
    hash_password(password) == hash
}

/// Who is calling, passed explicitly into every service operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub username: String,
    pub name: String,
    pub role: Role,
    pub telecaller_name: Option<String>,
    pub permissions: Permissions,
}

impl Actor {
    pub fn from_user(user: &User) -> Self {
        Actor {
            username: user.username.clone(),
            name: user.name.clone(),
            role: user.role,
            telecaller_name: user.telecaller_name.clone(),
            permissions: user.permissions,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether `telecaller` is the name this actor files reports under
    pub fn is_telecaller(&self, telecaller: &str) -> bool {
        self.telecaller_name.as_deref() == Some(telecaller)
    }

    pub fn can_view_all(&self) -> bool {
        self.is_admin() || self.permissions.can_view_all
    }

    pub fn can_manage_users(&self) -> bool {
        self.is_admin() || self.permissions.can_manage_users
    }

    pub fn can_export_data(&self) -> bool {
        self.is_admin() || self.permissions.can_export_data
    }

    pub fn can_view_analytics(&self) -> bool {
        self.is_admin() || self.permissions.can_view_analytics
    }

    /// May file a new report under `telecaller`
    pub fn can_add_report(&self, telecaller: &str) -> bool {
        self.is_admin()
            || self.permissions.can_edit_all
            || (self.permissions.can_add_reports && self.is_telecaller(telecaller))
    }

    /// May overwrite an existing report of `telecaller`
    pub fn can_edit_report(&self, telecaller: &str) -> bool {
        self.is_admin()
            || self.permissions.can_edit_all
            || (self.permissions.can_edit_own && self.is_telecaller(telecaller))
    }

    pub(crate) fn require(&self, allowed: bool, what: &str) -> Result<()> {
        if allowed {
            Ok(())
        } else {
            Err(DashboardError::PermissionDenied(format!(
                "{} may not {}",
                self.username, what
            )))
        }
    }
}

/// Result of a login attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Granted(Actor),
    Denied,
}

impl AuthOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, AuthOutcome::Granted(_))
    }

    /// Role of the authenticated account; `None` on failure
    pub fn role(&self) -> Option<Role> {
        match self {
            AuthOutcome::Granted(actor) => Some(actor.role),
            AuthOutcome::Denied => None,
        }
    }

    pub fn into_actor(self) -> Result<Actor> {
        match self {
            AuthOutcome::Granted(actor) => Ok(actor),
            AuthOutcome::Denied => Err(DashboardError::Auth),
        }
    }
}

/// Checks credentials against the Users table
pub struct Authenticator<'a> {
    store: &'a dyn RecordStore,
}

impl<'a> Authenticator<'a> {
    pub fn new(store: &'a dyn RecordStore) -> Self {
        Authenticator { store }
    }

    /// Verify a username/password pair
    ///
    /// Unknown, inactive, and wrong-password logins all produce the same
    /// `Denied` outcome. There is no lockout or rate limit.
    ///
    /// # Errors
    /// * Storage errors from reading the Users table
    pub fn authenticate(&self, username: &str, password: &str) -> Result<AuthOutcome> {
        let row = self.store.find_row(Table::Users, &RowKey::new(username.trim()))?;
        let Some(user) = row.as_ref().and_then(User::from_row) else {
            debug!("Login for unknown user {}", username);
            return Ok(AuthOutcome::Denied);
        };

        if !user.is_active || !verify_password(password, &user.password_hash) {
            debug!("Login rejected for {}", user.username);
            return Ok(AuthOutcome::Denied);
        }

        info!("{} logged in as {}", user.username, user.role);
        Ok(AuthOutcome::Granted(Actor::from_user(&user)))
    }
}
