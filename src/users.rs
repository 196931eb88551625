use lazy_static::lazy_static;
use log::info;
use regex::Regex;
use serde::Deserialize;

use crate::auth::{Actor, hash_password};
use crate::clock::{Clock, format_timestamp};
use crate::error::{DashboardError, Result};
use crate::models::{Permissions, Role, User};
use crate::schema::{RowKey, Table};
use crate::store::RecordStore;

/// Username of the built-in administrator account
pub const DEFAULT_ADMIN: &str = "admin";

lazy_static! {
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[a-z0-9_.-]{3,32}$").unwrap();
}

/// Input for [`UserService::create_user`]
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub role: Role,

    #[serde(default)]
    pub name: String,

    /// Defaults to the display name for telecaller accounts
    #[serde(default)]
    pub telecaller_name: Option<String>,
}

/// Account administration
///
/// Every operation requires the caller to hold `can_manage_users`.
pub struct UserService<'a> {
    store: &'a dyn RecordStore,
    clock: &'a dyn Clock,
}

impl<'a> UserService<'a> {
    pub fn new(store: &'a dyn RecordStore, clock: &'a dyn Clock) -> Self {
        UserService { store, clock }
    }

    /// Create an account
    ///
    /// # Arguments
    /// * `actor` - The caller
    /// * `new_user` - Account details; the password is hashed before storage
    ///
    /// # Errors
    /// * `PermissionDenied` if the caller cannot manage users
    /// * `Validation` for a malformed username or an empty password
    /// * `AlreadyExists` if the username is taken
    pub fn create_user(&self, actor: &Actor, new_user: NewUser) -> Result<User> {
        actor.require(actor.can_manage_users(), "manage users")?;

        let username = new_user.username.trim().to_string();
        if !USERNAME_REGEX.is_match(&username) {
            return Err(DashboardError::Validation(format!(
                "Username '{}' must be 3-32 characters of a-z, 0-9, '_', '.', '-'",
                username
            )));
        }
        if new_user.password.is_empty() {
            return Err(DashboardError::Validation("Password cannot be empty".to_string()));
        }
        if self.store.find_row(Table::Users, &RowKey::new(username.as_str()))?.is_some() {
            return Err(DashboardError::AlreadyExists(format!("User {}", username)));
        }

        let name = match new_user.name.trim() {
            "" => username.clone(),
            name => name.to_string(),
        };
        let telecaller_name = match new_user.role {
            Role::Telecaller => Some(
                new_user
                    .telecaller_name
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| name.clone()),
            ),
            Role::Admin => new_user.telecaller_name.filter(|t| !t.trim().is_empty()),
        };

        let now = format_timestamp(self.clock.now());
        let user = User {
            username,
            password_hash: hash_password(&new_user.password),
            role: new_user.role,
            name,
            telecaller_name,
            permissions: Permissions::for_role(new_user.role),
            created_at: now.clone(),
            updated_at: now,
            is_active: true,
        };
        self.store.append_row(Table::Users, &user.to_row())?;
        info!("{} created {} account {}", actor.username, user.role, user.username);
        Ok(user)
    }

    /// Mark an account inactive; its reports stay as they are
    ///
    /// # Errors
    /// * `PermissionDenied` if the caller cannot manage users
    /// * `Validation` when targeting the built-in admin account
    /// * `NotFound` if the user does not exist
    pub fn deactivate_user(&self, actor: &Actor, username: &str) -> Result<()> {
        actor.require(actor.can_manage_users(), "manage users")?;
        if username == DEFAULT_ADMIN {
            return Err(DashboardError::Validation(
                "The admin account cannot be deactivated".to_string(),
            ));
        }
        self.modify(username, |user| user.is_active = false)?;
        info!("{} deactivated {}", actor.username, username);
        Ok(())
    }

    /// Replace an account's password
    ///
    /// # Errors
    /// * `PermissionDenied`, `NotFound`, or `Validation` for an empty password
    pub fn change_password(&self, actor: &Actor, username: &str, new_password: &str) -> Result<()> {
        actor.require(actor.can_manage_users(), "manage users")?;
        if new_password.is_empty() {
            return Err(DashboardError::Validation("Password cannot be empty".to_string()));
        }
        let hash = hash_password(new_password);
        self.modify(username, |user| user.password_hash = hash)?;
        info!("{} changed the password of {}", actor.username, username);
        Ok(())
    }

    /// Replace an account's permission set
    pub fn update_permissions(
        &self,
        actor: &Actor,
        username: &str,
        permissions: Permissions,
    ) -> Result<User> {
        actor.require(actor.can_manage_users(), "manage users")?;
        let user = self.modify(username, |user| user.permissions = permissions)?;
        info!("{} updated permissions of {}", actor.username, username);
        Ok(user)
    }

    /// All accounts in storage order, inactive ones included
    pub fn list_users(&self, actor: &Actor) -> Result<Vec<User>> {
        actor.require(actor.can_manage_users(), "manage users")?;
        Ok(self
            .store
            .get_rows(Table::Users)?
            .iter()
            .filter_map(User::from_row)
            .collect())
    }

    fn modify(&self, username: &str, change: impl FnOnce(&mut User)) -> Result<User> {
        let key = RowKey::new(username);
        let mut user = self
            .store
            .find_row(Table::Users, &key)?
            .as_ref()
            .and_then(User::from_row)
            .ok_or_else(|| DashboardError::NotFound(format!("User {}", username)))?;

        change(&mut user);
        user.updated_at = format_timestamp(self.clock.now());
        self.store.update_row(Table::Users, &key, &user.to_row())?;
        Ok(user)
    }
}

/// Seed the built-in admin account when the Users table is empty
///
/// # Returns
/// * `Result<bool>` - Whether an account was created
pub fn ensure_default_admin(store: &dyn RecordStore, clock: &dyn Clock, password: &str) -> Result<bool> {
    if !store.get_rows(Table::Users)?.is_empty() {
        return Ok(false);
    }

    let now = format_timestamp(clock.now());
    let admin = User {
        username: DEFAULT_ADMIN.to_string(),
        password_hash: hash_password(password),
        role: Role::Admin,
        name: "Administrator".to_string(),
        telecaller_name: None,
        permissions: Permissions::for_role(Role::Admin),
        created_at: now.clone(),
        updated_at: now,
        is_active: true,
    };
    store.append_row(Table::Users, &admin.to_row())?;
    info!("Created default {} account", DEFAULT_ADMIN);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthOutcome, Authenticator};
    use crate::clock::{FixedClock, parse_timestamp};
    use crate::store::LocalFileStore;

    fn setup() -> (tempfile::TempDir, LocalFileStore, FixedClock) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::open(dir.path()).unwrap();
        let clock = FixedClock(parse_timestamp("2024-01-05 09:00:00").unwrap());
        (dir, store, clock)
    }

    fn admin(store: &LocalFileStore) -> Actor {
        Authenticator::new(store)
            .authenticate(DEFAULT_ADMIN, "secret")
            .unwrap()
            .into_actor()
            .unwrap()
    }

    fn telecaller(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            password: "pw".to_string(),
            role: Role::Telecaller,
            name: "Shiru".to_string(),
            telecaller_name: None,
        }
    }

    #[test]
    fn default_admin_is_seeded_once() {
        let (_dir, store, clock) = setup();
        assert!(ensure_default_admin(&store, &clock, "secret").unwrap());
        assert!(!ensure_default_admin(&store, &clock, "other").unwrap());
        assert_eq!(admin(&store).role, Role::Admin);
    }

    #[test]
    fn create_user_then_login() {
        let (_dir, store, clock) = setup();
        ensure_default_admin(&store, &clock, "secret").unwrap();
        let service = UserService::new(&store, &clock);

        let user = service.create_user(&admin(&store), telecaller("shiru")).unwrap();
        assert_eq!(user.telecaller_name.as_deref(), Some("Shiru"));
        assert_eq!(user.created_at, "2024-01-05 09:00:00");

        let outcome = Authenticator::new(&store).authenticate("shiru", "pw").unwrap();
        assert_eq!(outcome.role(), Some(Role::Telecaller));
        let wrong = Authenticator::new(&store).authenticate("shiru", "nope").unwrap();
        assert_eq!(wrong, AuthOutcome::Denied);
    }

    #[test]
    fn duplicate_and_malformed_usernames_are_rejected() {
        let (_dir, store, clock) = setup();
        ensure_default_admin(&store, &clock, "secret").unwrap();
        let service = UserService::new(&store, &clock);
        let actor = admin(&store);

        service.create_user(&actor, telecaller("shiru")).unwrap();
        assert!(matches!(
            service.create_user(&actor, telecaller("shiru")),
            Err(DashboardError::AlreadyExists(_))
        ));
        assert!(matches!(
            service.create_user(&actor, telecaller("Bad Name")),
            Err(DashboardError::Validation(_))
        ));
        let mut empty = telecaller("raphiya");
        empty.password.clear();
        assert!(matches!(service.create_user(&actor, empty), Err(DashboardError::Validation(_))));
    }

    #[test]
    fn deactivated_user_cannot_log_in() {
        let (_dir, store, clock) = setup();
        ensure_default_admin(&store, &clock, "secret").unwrap();
        let service = UserService::new(&store, &clock);
        let actor = admin(&store);

        service.create_user(&actor, telecaller("shiru")).unwrap();
        service.deactivate_user(&actor, "shiru").unwrap();
        let outcome = Authenticator::new(&store).authenticate("shiru", "pw").unwrap();
        assert_eq!(outcome, AuthOutcome::Denied);

        assert!(matches!(
            service.deactivate_user(&actor, DEFAULT_ADMIN),
            Err(DashboardError::Validation(_))
        ));
        assert!(matches!(
            service.deactivate_user(&actor, "ghost"),
            Err(DashboardError::NotFound(_))
        ));
    }

    #[test]
    fn password_change_and_permission_update() {
        let (_dir, store, clock) = setup();
        ensure_default_admin(&store, &clock, "secret").unwrap();
        let service = UserService::new(&store, &clock);
        let actor = admin(&store);
        service.create_user(&actor, telecaller("shiru")).unwrap();

        service.change_password(&actor, "shiru", "fresh").unwrap();
        let auth = Authenticator::new(&store);
        assert!(!auth.authenticate("shiru", "pw").unwrap().is_granted());
        let shiru = auth.authenticate("shiru", "fresh").unwrap().into_actor().unwrap();
        assert!(!shiru.can_export_data());

        let permissions = Permissions {
            can_export_data: true,
            ..Permissions::for_role(Role::Telecaller)
        };
        service.update_permissions(&actor, "shiru", permissions).unwrap();
        let shiru = auth.authenticate("shiru", "fresh").unwrap().into_actor().unwrap();
        assert!(shiru.can_export_data());

        // A telecaller cannot manage accounts
        assert!(matches!(
            service.list_users(&shiru),
            Err(DashboardError::PermissionDenied(_))
        ));
        assert_eq!(service.list_users(&actor).unwrap().len(), 2);
    }
}
