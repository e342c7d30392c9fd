//! Startup role and admin-account provisioning.
//!
//! # Responsibility
//! - Bring the schema up to date, then seed configured roles and the
//!   bootstrap admin account before any request is served.
//!
//! # Invariants
//! - Seeding is idempotent: a rerun performs existence checks only.
//! - Any creation or assignment failure aborts startup with a `SeedError`
//!   that has already been logged.
//! - Blank or missing admin credentials skip admin provisioning without
//!   failing.

use crate::config::{AppConfig, ConfigError, RoleConfig, RoleConfigMap, ADMIN_ROLE};
use crate::db::migrations::apply_migrations;
use crate::db::DbError;
use crate::identity::store::{IdentityError, IdentityStore, SqliteIdentityStore};
use crate::model::todo::PrincipalId;
use log::{debug, error, info};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// What one bootstrap run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Schema migrations applied by this run.
    pub migrations_applied: usize,
    /// Role names created by this run, in configuration order.
    pub roles_created: Vec<String>,
    /// Whether this run created the admin account.
    pub admin_created: bool,
    /// Whether admin provisioning was skipped for lack of credentials.
    pub admin_skipped: bool,
    /// Principal id of the admin account, when provisioned.
    pub admin_id: Option<PrincipalId>,
}

/// Fatal bootstrap failures.
#[derive(Debug)]
pub enum SeedError {
    /// No usable role section in the configuration.
    ConfigurationMissing(ConfigError),
    /// Schema migration failed.
    Migration(DbError),
    /// A configured role could not be created.
    RoleCreation { role: String, source: IdentityError },
    /// The admin account could not be created.
    AccountCreation { email: String, source: IdentityError },
    /// The admin account could not be added to its role.
    RoleAssignment {
        email: String,
        role: String,
        source: IdentityError,
    },
    /// Identity store lookup or setup failed.
    Identity(IdentityError),
}

impl Display for SeedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConfigurationMissing(err) => write!(f, "bootstrap configuration missing: {err}"),
            Self::Migration(err) => write!(f, "schema migration failed: {err}"),
            Self::RoleCreation { role, source } => {
                write!(f, "failed to create role `{role}`: {source}")
            }
            Self::AccountCreation { email, source } => {
                write!(f, "failed to create admin user `{email}`: {source}")
            }
            Self::RoleAssignment {
                email,
                role,
                source,
            } => write!(f, "failed to assign role `{role}` to `{email}`: {source}"),
            Self::Identity(err) => write!(f, "identity store failure: {err}"),
        }
    }
}

impl Error for SeedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ConfigurationMissing(err) => Some(err),
            Self::Migration(err) => Some(err),
            Self::RoleCreation { source, .. }
            | Self::AccountCreation { source, .. }
            | Self::RoleAssignment { source, .. } => Some(source),
            Self::Identity(err) => Some(err),
        }
    }
}

impl From<IdentityError> for SeedError {
    fn from(value: IdentityError) -> Self {
        Self::Identity(value)
    }
}

/// Runs the whole startup sequence against `conn`.
///
/// Order: migrations, role section check, phase one (roles and admin),
/// phase two (admin membership).
pub fn run_bootstrap(conn: &mut Connection, config: &AppConfig) -> Result<BootstrapReport, SeedError> {
    info!("event=bootstrap module=bootstrap status=start");

    let migrations_applied = apply_migrations(conn).map_err(|err| fail(SeedError::Migration(err)))?;
    let roles = config
        .require_roles()
        .map_err(|err| fail(SeedError::ConfigurationMissing(err)))?;

    let store = SqliteIdentityStore::try_new(conn).map_err(|err| fail(SeedError::from(err)))?;
    let mut report = seed_roles_and_admin(&store, roles)?;
    report.migrations_applied = migrations_applied;

    let admin_id = ensure_admin_membership(&store, roles)?;
    if report.admin_id.is_none() {
        report.admin_id = admin_id;
    }

    info!(
        "event=bootstrap module=bootstrap status=ok migrations_applied={} roles_created={} admin_created={} admin_skipped={}",
        report.migrations_applied,
        report.roles_created.len(),
        report.admin_created,
        report.admin_skipped
    );
    Ok(report)
}

/// Phase one: creates missing roles, then the admin account and membership.
pub fn seed_roles_and_admin(
    store: &impl IdentityStore,
    roles: &RoleConfigMap,
) -> Result<BootstrapReport, SeedError> {
    let mut report = BootstrapReport::default();

    for role in roles.keys() {
        if store.role_exists(role).map_err(|err| fail(err.into()))? {
            debug!("event=role_seed module=bootstrap status=skip role={role} reason=exists");
            continue;
        }
        store.create_role(role).map_err(|source| {
            fail(SeedError::RoleCreation {
                role: role.clone(),
                source,
            })
        })?;
        info!("event=role_seed module=bootstrap status=ok role={role}");
        report.roles_created.push(role.clone());
    }

    let Some(admin) = admin_credentials(roles) else {
        report.admin_skipped = true;
        return Ok(report);
    };

    let (principal_id, created) = find_or_create_admin(store, admin)?;
    report.admin_created = created;

    if !store
        .is_in_role(&principal_id, ADMIN_ROLE)
        .map_err(|err| fail(err.into()))?
    {
        assign_admin_role(store, admin, &principal_id)?;
    }

    report.admin_id = Some(principal_id);
    Ok(report)
}

/// Phase two: re-resolves the admin account and (re-)adds it to `Admin`.
///
/// Returns the admin principal id, or `None` when provisioning is skipped.
pub fn ensure_admin_membership(
    store: &impl IdentityStore,
    roles: &RoleConfigMap,
) -> Result<Option<PrincipalId>, SeedError> {
    let Some(admin) = admin_credentials(roles) else {
        return Ok(None);
    };

    let (principal_id, _) = find_or_create_admin(store, admin)?;
    assign_admin_role(store, admin, &principal_id)?;
    debug!("event=admin_membership module=bootstrap status=ok");
    Ok(Some(principal_id))
}

/// Returns the admin role entry when it carries both credentials.
///
/// The entry key matches `Admin` case-insensitively, like stored role names;
/// an exact `Admin` key wins over other spellings.
fn admin_credentials(roles: &RoleConfigMap) -> Option<&RoleConfig> {
    let entry = roles.get(ADMIN_ROLE).or_else(|| {
        roles
            .iter()
            .find(|(name, _)| name.trim().eq_ignore_ascii_case(ADMIN_ROLE))
            .map(|(_, admin)| admin)
    });
    match entry {
        Some(admin) if admin.has_credentials() => Some(admin),
        Some(_) => {
            info!("event=admin_seed module=bootstrap status=skip reason=blank_credentials");
            None
        }
        None => {
            info!("event=admin_seed module=bootstrap status=skip reason=no_admin_role");
            None
        }
    }
}

fn find_or_create_admin(
    store: &impl IdentityStore,
    admin: &RoleConfig,
) -> Result<(PrincipalId, bool), SeedError> {
    if let Some(existing) = store
        .find_by_email(&admin.email)
        .map_err(|err| fail(err.into()))?
    {
        debug!("event=admin_seed module=bootstrap status=skip reason=exists");
        return Ok((existing.id, false));
    }

    let created = store
        .create_account(&admin.email, &admin.password, true)
        .map_err(|source| {
            fail(SeedError::AccountCreation {
                email: admin.email.trim().to_string(),
                source,
            })
        })?;
    info!("event=admin_seed module=bootstrap status=ok principal_id={}", created.id);
    Ok((created.id, true))
}

fn assign_admin_role(
    store: &impl IdentityStore,
    admin: &RoleConfig,
    principal_id: &str,
) -> Result<(), SeedError> {
    store.add_to_role(principal_id, ADMIN_ROLE).map_err(|source| {
        fail(SeedError::RoleAssignment {
            email: admin.email.trim().to_string(),
            role: ADMIN_ROLE.to_string(),
            source,
        })
    })?;
    info!("event=role_assign module=bootstrap status=ok role={ADMIN_ROLE} principal_id={principal_id}");
    Ok(())
}

/// Logs a seed failure in full before it is returned.
fn fail(err: SeedError) -> SeedError {
    error!("event=bootstrap module=bootstrap status=error error=\"{err}\"");
    err
}

#[cfg(test)]
mod tests {
    use super::{admin_credentials, SeedError};
    use crate::config::{RoleConfig, RoleConfigMap, ADMIN_ROLE};
    use crate::identity::store::IdentityError;
    use std::error::Error;

    fn roles_with_admin(email: &str, password: &str) -> RoleConfigMap {
        RoleConfigMap::from([(
            ADMIN_ROLE.to_string(),
            RoleConfig {
                role: ADMIN_ROLE.to_string(),
                email: email.to_string(),
                password: password.to_string(),
            },
        )])
    }

    #[test]
    fn admin_credentials_require_both_values() {
        assert!(admin_credentials(&roles_with_admin("a@b.c", "Adm1n!pass")).is_some());
        assert!(admin_credentials(&roles_with_admin("  ", "Adm1n!pass")).is_none());
        assert!(admin_credentials(&roles_with_admin("a@b.c", "")).is_none());
        assert!(admin_credentials(&RoleConfigMap::new()).is_none());
    }

    #[test]
    fn admin_entry_key_matches_case_insensitively() {
        let mut roles = roles_with_admin("a@b.c", "Adm1n!pass");
        let admin = roles.remove(ADMIN_ROLE).expect("admin entry");
        roles.insert("admin".to_string(), admin);

        let found = admin_credentials(&roles).expect("lowercase key should match");
        assert_eq!(found.email, "a@b.c");
    }

    #[test]
    fn seed_error_exposes_identity_source() {
        let err = SeedError::RoleCreation {
            role: "User".to_string(),
            source: IdentityError::InvalidRoleName,
        };
        assert!(err.to_string().contains("`User`"));
        assert!(err.source().is_some());
    }
}
