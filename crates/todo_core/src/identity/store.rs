//! Identity store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide the credential/role operations the bootstrap seeder and the
//!   request layer rely on.
//! - Keep account and role SQL inside the identity boundary.
//!
//! # Invariants
//! - Account creation enforces email shape and password policy before any
//!   write happens.
//! - A principal id is an opaque string and never changes once issued.

use crate::db::migrations::latest_version;
use crate::db::{is_constraint_violation, now_epoch_ms, schema_version, table_exists, DbError};
use crate::identity::password::{
    check_password_policy, hash_password, verify_password, PasswordHashError, PasswordRule,
};
use crate::model::todo::PrincipalId;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+$").expect("valid email regex"));

const USER_SELECT_SQL: &str = "SELECT
    id,
    email,
    password_hash,
    email_confirmed,
    created_at
FROM identity_users";

pub type IdentityResult<T> = Result<T, IdentityError>;

/// Errors from identity store operations.
#[derive(Debug)]
pub enum IdentityError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Email is blank or not shaped like an address.
    InvalidEmail(String),
    /// Role name is blank.
    InvalidRoleName,
    /// Password violates one or more policy rules.
    PasswordPolicy(Vec<PasswordRule>),
    /// Another account already uses this email.
    DuplicateEmail(String),
    /// A role with this name already exists.
    DuplicateRole(String),
    /// Named role does not exist.
    RoleNotFound(String),
    /// Principal id does not resolve to an account.
    UserNotFound(PrincipalId),
    /// Password hashing backend failed.
    PasswordHash(PasswordHashError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
}

impl Display for IdentityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidEmail(email) => write!(f, "invalid email: `{email}`"),
            Self::InvalidRoleName => write!(f, "role name must not be blank"),
            Self::PasswordPolicy(rules) => {
                let joined = rules
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                write!(f, "password rejected: {joined}")
            }
            Self::DuplicateEmail(email) => write!(f, "email already registered: `{email}`"),
            Self::DuplicateRole(name) => write!(f, "role already exists: `{name}`"),
            Self::RoleNotFound(name) => write!(f, "role not found: `{name}`"),
            Self::UserNotFound(id) => write!(f, "user not found: {id}"),
            Self::PasswordHash(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "identity store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "identity store requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid identity data: {message}"),
        }
    }
}

impl Error for IdentityError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::PasswordHash(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for IdentityError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for IdentityError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// An account known to the identity store.
///
/// The password hash never leaves the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: PrincipalId,
    pub email: String,
    pub email_confirmed: bool,
    pub created_at: i64,
}

/// Credential and role store consumed by the seeder and the request layer.
pub trait IdentityStore {
    /// Looks up an account by email, case-insensitively.
    fn find_by_email(&self, email: &str) -> IdentityResult<Option<Principal>>;
    /// Looks up an account by principal id.
    fn find_by_id(&self, id: &str) -> IdentityResult<Option<Principal>>;
    /// Creates an account after email/password validation.
    fn create_account(
        &self,
        email: &str,
        password: &str,
        email_confirmed: bool,
    ) -> IdentityResult<Principal>;
    /// Returns the account when `password` matches, `None` otherwise.
    fn verify_credentials(&self, email: &str, password: &str) -> IdentityResult<Option<Principal>>;
    /// Whether a role with this name exists.
    fn role_exists(&self, name: &str) -> IdentityResult<bool>;
    /// Creates a role. Fails with `DuplicateRole` when it already exists.
    fn create_role(&self, name: &str) -> IdentityResult<()>;
    /// Whether the account is a member of the named role.
    fn is_in_role(&self, user_id: &str, role: &str) -> IdentityResult<bool>;
    /// Adds the account to the named role; existing membership is kept as is.
    fn add_to_role(&self, user_id: &str, role: &str) -> IdentityResult<()>;
    /// Names of every role the account belongs to, sorted.
    fn roles_for(&self, user_id: &str) -> IdentityResult<Vec<String>>;
}

/// SQLite-backed identity store sharing the application database.
pub struct SqliteIdentityStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteIdentityStore<'conn> {
    /// Creates store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> IdentityResult<Self> {
        ensure_identity_connection_ready(conn)?;
        Ok(Self { conn })
    }

    fn role_id(&self, name: &str) -> IdentityResult<Option<String>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM identity_roles WHERE name = ?1;",
                [name.trim()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(id)
    }

    fn load_user_with_hash(&self, email: &str) -> IdentityResult<Option<(Principal, String)>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT_SQL} WHERE email = ?1;"))?;
        let row = stmt
            .query_row([email.trim()], |row| Ok(parse_user_row(row)))
            .optional()?;
        row.transpose()
    }
}

impl IdentityStore for SqliteIdentityStore<'_> {
    fn find_by_email(&self, email: &str) -> IdentityResult<Option<Principal>> {
        Ok(self
            .load_user_with_hash(email)?
            .map(|(principal, _)| principal))
    }

    fn find_by_id(&self, id: &str) -> IdentityResult<Option<Principal>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT_SQL} WHERE id = ?1;"))?;
        let row = stmt
            .query_row([id], |row| Ok(parse_user_row(row)))
            .optional()?;
        Ok(row.transpose()?.map(|(principal, _)| principal))
    }

    fn create_account(
        &self,
        email: &str,
        password: &str,
        email_confirmed: bool,
    ) -> IdentityResult<Principal> {
        let email = normalize_email(email)?;
        let violations = check_password_policy(password);
        if !violations.is_empty() {
            return Err(IdentityError::PasswordPolicy(violations));
        }
        if self.find_by_email(&email)?.is_some() {
            return Err(IdentityError::DuplicateEmail(email));
        }

        let password_hash = hash_password(password).map_err(IdentityError::PasswordHash)?;
        let principal = Principal {
            id: Uuid::new_v4().to_string(),
            email,
            email_confirmed,
            created_at: now_epoch_ms(),
        };

        let inserted = self.conn.execute(
            "INSERT INTO identity_users (
                id,
                email,
                password_hash,
                email_confirmed,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                principal.id.as_str(),
                principal.email.as_str(),
                password_hash,
                i64::from(principal.email_confirmed),
                principal.created_at,
            ],
        );
        match inserted {
            Ok(_) => Ok(principal),
            Err(err) if is_constraint_violation(&err, SQLITE_CONSTRAINT_UNIQUE) => {
                Err(IdentityError::DuplicateEmail(principal.email))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn verify_credentials(&self, email: &str, password: &str) -> IdentityResult<Option<Principal>> {
        Ok(self
            .load_user_with_hash(email)?
            .filter(|(_, stored_hash)| verify_password(password, stored_hash))
            .map(|(principal, _)| principal))
    }

    fn role_exists(&self, name: &str) -> IdentityResult<bool> {
        Ok(self.role_id(name)?.is_some())
    }

    fn create_role(&self, name: &str) -> IdentityResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(IdentityError::InvalidRoleName);
        }

        let inserted = self.conn.execute(
            "INSERT INTO identity_roles (id, name) VALUES (?1, ?2);",
            params![Uuid::new_v4().to_string(), name],
        );
        match inserted {
            Ok(_) => Ok(()),
            Err(err) if is_constraint_violation(&err, SQLITE_CONSTRAINT_UNIQUE) => {
                Err(IdentityError::DuplicateRole(name.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn is_in_role(&self, user_id: &str, role: &str) -> IdentityResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM identity_user_roles ur
                INNER JOIN identity_roles r ON r.id = ur.role_id
                WHERE ur.user_id = ?1
                  AND r.name = ?2
            );",
            params![user_id, role.trim()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn add_to_role(&self, user_id: &str, role: &str) -> IdentityResult<()> {
        let role_id = self
            .role_id(role)?
            .ok_or_else(|| IdentityError::RoleNotFound(role.trim().to_string()))?;
        if self.find_by_id(user_id)?.is_none() {
            return Err(IdentityError::UserNotFound(user_id.to_string()));
        }

        self.conn.execute(
            "INSERT OR IGNORE INTO identity_user_roles (user_id, role_id) VALUES (?1, ?2);",
            params![user_id, role_id],
        )?;
        Ok(())
    }

    fn roles_for(&self, user_id: &str) -> IdentityResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.name
             FROM identity_user_roles ur
             INNER JOIN identity_roles r ON r.id = ur.role_id
             WHERE ur.user_id = ?1
             ORDER BY r.name COLLATE NOCASE ASC;",
        )?;
        let mut rows = stmt.query([user_id])?;
        let mut roles = Vec::new();
        while let Some(row) = rows.next()? {
            roles.push(row.get(0)?);
        }
        Ok(roles)
    }
}

fn normalize_email(email: &str) -> IdentityResult<String> {
    let trimmed = email.trim();
    if !EMAIL_RE.is_match(trimmed) {
        return Err(IdentityError::InvalidEmail(trimmed.to_string()));
    }
    Ok(trimmed.to_string())
}

fn parse_user_row(row: &Row<'_>) -> IdentityResult<(Principal, String)> {
    let email_confirmed = match row.get::<_, i64>("email_confirmed")? {
        0 => false,
        1 => true,
        other => {
            return Err(IdentityError::InvalidData(format!(
                "invalid email_confirmed value `{other}` in identity_users.email_confirmed"
            )));
        }
    };

    let principal = Principal {
        id: row.get("id")?,
        email: row.get("email")?,
        email_confirmed,
        created_at: row.get("created_at")?,
    };
    Ok((principal, row.get("password_hash")?))
}

fn ensure_identity_connection_ready(conn: &Connection) -> IdentityResult<()> {
    let expected_version = latest_version();
    let actual_version = schema_version(conn)?;
    if actual_version != expected_version {
        return Err(IdentityError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in ["identity_users", "identity_roles", "identity_user_roles"] {
        if !table_exists(conn, table)? {
            return Err(IdentityError::MissingRequiredTable(table));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::normalize_email;

    #[test]
    fn normalize_email_trims_and_rejects_malformed_values() {
        assert_eq!(
            normalize_email("  admin@example.com ").expect("valid email"),
            "admin@example.com"
        );
        assert!(normalize_email("").is_err());
        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("two@@example.com").is_err());
    }
}
