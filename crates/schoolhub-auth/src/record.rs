//! Login records and the identities they resolve to.

use std::fmt;
use std::str::FromStr;

use schoolhub_core::CoreError;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::rate_limit::TokenBucket;

/// Kind of account a login belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalType {
    Student,
    Teacher,
}

impl PrincipalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
        }
    }
}

impl fmt::Display for PrincipalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrincipalType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Self::Student),
            "teacher" => Ok(Self::Teacher),
            other => Err(CoreError::invalid_input(format!(
                "unknown principal type '{other}'"
            ))),
        }
    }
}

/// Unique login identity: account kind plus login name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoginKey {
    pub principal_type: PrincipalType,
    pub login_name: String,
}

impl LoginKey {
    pub fn new(principal_type: PrincipalType, login_name: impl Into<String>) -> Self {
        Self {
            principal_type,
            login_name: login_name.into(),
        }
    }

    pub fn student(login_name: impl Into<String>) -> Self {
        Self::new(PrincipalType::Student, login_name)
    }

    pub fn teacher(login_name: impl Into<String>) -> Self {
        Self::new(PrincipalType::Teacher, login_name)
    }

    /// Store key of the record, `login/<type>/<name>`.
    pub fn store_key(&self) -> String {
        schoolhub_storage::keys::login_key(self.principal_type.as_str(), &self.login_name)
    }
}

impl fmt::Display for LoginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.principal_type, self.login_name)
    }
}

/// A token bound to a login record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub value: String,
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
}

/// Credentials and session state of one login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRecord {
    pub key: LoginKey,
    /// Id of the student or teacher this login acts as.
    pub principal_id: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    #[serde(default)]
    pub token: Option<IssuedToken>,
    /// Failed-attempt limiter, created on the first failure. Never persisted.
    #[serde(skip)]
    pub limiter: Option<TokenBucket>,
}

impl LoginRecord {
    pub fn new(key: LoginKey, principal_id: impl Into<String>, password_hash: String) -> Self {
        Self {
            key,
            principal_id: principal_id.into(),
            password_hash,
            token: None,
            limiter: None,
        }
    }

    pub fn principal(&self) -> Principal {
        Principal {
            principal_type: self.key.principal_type,
            principal_id: self.principal_id.clone(),
            login_name: self.key.login_name.clone(),
        }
    }
}

/// The identity a token resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub principal_type: PrincipalType,
    pub principal_id: String,
    pub login_name: String,
}

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub token: String,
    pub principal: Principal,
}
