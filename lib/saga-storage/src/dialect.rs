//! SQL dialect descriptions.
//!
//! Dialects differ only in identifier quoting, parameter placeholders and
//! where the row-lock clause goes.

use serde::Deserialize;

use crate::statement::ParameterKey;

/// Parameter placeholder style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterStyle {
    /// `@name`
    Named,
    /// `$1`, `$2`, ...
    Positional,
}

impl ParameterStyle {
    /// Key for the parameter at 1-based `position` whose natural name is `name`.
    pub fn key(&self, position: usize, name: &str) -> ParameterKey {
        match self {
            ParameterStyle::Named => ParameterKey::Named(name.to_string()),
            ParameterStyle::Positional => ParameterKey::Positional(position),
        }
    }
}

/// Row lock acquired by LOAD and QUERY for the life of the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockClause {
    /// Placed right after the table name, e.g. `WITH (UPDLOCK, ROWLOCK)`.
    TableHint(&'static str),
    /// Appended to the statement, e.g. `FOR UPDATE`.
    Suffix(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub name: &'static str,
    /// Opening and closing identifier quotes; `None` leaves columns bare.
    pub quotes: Option<(char, char)>,
    pub parameters: ParameterStyle,
    pub lock: LockClause,
}

impl Dialect {
    pub const SQL_SERVER: Dialect = Dialect {
        name: "sqlserver",
        quotes: Some(('[', ']')),
        parameters: ParameterStyle::Named,
        lock: LockClause::TableHint("WITH (UPDLOCK, ROWLOCK)"),
    };

    pub const POSTGRES: Dialect = Dialect {
        name: "postgres",
        quotes: None,
        parameters: ParameterStyle::Positional,
        lock: LockClause::Suffix("FOR UPDATE"),
    };

    pub fn quote(&self, identifier: &str) -> String {
        match self.quotes {
            Some((open, close)) => format!("{}{}{}", open, identifier, close),
            None => identifier.to_string(),
        }
    }

    /// `SELECT * FROM table` with any table hint applied.
    pub fn locked_select(&self, table: &str) -> String {
        match self.lock {
            LockClause::TableHint(hint) => format!("SELECT * FROM {} {}", table, hint),
            LockClause::Suffix(_) => format!("SELECT * FROM {}", table),
        }
    }

    /// Trailing lock clause, including its leading space, or empty.
    pub fn lock_suffix(&self) -> String {
        match self.lock {
            LockClause::Suffix(suffix) => format!(" {}", suffix),
            LockClause::TableHint(_) => String::new(),
        }
    }
}

/// Database engine family selected in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseProvider {
    SqlServer,
    Postgres,
}

impl DatabaseProvider {
    pub fn dialect(&self) -> Dialect {
        match self {
            DatabaseProvider::SqlServer => Dialect::SQL_SERVER,
            DatabaseProvider::Postgres => Dialect::POSTGRES,
        }
    }
}
