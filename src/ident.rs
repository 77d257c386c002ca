//! # Identifier Resolver
//!
//! Builds concrete table names from a [`TableFamily`] and user-supplied key
//! tokens, and validates every token that will end up inside statement text.
//!
//! ## Why Validation Lives Here
//!
//! SQLite binds values, never identifiers. A table name therefore has to be
//! written into the statement itself, and this module is the only thing that
//! stands between a request parameter and that statement. Every token must:
//!
//! - be non-empty
//! - contain only `[A-Za-z0-9_]`
//! - keep the composed name within the identifier length limit
//!
//! Names that pass are additionally double-quoted by [`quote`] when they are
//! written into SQL.
//!
//! ## Family Namespaces
//!
//! SQLite compares table names without regard to ASCII case, and two
//! templates below start with a user token. A user copy for user
//! `baseDeDatos` would otherwise land on a master dataset table, and user `x`
//! copying dataset `database` would land on `x`'s link registry. Names built
//! from a leading user token are therefore rejected when, compared without
//! case, they fall inside another family's namespace, equal a fixed table, or
//! use SQLite's reserved `sqlite_` prefix.
//!
//! ## Naming Templates
//!
//! ```text
//! Dataset          baseDeDatos_<dataset>
//! Planogram        planograma_<name>
//! UserDatasetCopy  <username>_<dataset>
//! TenantLinks      <username>_database
//! Inventory        inventory_<username>
//! OrderMirror      orden_<mesa>
//! OrderLedger      ordenes
//! Categories       categorias
//! Products         productos
//! Mesas            mesas
//! Payments         ventasHoy
//! ```

use std::fmt;

use crate::error::{Error, Result};
use crate::schema::{DATASET_CATALOG, LIVE_TABLE, METADATA_TABLE, PLANOGRAM_CATALOG};

/// Longest identifier the store accepts for a dynamically named table.
pub const DEFAULT_MAX_IDENTIFIER_LEN: usize = 64;

// =============================================================================
// Table Families
// =============================================================================

/// A category of dynamically created tables sharing one schema and naming
/// template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableFamily {
    /// Uploaded dataset spreadsheets, catalogued in `bases_datos`.
    Dataset,
    /// Uploaded planogram spreadsheets, catalogued in `bases_planograma`.
    Planogram,
    /// A user's private copy of a dataset table.
    UserDatasetCopy,
    /// Per-user registry of linked datasets.
    TenantLinks,
    /// A user's private copy of the live `data` table.
    Inventory,
    /// Latest order batch for a single mesa.
    OrderMirror,
    /// Append-only order ledger shared by every mesa.
    OrderLedger,
    /// Menu categories.
    Categories,
    /// Menu products, each filed under a category.
    Products,
    /// Registered mesas and their state.
    Mesas,
    /// Payments taken today.
    Payments,
}

/// How a family turns key tokens into a table name.
enum Naming {
    /// `prefix_<k1>_<k2>...`
    Prefix(&'static str),
    /// `<k1>_<k2>..._suffix`
    Suffix(&'static str),
    /// `<k1>_<k2>...`
    Joined,
    /// One fixed table; takes no key.
    Fixed(&'static str),
}

impl TableFamily {
    /// Every family, in provisioning order.
    pub const ALL: [TableFamily; 11] = [
        TableFamily::Dataset,
        TableFamily::Planogram,
        TableFamily::UserDatasetCopy,
        TableFamily::TenantLinks,
        TableFamily::Inventory,
        TableFamily::OrderMirror,
        TableFamily::OrderLedger,
        TableFamily::Categories,
        TableFamily::Products,
        TableFamily::Mesas,
        TableFamily::Payments,
    ];

    fn naming(self) -> Naming {
        match self {
            TableFamily::Dataset => Naming::Prefix("baseDeDatos"),
            TableFamily::Planogram => Naming::Prefix("planograma"),
            TableFamily::UserDatasetCopy => Naming::Joined,
            TableFamily::TenantLinks => Naming::Suffix("database"),
            TableFamily::Inventory => Naming::Prefix("inventory"),
            TableFamily::OrderMirror => Naming::Prefix("orden"),
            TableFamily::OrderLedger => Naming::Fixed("ordenes"),
            TableFamily::Categories => Naming::Fixed("categorias"),
            TableFamily::Products => Naming::Fixed("productos"),
            TableFamily::Mesas => Naming::Fixed("mesas"),
            TableFamily::Payments => Naming::Fixed("ventasHoy"),
        }
    }

    /// Number of key tokens the family's template expects.
    pub fn key_arity(self) -> usize {
        match self {
            TableFamily::UserDatasetCopy => 2,
            TableFamily::OrderLedger
            | TableFamily::Categories
            | TableFamily::Products
            | TableFamily::Mesas
            | TableFamily::Payments => 0,
            _ => 1,
        }
    }

    /// Short lowercase name used in logs and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            TableFamily::Dataset => "dataset",
            TableFamily::Planogram => "planogram",
            TableFamily::UserDatasetCopy => "user-dataset-copy",
            TableFamily::TenantLinks => "tenant-links",
            TableFamily::Inventory => "inventory",
            TableFamily::OrderMirror => "order-mirror",
            TableFamily::OrderLedger => "order-ledger",
            TableFamily::Categories => "categories",
            TableFamily::Products => "products",
            TableFamily::Mesas => "mesas",
            TableFamily::Payments => "payments",
        }
    }
}

impl fmt::Display for TableFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Table Names
// =============================================================================

/// A validated table name, tagged with the family and key it came from.
///
/// # Rust Pattern: Private Constructor
///
/// The fields are private and the only constructors validate, so holding a
/// `TableName` proves the string is safe to place in statement text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    family: TableFamily,
    key: String,
    name: String,
}

impl TableName {
    /// The family this table belongs to.
    pub fn family(&self) -> TableFamily {
        self.family
    }

    /// The key tokens joined with `_`. This is what catalogs record.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The raw (unquoted) table name.
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// The name quoted for use in SQL text.
    pub fn quoted(&self) -> String {
        quote(&self.name)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Composes table names under a configurable identifier length limit.
#[derive(Debug, Clone, Copy)]
pub struct Resolver {
    max_len: usize,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDENTIFIER_LEN)
    }
}

impl Resolver {
    /// Creates a resolver enforcing `max_len` on composed names.
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }

    /// The identifier length limit in effect.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Builds the table name for `family` from `parts`.
    ///
    /// Deterministic and pure: the same inputs always give the same name.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidIdentifier` if any token is empty, contains a character
    ///   outside `[A-Za-z0-9_]`, or the composed name exceeds the limit
    /// - `Error::Validation` if the number of tokens does not match the family
    pub fn resolve(&self, family: TableFamily, parts: &[&str]) -> Result<TableName> {
        if parts.len() != family.key_arity() {
            return Err(Error::Validation(format!(
                "{} tables take {} key token(s), got {}",
                family,
                family.key_arity(),
                parts.len()
            )));
        }
        for part in parts {
            validate_token(part, self.max_len)?;
        }

        let key = parts.join("_");
        let naming = family.naming();
        let name = match naming {
            Naming::Prefix(prefix) => format!("{prefix}_{key}"),
            Naming::Suffix(suffix) => format!("{key}_{suffix}"),
            Naming::Joined => key.clone(),
            Naming::Fixed(name) => name.to_string(),
        };

        if name.len() > self.max_len {
            return Err(Error::InvalidIdentifier {
                token: name,
                reason: "table name exceeds the identifier length limit",
            });
        }

        if matches!(naming, Naming::Suffix(_) | Naming::Joined) && claimed_elsewhere(family, &name) {
            return Err(Error::InvalidIdentifier {
                token: name,
                reason: "table name belongs to another table family",
            });
        }

        Ok(TableName { family, key, name })
    }
}

/// True if `name`, compared without ASCII case, is a fixed table, uses the
/// `sqlite_` prefix, or matches the template of a family other than `family`.
fn claimed_elsewhere(family: TableFamily, name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    let fixed = [
        LIVE_TABLE,
        DATASET_CATALOG.table,
        PLANOGRAM_CATALOG.table,
        METADATA_TABLE,
    ];
    if name.starts_with("sqlite_") || fixed.iter().any(|t| t.eq_ignore_ascii_case(&name)) {
        return true;
    }

    TableFamily::ALL
        .iter()
        .filter(|other| **other != family)
        .any(|other| match other.naming() {
            Naming::Prefix(prefix) => name.starts_with(&format!("{}_", prefix.to_ascii_lowercase())),
            Naming::Suffix(suffix) => name.ends_with(&format!("_{}", suffix.to_ascii_lowercase())),
            Naming::Fixed(table) => table.eq_ignore_ascii_case(&name),
            Naming::Joined => false,
        })
}

/// Resolves with the default identifier length limit.
pub fn resolve(family: TableFamily, parts: &[&str]) -> Result<TableName> {
    Resolver::default().resolve(family, parts)
}

/// Checks that `token` is safe to embed in an identifier.
pub fn validate_token(token: &str, max_len: usize) -> Result<()> {
    if token.is_empty() {
        return Err(Error::invalid_identifier(token, "empty identifier"));
    }
    if token.len() > max_len {
        return Err(Error::invalid_identifier(
            token,
            "identifier exceeds the length limit",
        ));
    }
    if !token
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_')
    {
        return Err(Error::invalid_identifier(
            token,
            "only [A-Za-z0-9_] is allowed",
        ));
    }
    Ok(())
}

/// Validates a single identifier taken from a request (column name, fixed
/// table name, grid header).
pub fn validate_identifier(identifier: &str) -> Result<()> {
    validate_token(identifier, DEFAULT_MAX_IDENTIFIER_LEN)
}

/// Double-quotes an identifier that has already been validated.
pub fn quote(identifier: &str) -> String {
    debug_assert!(!identifier.contains('"'));
    format!("\"{identifier}\"")
}

// =============================================================================
// Tests
// =============================================================================
