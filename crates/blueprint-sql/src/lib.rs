//! DDL statements and identifier helpers.
//!
//! Statements are built as a small typed AST and rendered through `Display`,
//! so the text shown in a plan is exactly the text that gets executed.

mod ddl;
pub use ddl::*;

/// Maximum identifier length Postgres keeps (longer names are truncated).
pub const PG_IDENT_MAX: usize = 63;

/// A PostgreSQL string literal wrapper.
///
/// Display writes the value escaped and quoted with single quotes.
///
/// # Example
/// ```
/// use blueprint_sql::Lit;
/// assert_eq!(format!("{}", Lit("foo")), "'foo'");
/// assert_eq!(format!("{}", Lit("it's")), "'it''s'");
/// ```
pub struct Lit<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Lit<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'")?;
        for c in self.0.as_ref().chars() {
            if c == '\'' {
                write!(f, "''")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "'")
    }
}

/// A PostgreSQL identifier wrapper.
///
/// Display writes the value escaped and quoted with double quotes.
///
/// # Example
/// ```
/// use blueprint_sql::Ident;
/// assert_eq!(format!("{}", Ident("user")), "\"user\"");
/// assert_eq!(format!("{}", Ident("bla\"h")), "\"bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"")?;
        for c in self.0.as_ref().chars() {
            if c == '"' {
                write!(f, "\"\"")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "\"")
    }
}

/// Escape a string literal for SQL.
pub fn escape_string(s: &str) -> String {
    format!("{}", Lit(s))
}

/// Quote a PostgreSQL identifier.
///
/// Always quotes identifiers to avoid issues with reserved keywords like
/// `user`, `order`, `table`, `group`, etc. Doubles any embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("{}", Ident(name))
}

/// Generate a standard index name for a table and columns.
///
/// Uses the convention `idx_{table}_{columns}` where columns are joined by underscore.
///
/// # Examples
///
/// ```
/// assert_eq!(blueprint_sql::index_name("user", &["email"]), "idx_user_email");
/// assert_eq!(blueprint_sql::index_name("post", &["author_id", "created_at"]), "idx_post_author_id_created_at");
/// ```
pub fn index_name(table: &str, columns: &[impl AsRef<str>]) -> String {
    let cols: Vec<&str> = columns.iter().map(|c| c.as_ref()).collect();
    fit_ident(&format!("idx_{}_{}", table, cols.join("_")))
}

/// Name Postgres gives a single-column `UNIQUE` constraint: `{table}_{column}_key`.
pub fn unique_key_name(table: &str, column: &str) -> String {
    fit_ident(&format!("{}_{}_key", table, column))
}

/// Name Postgres gives a primary key constraint: `{table}_pkey`.
pub fn primary_key_name(table: &str) -> String {
    fit_ident(&format!("{}_pkey", table))
}

/// Make a generated identifier fit in [`PG_IDENT_MAX`] bytes.
///
/// Names that already fit are returned unchanged. Longer names keep a prefix
/// and get a stable hash suffix, so two long names sharing a prefix don't
/// collide after Postgres truncates them.
pub fn fit_ident(name: &str) -> String {
    if name.len() <= PG_IDENT_MAX {
        return name.to_string();
    }

    let hex = blake3::hash(name.as_bytes()).to_hex().to_string();
    let suffix = &hex[..16];

    // prefix + "_" + suffix
    let mut len = PG_IDENT_MAX - suffix.len() - 1;
    while len > 0 && !name.is_char_boundary(len) {
        len -= 1;
    }

    format!("{}_{}", &name[..len], suffix)
}
