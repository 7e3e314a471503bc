//! Identifier quoting for generated SQL.
//!
//! Table and column names cannot be bound as statement parameters, so every
//! identifier that reaches dynamic SQL goes through [`quote_ident`]. Names are
//! wrapped in double quotes to preserve mixed case and allow reserved words.
//!
//! # Limitation
//!
//! Embedded double quotes are *not* escaped. A name containing `"` produces
//! invalid SQL and the statement fails on the server.

/// The single namespace read from the source and written on the destination.
pub const FIXED_SCHEMA: &str = "public";

/// Wrap an identifier in double quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name)
}

/// Qualify a table name with [`FIXED_SCHEMA`].
pub fn qualify_table(table: &str) -> String {
    format!("{}.{}", quote_ident(FIXED_SCHEMA), quote_ident(table))
}

/// Quote and comma-join a list of column names.
pub fn quote_list<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_preserves_case_and_reserved_words() {
        assert_eq!(quote_ident("UserId"), "\"UserId\"");
        assert_eq!(quote_ident("order"), "\"order\"");
    }

    #[test]
    fn test_quote_does_not_escape_embedded_quotes() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"ird\"");
    }

    #[test]
    fn test_qualify_table() {
        assert_eq!(qualify_table("users"), "\"public\".\"users\"");
    }

    #[test]
    fn test_quote_list() {
        assert_eq!(quote_list(&["id", "name"]), "\"id\", \"name\"");
        assert_eq!(quote_list::<&str>(&[]), "");
    }
}
