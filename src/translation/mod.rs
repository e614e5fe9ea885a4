//! Placeholder rewriting for drivers that number their parameters.
//!
//! Generated SQL always uses `?`. PostgreSQL wants `$1, $2, ...`, so its driver runs every
//! statement through [`to_numbered`] before preparing it.

use std::borrow::Cow;

mod parsers;
mod scanner;

use scanner::{Scanner, Token};

/// Rewrite `?` placeholders as `$N`: bare `?` are numbered left to right, `?N` keeps its
/// number. Placeholders inside string literals, quoted identifiers, comments and
/// dollar-quoted bodies are left alone.
///
/// The scanner is deliberately small. SQL using `?` as an operator (PostgreSQL's JSONB key
/// test) must be written with the function form instead (`jsonb_exists`).
///
/// ```rust
/// use sql_record::translation::to_numbered;
///
/// let sql = to_numbered("select * from t where a = ? and b = 'é?' and c = ?");
/// assert_eq!(sql, "select * from t where a = $1 and b = 'é?' and c = $2");
/// ```
///
/// Returns the input unchanged (borrowed) when it has no placeholders.
#[must_use]
pub fn to_numbered(sql: &str) -> Cow<'_, str> {
    if !Scanner::new(sql).any(|t| matches!(t, Token::Placeholder(_))) {
        return Cow::Borrowed(sql);
    }
    let mut out = String::with_capacity(sql.len() + 8);
    let mut next = 0u32;
    for token in Scanner::new(sql) {
        match token {
            Token::Text(text) => out.push_str(text),
            Token::Placeholder(Some(number)) => {
                out.push('$');
                out.push_str(number);
            }
            Token::Placeholder(None) => {
                next += 1;
                out.push('$');
                out.push_str(&next.to_string());
            }
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_bare_placeholders() {
        let res = to_numbered("insert into t(a, b) values(?, ?)");
        assert_eq!(res, "insert into t(a, b) values($1, $2)");
    }

    #[test]
    fn keeps_explicit_numbers() {
        let res = to_numbered("select * from t where a = ?1 or b = ?1 and c = ?2");
        assert_eq!(res, "select * from t where a = $1 or b = $1 and c = $2");
    }

    #[test]
    fn skips_inside_literals_and_comments() {
        let sql = "select '?', \"col?\" -- ?\n/* ? /* ? */ */ from t where a = ?";
        let res = to_numbered(sql);
        assert_eq!(res, "select '?', \"col?\" -- ?\n/* ? /* ? */ */ from t where a = $1");
    }

    #[test]
    fn skips_dollar_quoted_blocks() {
        let sql = "select $fn$ ? $fn$, $$?$$ where a = ?";
        assert_eq!(to_numbered(sql), "select $fn$ ? $fn$, $$?$$ where a = $1");
    }

    #[test]
    fn escaped_quotes_and_multibyte_text_survive() {
        let sql = "select 'it''s ?', 'ünïcödé' from t where a = ?";
        assert_eq!(to_numbered(sql), "select 'it''s ?', 'ünïcödé' from t where a = $1");
    }

    #[test]
    fn borrows_when_nothing_changes() {
        let sql = "select '?' from t";
        assert!(matches!(to_numbered(sql), Cow::Borrowed(_)));
        assert!(matches!(to_numbered(""), Cow::Borrowed(_)));
    }
}
