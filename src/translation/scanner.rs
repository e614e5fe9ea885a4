use super::parsers::{
    digits_end, dollar_tag_len, is_block_comment, is_line_comment, skip_block_comment,
    skip_dollar_quoted, skip_line_comment, skip_quoted,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Token<'a> {
    /// SQL copied through unchanged, including literals and comments.
    Text(&'a str),
    /// A `?` placeholder with its explicit number, if any (`?3`).
    Placeholder(Option<&'a str>),
}

/// Splits SQL into verbatim text and placeholders. Region boundaries are ASCII bytes, so
/// every slice handed out is valid UTF-8.
pub(super) struct Scanner<'a> {
    sql: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub(super) fn new(sql: &'a str) -> Self {
        Self { sql, pos: 0 }
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        let bytes = self.sql.as_bytes();
        let start = self.pos;
        if start >= bytes.len() {
            return None;
        }

        if bytes[start] == b'?' {
            let end = digits_end(bytes, start + 1);
            self.pos = end;
            let number = (end > start + 1).then(|| &self.sql[start + 1..end]);
            return Some(Token::Placeholder(number));
        }

        let mut idx = start;
        while idx < bytes.len() {
            idx = match bytes[idx] {
                b'?' => break,
                quote @ (b'\'' | b'"') => skip_quoted(bytes, idx, quote),
                b'$' => match dollar_tag_len(bytes, idx) {
                    Some(len) => skip_dollar_quoted(bytes, idx, len),
                    None => idx + 1,
                },
                _ if is_line_comment(bytes, idx) => skip_line_comment(bytes, idx),
                _ if is_block_comment(bytes, idx) => skip_block_comment(bytes, idx),
                _ => idx + 1,
            };
        }
        self.pos = idx;
        Some(Token::Text(&self.sql[start..idx]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_and_comments_stay_in_text() {
        let tokens: Vec<_> = Scanner::new("a = ? /* ? */ and b = '?' -- ?\n?2").collect();
        assert_eq!(
            tokens,
            vec![
                Token::Text("a = "),
                Token::Placeholder(None),
                Token::Text(" /* ? */ and b = '?' -- ?\n"),
                Token::Placeholder(Some("2")),
            ]
        );
    }
}
