use sql_record::translation::to_numbered;

#[test]
fn numbers_placeholders_outside_literals_and_comments() {
    let sql = "select * from t -- where a = ?\n\
               where a = ? and b = 'it''s ?' and \"c?\" = ? /* ? /* ? */ */";
    let expected = "select * from t -- where a = ?\n\
                    where a = $1 and b = 'it''s ?' and \"c?\" = $2 /* ? /* ? */ */";
    assert_eq!(to_numbered(sql), expected);
}

#[test]
fn explicit_numbers_are_kept() {
    assert_eq!(
        to_numbered("select * from t where a = ?2 or b = ?1"),
        "select * from t where a = $2 or b = $1"
    );
}

#[test]
fn dollar_quoted_bodies_are_untouched() {
    let body = "create function f() returns int as $fn$ select ? $fn$ language sql";
    assert_eq!(to_numbered(body), body);

    let tagged = "select $tag$?$tag$, ?";
    assert_eq!(to_numbered(tagged), "select $tag$?$tag$, $1");
}

#[test]
fn statements_without_placeholders_are_borrowed() {
    let sql = "select 1";
    assert!(matches!(to_numbered(sql), std::borrow::Cow::Borrowed(_)));
}
