#![cfg(feature = "sqlite")]

mod common;

use common::sqlite_db;
use sql_record::prelude::*;

async fn user_count(db: &Db) -> Result<i64, SqlRecordError> {
    Ok(db
        .query_long("select count(*) from users", &[])
        .await?
        .unwrap_or(-1))
}

fn named(name: &str) -> Record {
    let mut r = Record::new();
    r.set("name", name);
    r
}

#[tokio::test]
async fn committed_and_rolled_back_work() -> Result<(), SqlRecordError> {
    let (_dir, db) = sqlite_db(2).await?;

    let committed = db
        .tx(|| async {
            db.save("users", &mut named("kept")).await?;
            Ok(true)
        })
        .await?;
    assert!(committed);

    let rolled_back = db
        .tx(|| async {
            db.save("users", &mut named("dropped")).await?;
            Ok(false)
        })
        .await?;
    assert!(!rolled_back);

    assert_eq!(user_count(&db).await?, 1);
    Ok(())
}

#[tokio::test]
async fn failing_atom_rolls_back_and_returns_its_error() -> Result<(), SqlRecordError> {
    let (_dir, db) = sqlite_db(2).await?;

    let err = db
        .tx(|| async {
            db.save("users", &mut named("partial")).await?;
            db.update_sql("update no_such_table set x = 1", &[]).await?;
            Ok(true)
        })
        .await
        .unwrap_err();
    assert_eq!(err.sql(), Some("update no_such_table set x = 1"));
    assert_eq!(user_count(&db).await?, 0);
    Ok(())
}

#[tokio::test]
async fn nested_transactions_share_the_outer_connection() -> Result<(), SqlRecordError> {
    let (_dir, db) = sqlite_db(2).await?;

    db.tx(|| async {
        db.save("users", &mut named("outer")).await?;
        db.tx(|| async {
            // Uncommitted work is only visible on the same connection.
            assert_eq!(user_count(&db).await?, 1);
            db.save("users", &mut named("inner")).await?;
            Ok(true)
        })
        .await?;
        Ok(true)
    })
    .await?;
    assert_eq!(user_count(&db).await?, 2);

    let err = db
        .tx(|| async {
            db.save("users", &mut named("doomed")).await?;
            db.tx(|| async { Ok(false) }).await?;
            Ok(true)
        })
        .await
        .unwrap_err();
    assert!(err.is_nested_rollback());
    assert_eq!(user_count(&db).await?, 2);
    Ok(())
}

#[tokio::test]
async fn ignored_nested_rollback_discards_all_work() -> Result<(), SqlRecordError> {
    let (_dir, db) = sqlite_db(2).await?;

    let outcome = db
        .tx(|| async {
            db.save("users", &mut named("outer")).await?;
            let _ = db
                .tx(|| async {
                    db.save("users", &mut named("inner")).await?;
                    Ok(false)
                })
                .await;
            Ok(true)
        })
        .await;
    assert!(outcome.unwrap_err().is_nested_rollback());
    assert_eq!(user_count(&db).await?, 0);
    Ok(())
}

#[tokio::test]
async fn batches_inside_a_transaction_commit_with_it() -> Result<(), SqlRecordError> {
    let (_dir, db) = sqlite_db(2).await?;
    let rows: Vec<Vec<Value>> = (1..=6).map(|n| vec![Value::Long(n)]).collect();

    db.tx(|| async {
        db.batch("insert into nums(n) values(?)", &rows, 4).await?;
        Ok(false)
    })
    .await?;
    assert_eq!(
        db.query_long("select count(*) from nums", &[]).await?,
        Some(0)
    );
    Ok(())
}

#[tokio::test]
async fn new_task_transactions_are_independent() -> Result<(), SqlRecordError> {
    let (_dir, db) = sqlite_db(2).await?;

    let background = db.clone();
    let handle = db.tx_in_new_task(move || async move {
        background.save("users", &mut named("background")).await?;
        Ok(true)
    });
    let committed = handle
        .await
        .map_err(|e| SqlRecordError::Other(e.to_string()))??;
    assert!(committed);
    assert_eq!(user_count(&db).await?, 1);
    Ok(())
}

#[tokio::test]
async fn with_connection_reuses_the_transaction_connection() -> Result<(), SqlRecordError> {
    let (_dir, db) = sqlite_db(2).await?;

    db.tx(|| async {
        db.save("users", &mut named("seen")).await?;
        let n = db
            .with_connection(|conn| {
                Box::pin(async move {
                    let mut cursor = conn.query("select name from users", &[]).await?;
                    let mut count = 0;
                    while cursor.next_row().await?.is_some() {
                        count += 1;
                    }
                    Ok(count)
                })
            })
            .await?;
        assert_eq!(n, 1);
        Ok(true)
    })
    .await?;
    Ok(())
}
