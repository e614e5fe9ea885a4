#![cfg(feature = "sqlite")]

mod common;

use std::sync::Arc;

use common::{insert_numbers, sqlite_db, sqlite_db_with};
use sql_record::prelude::*;

fn numbers(records: &[Record]) -> Vec<i64> {
    records.iter().filter_map(|r| r.get_long("n")).collect()
}

#[tokio::test]
async fn paginate_windows_and_counts() -> Result<(), SqlRecordError> {
    let (_dir, db) = sqlite_db(2).await?;
    insert_numbers(&db, 25).await?;

    let page = db
        .paginate(2, 10, "select n", "from nums order by n", &[])
        .await?;
    assert_eq!(numbers(page.items()), (11..=20).collect::<Vec<_>>());
    assert_eq!(page.total_rows(), 25);
    assert_eq!(page.total_pages(), 3);

    let last = db
        .paginate(3, 10, "select n", "from nums order by n", &[])
        .await?;
    assert_eq!(numbers(last.items()), (21..=25).collect::<Vec<_>>());
    assert!(last.is_last_page());

    let past = db
        .paginate(4, 10, "select n", "from nums order by n", &[])
        .await?;
    assert!(past.items().is_empty());
    assert_eq!((past.total_pages(), past.total_rows()), (3, 25));
    Ok(())
}

#[tokio::test]
async fn paginate_grouped_counts_groups() -> Result<(), SqlRecordError> {
    let (_dir, db) = sqlite_db(2).await?;
    insert_numbers(&db, 25).await?;

    let page = db
        .paginate_with_group_by(
            1,
            2,
            true,
            "select n % 3 as bucket, count(*) as c",
            "from nums group by n % 3 order by bucket",
            &[],
        )
        .await?;
    assert_eq!(page.total_rows(), 3);
    assert_eq!(page.total_pages(), 2);
    assert_eq!(page.items().len(), 2);
    Ok(())
}

#[tokio::test]
async fn paginate_with_zero_page_is_rejected() -> Result<(), SqlRecordError> {
    let (_dir, db) = sqlite_db(1).await?;
    let err = db
        .paginate(0, 10, "select n", "from nums", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, SqlRecordError::ConfigError(_)));
    Ok(())
}

#[tokio::test]
async fn each_stops_when_the_visitor_says_so() -> Result<(), SqlRecordError> {
    let (_dir, db) = sqlite_db(2).await?;
    insert_numbers(&db, 25).await?;

    let mut seen = Vec::new();
    let visited = db
        .each("select n from nums order by n", &[], |record| {
            seen.extend(record.get_long("n"));
            seen.len() < 3
        })
        .await?;
    assert_eq!(visited, 3);
    assert_eq!(seen, vec![1, 2, 3]);

    let first = db
        .find_first("select n from nums order by n desc", &[])
        .await?
        .and_then(|r| r.get_long("n"));
    assert_eq!(first, Some(25));
    Ok(())
}

#[tokio::test]
async fn abandoned_cursor_frees_its_connection() -> Result<(), SqlRecordError> {
    let (_dir, db) = sqlite_db(1).await?;
    insert_numbers(&db, 100).await?;

    let (width, deleted) = db
        .with_connection(|conn| {
            Box::pin(async move {
                let width = {
                    let mut cursor = conn.query("select n from nums order by n", &[]).await?;
                    cursor.next_row().await?.map(|row| row.len())
                };
                let deleted = conn
                    .execute("delete from nums where n > ?", &[Value::Long(50)])
                    .await?;
                Ok((width, deleted))
            })
        })
        .await?;
    assert_eq!(width, Some(1));
    assert_eq!(deleted, 50);
    Ok(())
}

#[tokio::test]
async fn batches_keep_input_order() -> Result<(), SqlRecordError> {
    let (_dir, db) = sqlite_db(2).await?;

    let records: Vec<Record> = ["ann", "ben", "cat", "dan", "eve"]
        .iter()
        .map(|name| {
            let mut r = Record::new();
            r.set("name", *name);
            r
        })
        .collect();
    let counts = db.batch_save("users", &records, 2).await?;
    assert_eq!(counts, vec![1; 5]);

    let names: Vec<String> = db
        .query_column("select name from users order by id", &[])
        .await?
        .into_iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    assert_eq!(names, vec!["ann", "ben", "cat", "dan", "eve"]);

    let mut loaded = db.find("select * from users order by id", &[]).await?;
    for record in &mut loaded {
        let upper = record.get_str("name").unwrap_or_default().to_uppercase();
        record.set("name", upper);
    }
    db.batch_update("users", &loaded, 3).await?;
    assert_eq!(
        db.query_str("select name from users order by id desc", &[])
            .await?,
        Some("EVE".to_string())
    );

    let deletes: Vec<String> = ["ann", "ben"]
        .iter()
        .map(|n| format!("delete from users where name = '{}'", n.to_uppercase()))
        .collect();
    assert_eq!(db.batch_sql_list(&deletes, 1).await?, vec![1, 1]);
    assert_eq!(
        db.query_long("select count(*) from users", &[]).await?,
        Some(3)
    );
    Ok(())
}

#[tokio::test]
async fn cached_reads_hit_the_database_once() -> Result<(), SqlRecordError> {
    let cache = Arc::new(MemoryCache::new());
    let shared: Arc<dyn Cache> = cache.clone();
    let (_dir, db) = sqlite_db_with(2, move |builder| builder.cache(shared)).await?;
    insert_numbers(&db, 5).await?;

    let sql = "select n from nums order by n";
    let first = db.find_by_cache("nums", "all", sql, &[]).await?;
    assert_eq!(first.len(), 5);

    db.delete_sql("delete from nums", &[]).await?;
    let cached = db.find_by_cache("nums", "all", sql, &[]).await?;
    assert_eq!(cached, first);
    assert_eq!(cache.len(), 1);

    let fresh = db.find(sql, &[]).await?;
    assert!(fresh.is_empty());
    Ok(())
}
