//! Store behaviour against a real database
//!
//! Each test gets a fresh database from `#[sqlx::test]` with the workspace
//! migrations applied. Requires `DATABASE_URL`.

use sqlx::PgPool;
use uuid::Uuid;

use jobfeed_common::{NewPosting, SalaryRange, Source};
use jobfeed_engine::db::{PostingSink, PostingStore, StoreError};

fn posting(title: &str, employment_types: &[&str]) -> NewPosting {
    NewPosting {
        title: title.to_string(),
        profession: "Программист".to_string(),
        company_name: "Контур".to_string(),
        salary: SalaryRange::new(Some(30000), None),
        source_name: "hh.ru".to_string(),
        link: format!("https://hh.ru/vacancy/{}", title),
        description: "Стажировка".to_string(),
        employment_types: employment_types.iter().map(|s| s.to_string()).collect(),
    }
}

async fn backdate(pool: &PgPool, id: Uuid, days: i32) {
    sqlx::query("UPDATE postings SET created_at = NOW() - make_interval(days => $1) WHERE id = $2")
        .bind(days)
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
}

async fn count(pool: &PgPool, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_insert_links_employment_types(pool: PgPool) {
    let store = PostingStore::new(pool.clone());

    store
        .insert_posting(&posting("a", &["Полная занятость", "Удаленная работа"]))
        .await
        .unwrap();
    store
        .insert_posting(&posting("b", &["Полная занятость"]))
        .await
        .unwrap();
    store.insert_posting(&posting("c", &[])).await.unwrap();

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM postings").await, 3);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM employment_types").await, 2);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM posting_employment_types").await, 3);

    assert_eq!(
        store.list_employment_types().await.unwrap(),
        vec!["Полная занятость".to_string(), "Удаленная работа".to_string()]
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_missing_salary_is_stored_as_null(pool: PgPool) {
    let store = PostingStore::new(pool.clone());
    let mut new = posting("no-salary", &[]);
    new.salary = SalaryRange::default();

    let id = store.insert_posting(&new).await.unwrap();

    let (from, to): (Option<i64>, Option<i64>) =
        sqlx::query_as("SELECT salary_from, salary_to FROM postings WHERE id = $1")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!((from, to), (None, None));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_employment_type_names_are_case_sensitive(pool: PgPool) {
    let store = PostingStore::new(pool.clone());

    let lower = store.upsert_employment_type("стажировка").await.unwrap();
    let upper = store.upsert_employment_type("Стажировка").await.unwrap();
    let again = store.upsert_employment_type("стажировка").await.unwrap();

    assert_ne!(lower, upper);
    assert_eq!(lower, again);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_concurrent_inserts_share_new_employment_type(pool: PgPool) {
    let store = PostingStore::new(pool.clone());
    let first = posting("x", &["Проектная работа"]);
    let second = posting("y", &["Проектная работа"]);

    let (a, b) = tokio::join!(store.insert_posting(&first), store.insert_posting(&second));
    a.unwrap();
    b.unwrap();

    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM employment_types WHERE name = 'Проектная работа'").await,
        1
    );
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM posting_employment_types").await, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_many_concurrent_upserts_return_one_id(pool: PgPool) {
    let store = PostingStore::new(pool.clone());

    let ids = futures::future::join_all((0..8).map(|_| store.upsert_employment_type("Вахта"))).await;
    let ids: Vec<i32> = ids.into_iter().map(Result::unwrap).collect();

    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM employment_types").await, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_purge_removes_only_stale_rows_and_is_idempotent(pool: PgPool) {
    let store = PostingStore::new(pool.clone());

    let old = store.insert_posting(&posting("old", &["Полная занятость"])).await.unwrap();
    let recent = store.insert_posting(&posting("recent", &[])).await.unwrap();
    store.insert_posting(&posting("fresh", &[])).await.unwrap();
    backdate(&pool, old, 10).await;
    backdate(&pool, recent, 3).await;

    assert_eq!(store.purge(7).await.unwrap(), 1);
    assert_eq!(store.purge(7).await.unwrap(), 0);

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM postings").await, 2);
    // Links go with the posting, the type itself stays
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM posting_employment_types").await, 0);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM employment_types").await, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_purge_rejects_negative_window(pool: PgPool) {
    let store = PostingStore::new(pool);
    assert!(matches!(store.purge(-1).await, Err(StoreError::Invalid(_))));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_insert_rejects_missing_link(pool: PgPool) {
    let store = PostingStore::new(pool.clone());
    let mut new = posting("no-link", &[]);
    new.link = " ".to_string();

    assert!(matches!(store.insert_posting(&new).await, Err(StoreError::Invalid(_))));
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM postings").await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_register_and_list_sources(pool: PgPool) {
    let store = PostingStore::new(pool);

    store.register_source(&Source::new("hh.ru", "https://api.hh.ru")).await.unwrap();
    store
        .register_source(&Source::new("trudvsem.ru", "http://opendata.trudvsem.ru/api/v1"))
        .await
        .unwrap();
    store.register_source(&Source::new("hh.ru", "https://api.hh.ru/v2")).await.unwrap();

    let sources = store.list_sources().await.unwrap();
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0], Source::new("hh.ru", "https://api.hh.ru/v2"));
}
