use progress_core::Clock;
use progress_core::model::ProgressRecord;
use progress_core::time::fixed_now;
use sqlx::Row;
use storage::repository::{OwnerTagRepository, ProgressCache, Storage};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let repo = SqliteRepository::connect(&format!(
        "sqlite:file:{name}?mode=memory&cache=shared"
    ))
    .await
    .expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn record(pairs: &[(&str, bool)]) -> ProgressRecord {
    pairs
        .iter()
        .map(|(key, done)| ((*key).to_string(), *done))
        .collect()
}

#[tokio::test]
async fn sqlite_roundtrips_progress_records() {
    let repo = connect("memdb_roundtrip").await;

    repo.write(
        "python_dsa",
        &record(&[("Two Pointers", true), ("Two Pointers__videos__Intro", false)]),
    )
    .await
    .unwrap();

    let fetched = repo.read("python_dsa").await.unwrap().expect("record");
    assert!(fetched.is_done("Two Pointers"));
    assert_eq!(fetched.get("Two Pointers__videos__Intro"), Some(false));
    assert!(repo.read("rust_dsa").await.unwrap().is_none());

    repo.write("python_dsa", &record(&[("Sliding Window", true)]))
        .await
        .unwrap();
    let replaced = repo.read("python_dsa").await.unwrap().unwrap();
    assert_eq!(replaced.len(), 1);
}

#[tokio::test]
async fn sqlite_lists_only_progress_keys() {
    let repo = connect("memdb_list_keys").await;

    repo.write("dsa", &record(&[("Arrays", true)])).await.unwrap();
    repo.write("gate", &record(&[("DBMS", false)])).await.unwrap();
    repo.set_owner("user-1").await.unwrap();

    assert_eq!(repo.list_progress_keys().await.unwrap(), vec!["dsa", "gate"]);

    repo.remove("gate").await.unwrap();
    assert_eq!(repo.list_progress_keys().await.unwrap(), vec!["dsa"]);
    assert_eq!(repo.owner().await.unwrap().as_deref(), Some("user-1"));
}

#[tokio::test]
async fn sqlite_treats_malformed_blob_as_missing() {
    let repo = connect("memdb_malformed").await;

    sqlx::query("INSERT INTO local_store (key, value, updated_at) VALUES (?1, ?2, ?3)")
        .bind("cpp_dev_progress")
        .bind("[1, 2")
        .bind(fixed_now())
        .execute(repo.pool())
        .await
        .unwrap();

    assert!(repo.read("cpp_dev").await.unwrap().is_none());
    assert_eq!(repo.list_progress_keys().await.unwrap(), vec!["cpp_dev"]);
}

#[tokio::test]
async fn sqlite_stamps_writes_with_clock() {
    let repo = connect("memdb_clock")
        .await
        .with_clock(Clock::fixed(fixed_now()));

    repo.write("dsa", &record(&[("Heaps", true)])).await.unwrap();

    let row = sqlx::query("SELECT updated_at FROM local_store WHERE key = 'dsa_progress'")
        .fetch_one(repo.pool())
        .await
        .unwrap();
    let updated_at: chrono::DateTime<chrono::Utc> = row.try_get("updated_at").unwrap();
    assert_eq!(updated_at, fixed_now());
}

#[tokio::test]
async fn storage_sqlite_shares_one_database() {
    let storage = Storage::sqlite("sqlite:file:memdb_storage?mode=memory&cache=shared")
        .await
        .expect("storage");

    storage
        .progress
        .write("java_dev", &record(&[("Streams", true)]))
        .await
        .unwrap();
    storage.owner.set_owner("user-2").await.unwrap();
    storage.owner.set_migration_pending(true).await.unwrap();
    storage.owner.clear_owner().await.unwrap();

    assert!(storage.owner.owner().await.unwrap().is_none());
    assert!(storage.owner.migration_pending().await.unwrap());
    assert_eq!(
        storage.progress.list_progress_keys().await.unwrap(),
        vec!["java_dev"]
    );
}
