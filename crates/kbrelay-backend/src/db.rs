use kbrelay_core::types::sqlx::{
  FileKnowledgeRelation, KnowledgeBase, KnowledgeBaseFile, ProviderFile, UploadedFile,
};
use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};

const MIGRATION_SQL: &str = include_str!("../migrations/sqlite/kbrelay.sql");

pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
  sqlx::raw_sql(MIGRATION_SQL).execute(pool).await?;

  Ok(())
}

pub async fn get_knowledge_base_by_name<'e, E>(
  executor: E,
  name: &str,
) -> Result<Option<KnowledgeBase>, sqlx::Error>
where
  E: Executor<'e, Database = Sqlite>,
{
  sqlx::query_as::<_, KnowledgeBase>(
    r#"
SELECT * FROM knowledge_base WHERE name = ?;
    "#,
  )
  .bind(name)
  .fetch_optional(executor)
  .await
}

pub async fn get_knowledge_base_by_id<'e, E>(
  executor: E,
  id: &str,
) -> Result<Option<KnowledgeBase>, sqlx::Error>
where
  E: Executor<'e, Database = Sqlite>,
{
  sqlx::query_as::<_, KnowledgeBase>(
    r#"
SELECT * FROM knowledge_base WHERE id = ? AND id != '';
    "#,
  )
  .bind(id)
  .fetch_optional(executor)
  .await
}

pub async fn insert_knowledge_base<'e, E>(executor: E, kb: &KnowledgeBase) -> Result<(), sqlx::Error>
where
  E: Executor<'e, Database = Sqlite>,
{
  sqlx::query(
    r#"
INSERT INTO knowledge_base ( name, id, display_name, description, tags, model_owner, creator_id, created_at )
VALUES ( ?, ?, ?, ?, ?, ?, ?, ? );
    "#,
  )
  .bind(&kb.name)
  .bind(&kb.id)
  .bind(&kb.display_name)
  .bind(&kb.description)
  .bind(&kb.tags)
  .bind(&kb.model_owner)
  .bind(&kb.creator_id)
  .bind(kb.created_at)
  .execute(executor)
  .await?;

  Ok(())
}

/// Display fields only; `name` and `model_owner` never change here.
pub async fn update_knowledge_base_metadata<'e, E>(
  executor: E,
  name: &str,
  display_name: &str,
  description: &str,
  tags: &str,
) -> Result<u64, sqlx::Error>
where
  E: Executor<'e, Database = Sqlite>,
{
  let result = sqlx::query(
    r#"
UPDATE knowledge_base SET display_name = ?, description = ?, tags = ? WHERE name = ?;
    "#,
  )
  .bind(display_name)
  .bind(description)
  .bind(tags)
  .bind(name)
  .execute(executor)
  .await?;

  Ok(result.rows_affected())
}

/// Overwrites every field of a record that never received an id.
pub async fn update_pending_knowledge_base<'e, E>(
  executor: E,
  kb: &KnowledgeBase,
) -> Result<u64, sqlx::Error>
where
  E: Executor<'e, Database = Sqlite>,
{
  let result = sqlx::query(
    r#"
UPDATE knowledge_base
SET id = ?, display_name = ?, description = ?, tags = ?, model_owner = ?, creator_id = ?, created_at = ?
WHERE name = ? AND id = '';
    "#,
  )
  .bind(&kb.id)
  .bind(&kb.display_name)
  .bind(&kb.description)
  .bind(&kb.tags)
  .bind(&kb.model_owner)
  .bind(&kb.creator_id)
  .bind(kb.created_at)
  .bind(&kb.name)
  .execute(executor)
  .await?;

  Ok(result.rows_affected())
}

/// Backfills the provider id, or clears it (empty string) to mark the record pending.
pub async fn set_knowledge_base_id<'e, E>(
  executor: E,
  name: &str,
  id: &str,
) -> Result<u64, sqlx::Error>
where
  E: Executor<'e, Database = Sqlite>,
{
  let result = sqlx::query(
    r#"
UPDATE knowledge_base SET id = ? WHERE name = ?;
    "#,
  )
  .bind(id)
  .bind(name)
  .execute(executor)
  .await?;

  Ok(result.rows_affected())
}

pub async fn list_knowledge_bases<'e, E>(executor: E) -> Result<Vec<KnowledgeBase>, sqlx::Error>
where
  E: Executor<'e, Database = Sqlite>,
{
  sqlx::query_as::<_, KnowledgeBase>(
    r#"
SELECT * FROM knowledge_base
ORDER BY CASE model_owner WHEN 'local' THEN 0 ELSE 1 END, id;
    "#,
  )
  .fetch_all(executor)
  .await
}

pub async fn insert_uploaded_file<'e, E>(executor: E, file: &UploadedFile) -> Result<(), sqlx::Error>
where
  E: Executor<'e, Database = Sqlite>,
{
  sqlx::query(
    r#"
INSERT INTO uploaded_file (
  file_id, filename, file_path, file_type, description, upload_time, status, username, file_size,
  provider_file_id, provider_purpose, provider_status, provider_vector_store_id
)
VALUES ( ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ? );
    "#,
  )
  .bind(&file.file_id)
  .bind(&file.filename)
  .bind(&file.file_path)
  .bind(&file.file_type)
  .bind(&file.description)
  .bind(file.upload_time)
  .bind(&file.status)
  .bind(&file.username)
  .bind(file.file_size)
  .bind(&file.provider_file_id)
  .bind(&file.provider_purpose)
  .bind(&file.provider_status)
  .bind(&file.provider_vector_store_id)
  .execute(executor)
  .await?;

  Ok(())
}

/// Files are only visible to the user who uploaded them.
pub async fn get_user_file<'e, E>(
  executor: E,
  file_id: &str,
  username: &str,
) -> Result<Option<UploadedFile>, sqlx::Error>
where
  E: Executor<'e, Database = Sqlite>,
{
  sqlx::query_as::<_, UploadedFile>(
    r#"
SELECT * FROM uploaded_file WHERE file_id = ? AND username = ?;
    "#,
  )
  .bind(file_id)
  .bind(username)
  .fetch_optional(executor)
  .await
}

/// Dedup lookup; the oldest matching upload wins.
pub async fn find_uploaded_file<'e, E>(
  executor: E,
  filename: &str,
  file_size: i64,
  username: &str,
) -> Result<Option<UploadedFile>, sqlx::Error>
where
  E: Executor<'e, Database = Sqlite>,
{
  sqlx::query_as::<_, UploadedFile>(
    r#"
SELECT * FROM uploaded_file
WHERE filename = ? AND file_size = ? AND username = ?
ORDER BY upload_time, file_id
LIMIT 1;
    "#,
  )
  .bind(filename)
  .bind(file_size)
  .bind(username)
  .fetch_optional(executor)
  .await
}

pub async fn update_uploaded_file_status<'e, E>(
  executor: E,
  file_id: &str,
  status: &str,
) -> Result<u64, sqlx::Error>
where
  E: Executor<'e, Database = Sqlite>,
{
  let result = sqlx::query(
    r#"
UPDATE uploaded_file SET status = ? WHERE file_id = ?;
    "#,
  )
  .bind(status)
  .bind(file_id)
  .execute(executor)
  .await?;

  Ok(result.rows_affected())
}

/// Records a provider-side file and mirrors it onto the uploaded file it came from.
pub async fn insert_provider_file(
  conn: &mut SqliteConnection,
  file: &ProviderFile,
) -> Result<(), sqlx::Error> {
  sqlx::query(
    r#"
REPLACE INTO provider_file ( id, knowledge_base_id, usage_bytes, uploaded_file_id, purpose, status, created_at )
VALUES ( ?, ?, ?, ?, ?, ?, ? );
    "#,
  )
  .bind(&file.id)
  .bind(&file.knowledge_base_id)
  .bind(file.usage_bytes)
  .bind(&file.uploaded_file_id)
  .bind(&file.purpose)
  .bind(&file.status)
  .bind(file.created_at)
  .execute(&mut *conn)
  .await?;

  if let Some(uploaded_file_id) = &file.uploaded_file_id {
    sqlx::query(
      r#"
UPDATE uploaded_file
SET provider_file_id = ?, provider_purpose = ?, provider_status = ?, provider_vector_store_id = ?
WHERE file_id = ?;
      "#,
    )
    .bind(&file.id)
    .bind(&file.purpose)
    .bind(&file.status)
    .bind(&file.knowledge_base_id)
    .bind(uploaded_file_id)
    .execute(&mut *conn)
    .await?;
  }

  Ok(())
}

/// Latest provider file for an uploaded file in one knowledge base and purpose.
pub async fn find_provider_file<'e, E>(
  executor: E,
  uploaded_file_id: &str,
  knowledge_base_id: &str,
  purpose: &str,
) -> Result<Option<ProviderFile>, sqlx::Error>
where
  E: Executor<'e, Database = Sqlite>,
{
  sqlx::query_as::<_, ProviderFile>(
    r#"
SELECT * FROM provider_file
WHERE uploaded_file_id = ? AND knowledge_base_id = ? AND purpose = ?
ORDER BY created_at DESC, rowid DESC
LIMIT 1;
    "#,
  )
  .bind(uploaded_file_id)
  .bind(knowledge_base_id)
  .bind(purpose)
  .fetch_optional(executor)
  .await
}

pub async fn update_provider_file_status(
  conn: &mut SqliteConnection,
  id: &str,
  status: &str,
) -> Result<u64, sqlx::Error> {
  let result = sqlx::query(
    r#"
UPDATE provider_file SET status = ? WHERE id = ?;
    "#,
  )
  .bind(status)
  .bind(id)
  .execute(&mut *conn)
  .await?;

  sqlx::query(
    r#"
UPDATE uploaded_file SET provider_status = ? WHERE provider_file_id = ?;
    "#,
  )
  .bind(status)
  .bind(id)
  .execute(&mut *conn)
  .await?;

  Ok(result.rows_affected())
}

pub async fn insert_relation<'e, E>(
  executor: E,
  relation: &FileKnowledgeRelation,
) -> Result<(), sqlx::Error>
where
  E: Executor<'e, Database = Sqlite>,
{
  sqlx::query(
    r#"
INSERT OR IGNORE INTO file_knowledge_relation ( file_id, knowledge_base_id, created_at )
VALUES ( ?, ?, ? );
    "#,
  )
  .bind(&relation.file_id)
  .bind(&relation.knowledge_base_id)
  .bind(relation.created_at)
  .execute(executor)
  .await?;

  Ok(())
}

/// Files attached to a knowledge base directly or through a provider-side file.
pub async fn list_knowledge_base_files<'e, E>(
  executor: E,
  knowledge_base_id: &str,
) -> Result<Vec<KnowledgeBaseFile>, sqlx::Error>
where
  E: Executor<'e, Database = Sqlite>,
{
  sqlx::query_as::<_, KnowledgeBaseFile>(
    r#"
SELECT
  u.file_id, u.filename, u.file_path, u.file_type, u.description, u.upload_time, u.status, u.file_size,
  p.id AS provider_file_id, p.purpose AS provider_purpose, p.status AS provider_status
FROM uploaded_file u
LEFT JOIN provider_file p ON p.uploaded_file_id = u.file_id AND p.knowledge_base_id = ?1
WHERE u.file_id IN (
  SELECT file_id FROM file_knowledge_relation WHERE knowledge_base_id = ?1
  UNION
  SELECT uploaded_file_id FROM provider_file WHERE knowledge_base_id = ?1 AND uploaded_file_id IS NOT NULL
)
ORDER BY u.upload_time DESC, u.file_id;
    "#,
  )
  .bind(knowledge_base_id)
  .fetch_all(executor)
  .await
}

#[cfg(test)]
mod tests {
  use super::*;
  use sqlx::sqlite::SqlitePoolOptions;

  async fn pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .connect("sqlite::memory:")
      .await
      .unwrap();

    migrate(&pool).await.unwrap();

    pool
  }

  fn kb(name: &str, id: &str, owner: &str) -> KnowledgeBase {
    KnowledgeBase {
      id: id.to_string(),
      name: name.to_string(),
      display_name: name.to_uppercase(),
      model_owner: owner.to_string(),
      creator_id: "alice".to_string(),
      created_at: 1,
      ..Default::default()
    }
  }

  fn uploaded(file_id: &str, filename: &str) -> UploadedFile {
    UploadedFile {
      file_id: file_id.to_string(),
      filename: filename.to_string(),
      file_path: format!("alice/2024-01-01/{}", filename),
      file_type: "text/plain".to_string(),
      upload_time: 10,
      status: "uploaded".to_string(),
      username: "alice".to_string(),
      file_size: 42,
      ..Default::default()
    }
  }

  #[tokio::test]
  async fn local_knowledge_bases_are_listed_first() {
    let pool = pool().await;

    insert_knowledge_base(&pool, &kb("b", "vs_1", "stepfun")).await.unwrap();
    insert_knowledge_base(&pool, &kb("a", "z_local", "local")).await.unwrap();
    insert_knowledge_base(&pool, &kb("c", "vs_0", "stepfun")).await.unwrap();

    let names: Vec<String> = list_knowledge_bases(&pool)
      .await
      .unwrap()
      .into_iter()
      .map(|kb| kb.name)
      .collect();

    assert_eq!(names, vec!["a", "c", "b"]);
  }

  #[tokio::test]
  async fn pending_records_can_be_backfilled_and_cleared() {
    let pool = pool().await;

    insert_knowledge_base(&pool, &kb("docs", "", "stepfun")).await.unwrap();
    assert!(get_knowledge_base_by_id(&pool, "").await.unwrap().is_none());

    set_knowledge_base_id(&pool, "docs", "vs_9").await.unwrap();
    let found = get_knowledge_base_by_id(&pool, "vs_9").await.unwrap().unwrap();
    assert_eq!(found.name, "docs");

    set_knowledge_base_id(&pool, "docs", "").await.unwrap();
    let pending = get_knowledge_base_by_name(&pool, "docs").await.unwrap().unwrap();
    assert!(pending.is_pending());
  }

  #[tokio::test]
  async fn provider_file_is_mirrored_on_uploaded_file() {
    let pool = pool().await;

    insert_uploaded_file(&pool, &uploaded("f1", "a.txt")).await.unwrap();

    let mut conn = pool.acquire().await.unwrap();
    insert_provider_file(
      &mut conn,
      &ProviderFile {
        id: "file-abc".to_string(),
        knowledge_base_id: "vs_1".to_string(),
        uploaded_file_id: Some("f1".to_string()),
        purpose: "retrieval".to_string(),
        status: "uploaded".to_string(),
        created_at: 5,
        ..Default::default()
      },
    )
    .await
    .unwrap();
    update_provider_file_status(&mut conn, "file-abc", "processing")
      .await
      .unwrap();
    drop(conn);

    let file = get_user_file(&pool, "f1", "alice").await.unwrap().unwrap();
    assert_eq!(file.provider_file_id.as_deref(), Some("file-abc"));
    assert_eq!(file.provider_vector_store_id.as_deref(), Some("vs_1"));
    assert_eq!(file.provider_status.as_deref(), Some("processing"));

    let provider = find_provider_file(&pool, "f1", "vs_1", "retrieval")
      .await
      .unwrap()
      .unwrap();
    assert_eq!(provider.status, "processing");
  }

  #[tokio::test]
  async fn knowledge_base_files_merge_relations_and_provider_files() {
    let pool = pool().await;

    insert_uploaded_file(&pool, &uploaded("f1", "a.txt")).await.unwrap();
    insert_uploaded_file(&pool, &uploaded("f2", "b.txt")).await.unwrap();
    insert_uploaded_file(&pool, &uploaded("f3", "c.txt")).await.unwrap();

    let relation = FileKnowledgeRelation::new("f1", "vs_1", 1);
    insert_relation(&pool, &relation).await.unwrap();
    insert_relation(&pool, &relation).await.unwrap();

    let mut conn = pool.acquire().await.unwrap();
    insert_provider_file(
      &mut conn,
      &ProviderFile {
        id: "file-b".to_string(),
        knowledge_base_id: "vs_1".to_string(),
        uploaded_file_id: Some("f2".to_string()),
        purpose: "retrieval".to_string(),
        status: "processing".to_string(),
        created_at: 5,
        ..Default::default()
      },
    )
    .await
    .unwrap();
    drop(conn);

    let mut ids: Vec<String> = list_knowledge_base_files(&pool, "vs_1")
      .await
      .unwrap()
      .into_iter()
      .map(|f| f.file_id)
      .collect();
    ids.sort();

    assert_eq!(ids, vec!["f1", "f2"]);
  }

  #[tokio::test]
  async fn dedup_lookup_matches_name_size_and_user() {
    let pool = pool().await;

    insert_uploaded_file(&pool, &uploaded("f1", "a.txt")).await.unwrap();

    assert!(find_uploaded_file(&pool, "a.txt", 42, "alice")
      .await
      .unwrap()
      .is_some());
    assert!(find_uploaded_file(&pool, "a.txt", 43, "alice")
      .await
      .unwrap()
      .is_none());
    assert!(find_uploaded_file(&pool, "a.txt", 42, "bob")
      .await
      .unwrap()
      .is_none());
  }

  #[tokio::test]
  async fn newest_provider_file_wins_on_equal_timestamps() {
    let pool = pool().await;

    insert_uploaded_file(&pool, &uploaded("f1", "a.txt")).await.unwrap();

    let mut conn = pool.acquire().await.unwrap();
    for id in ["file-old", "file-new"] {
      insert_provider_file(
        &mut conn,
        &ProviderFile {
          id: id.to_string(),
          knowledge_base_id: "vs_1".to_string(),
          uploaded_file_id: Some("f1".to_string()),
          purpose: "retrieval".to_string(),
          status: "uploaded".to_string(),
          created_at: 7,
          ..Default::default()
        },
      )
      .await
      .unwrap();
    }
    drop(conn);

    let provider = find_provider_file(&pool, "f1", "vs_1", "retrieval")
      .await
      .unwrap()
      .unwrap();
    assert_eq!(provider.id, "file-new");
  }

  #[tokio::test]
  async fn user_file_lookup_is_scoped_to_the_uploader() {
    let pool = pool().await;

    insert_uploaded_file(&pool, &uploaded("f1", "a.txt")).await.unwrap();

    assert!(get_user_file(&pool, "f1", "alice").await.unwrap().is_some());
    assert!(get_user_file(&pool, "f1", "bob").await.unwrap().is_none());
  }
}
