use super::SqliteRepo;
use crate::domain::calendar::CalendarConnection;
use crate::domain::scheduling::{
  BusyBlock,
  TimeWindow
};
use crate::ports::repo::{
  CalendarRepo,
  RepoResult
};

#[async_trait::async_trait]
impl CalendarRepo for SqliteRepo {
  async fn calendar_connection(
    &self,
    clinic_id: i64
  ) -> RepoResult<Option<CalendarConnection>> {
    let row = sqlx::query_as::<_, CalendarConnection>(
      r#"
      SELECT clinic_id, calendar_id, access_token, refresh_token,
             expires_at_ms, last_synced_at_ms
      FROM calendar_connections
      WHERE clinic_id = ?1
      "#
    )
    .bind(clinic_id)
    .fetch_optional(&self.pool)
    .await?;

    Ok(row)
  }

  async fn save_calendar_connection(
    &self,
    connection: &CalendarConnection,
    now_ms: i64
  ) -> RepoResult<()> {
    sqlx::query(
      r#"
      INSERT INTO calendar_connections(
        clinic_id,
        calendar_id,
        access_token,
        refresh_token,
        expires_at_ms,
        last_synced_at_ms,
        connected_at_ms
      ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
      ON CONFLICT(clinic_id)
      DO UPDATE SET
        calendar_id = excluded.calendar_id,
        access_token = excluded.access_token,
        refresh_token = excluded.refresh_token,
        expires_at_ms = excluded.expires_at_ms,
        last_synced_at_ms = excluded.last_synced_at_ms,
        connected_at_ms = excluded.connected_at_ms
      "#
    )
    .bind(connection.clinic_id)
    .bind(&connection.calendar_id)
    .bind(&connection.access_token)
    .bind(connection.refresh_token.as_deref())
    .bind(connection.expires_at_ms)
    .bind(connection.last_synced_at_ms)
    .bind(now_ms)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn update_calendar_tokens(
    &self,
    clinic_id: i64,
    access_token: &str,
    expires_at_ms: i64
  ) -> RepoResult<()> {
    sqlx::query(
      "UPDATE calendar_connections \
       SET access_token = ?2, expires_at_ms = ?3 \
       WHERE clinic_id = ?1"
    )
    .bind(clinic_id)
    .bind(access_token)
    .bind(expires_at_ms)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn delete_calendar_connection(
    &self,
    clinic_id: i64
  ) -> RepoResult<bool> {
    let mut tx = self.pool.begin().await?;

    sqlx::query(
      "DELETE FROM external_busy_blocks WHERE clinic_id = ?1"
    )
    .bind(clinic_id)
    .execute(&mut *tx)
    .await?;

    let res = sqlx::query(
      "DELETE FROM calendar_connections WHERE clinic_id = ?1"
    )
    .bind(clinic_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(res.rows_affected() > 0)
  }

  async fn mark_calendar_synced(
    &self,
    clinic_id: i64,
    now_ms: i64
  ) -> RepoResult<()> {
    sqlx::query(
      "UPDATE calendar_connections SET last_synced_at_ms = ?2 \
       WHERE clinic_id = ?1"
    )
    .bind(clinic_id)
    .bind(now_ms)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn replace_external_blocks(
    &self,
    clinic_id: i64,
    window: TimeWindow,
    blocks: &[BusyBlock]
  ) -> RepoResult<usize> {
    let mut tx = self.pool.begin().await?;

    sqlx::query(
      r#"
      DELETE FROM external_busy_blocks
      WHERE clinic_id = ?1
        AND starts_at_ms < ?3
        AND ends_at_ms > ?2
      "#
    )
    .bind(clinic_id)
    .bind(window.start_ms)
    .bind(window.end_ms)
    .execute(&mut *tx)
    .await?;

    let mut inserted = 0;

    for block in blocks {
      let Some(event_id) =
        block.calendar_event_id.as_deref()
      else {
        continue;
      };

      sqlx::query(
        r#"
        INSERT INTO external_busy_blocks(
          clinic_id, calendar_event_id, starts_at_ms, ends_at_ms
        ) VALUES (?1, ?2, ?3, ?4)
        "#
      )
      .bind(clinic_id)
      .bind(event_id)
      .bind(block.window.start_ms)
      .bind(block.window.end_ms)
      .execute(&mut *tx)
      .await?;

      inserted += 1;
    }

    tx.commit().await?;

    Ok(inserted)
  }
}
