use super::SqliteRepo;
use crate::domain::model::{
  Appointment,
  AppointmentStatus,
  AppointmentUpdate,
  NewAppointment
};
use crate::domain::scheduling::{
  BusyBlock,
  TimeWindow
};
use crate::ports::repo::{
  AppointmentRepo,
  RepoError,
  RepoResult
};

pub(super) const APPOINTMENT_COLUMNS: &str = "id, clinic_id, patient_id, \
   provider_id, service_id, starts_at_ms, ends_at_ms, status, notes, \
   google_event_id, created_at_ms, updated_at_ms";

#[async_trait::async_trait]
impl AppointmentRepo for SqliteRepo {
  async fn create_appointment(
    &self,
    input: &NewAppointment
  ) -> RepoResult<Appointment> {
    let sql = format!(
      "INSERT INTO appointments(clinic_id, patient_id, provider_id, \
       service_id, starts_at_ms, ends_at_ms, status, notes, \
       created_at_ms, updated_at_ms) \
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9) \
       RETURNING {APPOINTMENT_COLUMNS}"
    );

    let row = sqlx::query_as::<_, Appointment>(&sql)
      .bind(input.clinic_id)
      .bind(input.patient_id)
      .bind(input.provider_id)
      .bind(input.service_id)
      .bind(input.starts_at_ms)
      .bind(input.ends_at_ms)
      .bind(AppointmentStatus::Scheduled.as_str())
      .bind(input.notes.as_deref())
      .bind(input.created_at_ms)
      .fetch_one(&self.pool)
      .await?;

    Ok(row)
  }

  async fn appointment(
    &self,
    clinic_id: i64,
    id: i64
  ) -> RepoResult<Appointment> {
    let sql = format!(
      "SELECT {APPOINTMENT_COLUMNS} FROM appointments \
       WHERE clinic_id = ?1 AND id = ?2"
    );

    sqlx::query_as::<_, Appointment>(&sql)
      .bind(clinic_id)
      .bind(id)
      .fetch_optional(&self.pool)
      .await?
      .ok_or(RepoError::NotFound("appointment"))
  }

  async fn list_appointments(
    &self,
    clinic_id: i64,
    window: TimeWindow,
    provider_id: Option<i64>
  ) -> RepoResult<Vec<Appointment>> {
    let sql = format!(
      "SELECT {APPOINTMENT_COLUMNS} FROM appointments \
       WHERE clinic_id = ?1 \
         AND starts_at_ms < ?3 AND ends_at_ms > ?2 \
         AND (?4 IS NULL OR provider_id = ?4) \
       ORDER BY starts_at_ms, id"
    );

    let rows = sqlx::query_as::<_, Appointment>(&sql)
      .bind(clinic_id)
      .bind(window.start_ms)
      .bind(window.end_ms)
      .bind(provider_id)
      .fetch_all(&self.pool)
      .await?;

    Ok(rows)
  }

  async fn update_appointment(
    &self,
    clinic_id: i64,
    id: i64,
    update: &AppointmentUpdate
  ) -> RepoResult<Appointment> {
    let sql = format!(
      "UPDATE appointments SET starts_at_ms = ?3, ends_at_ms = ?4, \
       status = ?5, notes = ?6, updated_at_ms = ?7 \
       WHERE clinic_id = ?1 AND id = ?2 \
       RETURNING {APPOINTMENT_COLUMNS}"
    );

    sqlx::query_as::<_, Appointment>(&sql)
      .bind(clinic_id)
      .bind(id)
      .bind(update.starts_at_ms)
      .bind(update.ends_at_ms)
      .bind(update.status.as_str())
      .bind(update.notes.as_deref())
      .bind(update.updated_at_ms)
      .fetch_optional(&self.pool)
      .await?
      .ok_or(RepoError::NotFound("appointment"))
  }

  async fn busy_blocks(
    &self,
    clinic_id: i64,
    provider_id: i64,
    window: TimeWindow,
    exclude_appointment_id: Option<i64>
  ) -> RepoResult<Vec<BusyBlock>> {
    let booked: Vec<(i64, i64, i64)> = sqlx::query_as(
      r#"
      SELECT id, starts_at_ms, ends_at_ms
      FROM appointments
      WHERE clinic_id = ?1
        AND provider_id = ?2
        AND status <> 'cancelled'
        AND starts_at_ms < ?4
        AND ends_at_ms > ?3
        AND (?5 IS NULL OR id <> ?5)
      ORDER BY starts_at_ms
      "#
    )
    .bind(clinic_id)
    .bind(provider_id)
    .bind(window.start_ms)
    .bind(window.end_ms)
    .bind(exclude_appointment_id)
    .fetch_all(&self.pool)
    .await?;

    let external: Vec<(String, i64, i64)> =
      sqlx::query_as(
        r#"
        SELECT calendar_event_id, starts_at_ms, ends_at_ms
        FROM external_busy_blocks
        WHERE clinic_id = ?1
          AND starts_at_ms < ?3
          AND ends_at_ms > ?2
        ORDER BY starts_at_ms
        "#
      )
      .bind(clinic_id)
      .bind(window.start_ms)
      .bind(window.end_ms)
      .fetch_all(&self.pool)
      .await?;

    let mut blocks: Vec<BusyBlock> = booked
      .into_iter()
      .map(|(id, start, end)| {
        BusyBlock::appointment(
          id,
          TimeWindow::new(start, end)
        )
      })
      .collect();

    blocks.extend(external.into_iter().map(
      |(event_id, start, end)| {
        BusyBlock::external(
          event_id,
          TimeWindow::new(start, end)
        )
      }
    ));

    Ok(blocks)
  }

  async fn set_google_event_id(
    &self,
    clinic_id: i64,
    id: i64,
    event_id: Option<&str>
  ) -> RepoResult<()> {
    sqlx::query(
      "UPDATE appointments SET google_event_id = ?3 \
       WHERE clinic_id = ?1 AND id = ?2"
    )
    .bind(clinic_id)
    .bind(id)
    .bind(event_id)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn unsynced_appointments(
    &self,
    clinic_id: i64,
    window: TimeWindow
  ) -> RepoResult<Vec<Appointment>> {
    let sql = format!(
      "SELECT {APPOINTMENT_COLUMNS} FROM appointments \
       WHERE clinic_id = ?1 \
         AND google_event_id IS NULL \
         AND status <> 'cancelled' \
         AND starts_at_ms >= ?2 AND starts_at_ms < ?3 \
       ORDER BY starts_at_ms, id"
    );

    let rows = sqlx::query_as::<_, Appointment>(&sql)
      .bind(clinic_id)
      .bind(window.start_ms)
      .bind(window.end_ms)
      .fetch_all(&self.pool)
      .await?;

    Ok(rows)
  }
}
