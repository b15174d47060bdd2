use sqlx::{
  QueryBuilder,
  Sqlite
};

use super::SqliteRepo;
use crate::domain::audit::{
  AuditEvent,
  AuditEventRow,
  AuditFilter,
  AuditPage,
  ConsentInput,
  ConsentRecord,
  NewAuditEvent
};
use crate::ports::repo::{
  AuditRepo,
  RepoResult
};

const EVENT_COLUMNS: &str = "id, clinic_id, actor_user_id, action, \
   entity_type, entity_id, patient_id, metadata, ip_address, \
   user_agent, created_at_ms";

const CONSENT_COLUMNS: &str = "id, clinic_id, patient_id, kind, granted, \
   recorded_at_ms, recorded_by";

fn push_filters(
  qb: &mut QueryBuilder<'_, Sqlite>,
  clinic_id: i64,
  filter: &AuditFilter
) {
  qb.push(" WHERE clinic_id = ")
    .push_bind(clinic_id);

  if let Some(entity_type) = &filter.entity_type {
    qb.push(" AND entity_type = ")
      .push_bind(entity_type.clone());
  }

  if let Some(entity_id) = &filter.entity_id {
    qb.push(" AND entity_id = ")
      .push_bind(entity_id.clone());
  }

  if let Some(actor) = filter.actor_user_id {
    qb.push(" AND actor_user_id = ")
      .push_bind(actor);
  }

  if let Some(action) = filter.action {
    qb.push(" AND action = ")
      .push_bind(action.as_str());
  }

  if let Some(patient) = filter.patient_id {
    qb.push(" AND patient_id = ")
      .push_bind(patient);
  }

  if let Some(from) = filter.from_ms {
    qb.push(" AND created_at_ms >= ")
      .push_bind(from);
  }

  if let Some(to) = filter.to_ms {
    qb.push(" AND created_at_ms < ")
      .push_bind(to);
  }
}

#[async_trait::async_trait]
impl AuditRepo for SqliteRepo {
  async fn insert_audit_event(
    &self,
    event: &NewAuditEvent
  ) -> RepoResult<i64> {
    let id: i64 = sqlx::query_scalar(
      r#"
      INSERT INTO audit_events(
        clinic_id,
        actor_user_id,
        action,
        entity_type,
        entity_id,
        patient_id,
        metadata,
        ip_address,
        user_agent,
        created_at_ms
      ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
      RETURNING id
      "#
    )
    .bind(event.clinic_id)
    .bind(event.actor_user_id)
    .bind(event.action.as_str())
    .bind(&event.entity_type)
    .bind(event.entity_id.as_deref())
    .bind(event.patient_id)
    .bind(event.metadata.to_string())
    .bind(event.ip_address.as_deref())
    .bind(event.user_agent.as_deref())
    .bind(event.created_at_ms)
    .fetch_one(&self.pool)
    .await?;

    Ok(id)
  }

  async fn list_audit_events(
    &self,
    clinic_id: i64,
    filter: &AuditFilter
  ) -> RepoResult<AuditPage> {
    let (limit, offset) = filter.page();

    let mut count = QueryBuilder::<Sqlite>::new(
      "SELECT COUNT(*) FROM audit_events"
    );

    push_filters(&mut count, clinic_id, filter);

    let total: i64 = count
      .build_query_scalar()
      .fetch_one(&self.pool)
      .await?;

    let mut select = QueryBuilder::<Sqlite>::new(
      format!("SELECT {EVENT_COLUMNS} FROM audit_events")
    );

    push_filters(&mut select, clinic_id, filter);

    select
      .push(" ORDER BY created_at_ms DESC, id DESC LIMIT ")
      .push_bind(limit)
      .push(" OFFSET ")
      .push_bind(offset);

    let rows: Vec<AuditEventRow> = select
      .build_query_as()
      .fetch_all(&self.pool)
      .await?;

    Ok(AuditPage {
      events: rows
        .into_iter()
        .map(AuditEvent::from)
        .collect(),
      total,
      limit,
      offset
    })
  }

  async fn entity_history(
    &self,
    clinic_id: i64,
    entity_type: &str,
    entity_id: &str
  ) -> RepoResult<Vec<AuditEvent>> {
    let sql = format!(
      "SELECT {EVENT_COLUMNS} FROM audit_events \
       WHERE clinic_id = ?1 AND entity_type = ?2 AND entity_id = ?3 \
       ORDER BY created_at_ms, id"
    );

    let rows = sqlx::query_as::<_, AuditEventRow>(&sql)
      .bind(clinic_id)
      .bind(entity_type)
      .bind(entity_id)
      .fetch_all(&self.pool)
      .await?;

    Ok(rows.into_iter().map(AuditEvent::from).collect())
  }

  async fn patient_events(
    &self,
    clinic_id: i64,
    patient_id: i64
  ) -> RepoResult<Vec<AuditEvent>> {
    let sql = format!(
      "SELECT {EVENT_COLUMNS} FROM audit_events \
       WHERE clinic_id = ?1 AND patient_id = ?2 \
       ORDER BY created_at_ms, id"
    );

    let rows = sqlx::query_as::<_, AuditEventRow>(&sql)
      .bind(clinic_id)
      .bind(patient_id)
      .fetch_all(&self.pool)
      .await?;

    Ok(rows.into_iter().map(AuditEvent::from).collect())
  }

  async fn purge_audit_events(
    &self,
    clinic_id: i64,
    before_ms: i64
  ) -> RepoResult<u64> {
    let res = sqlx::query(
      "DELETE FROM audit_events \
       WHERE clinic_id = ?1 AND created_at_ms < ?2"
    )
    .bind(clinic_id)
    .bind(before_ms)
    .execute(&self.pool)
    .await?;

    Ok(res.rows_affected())
  }

  async fn record_consent(
    &self,
    clinic_id: i64,
    patient_id: i64,
    input: &ConsentInput,
    recorded_by: Option<i64>,
    now_ms: i64
  ) -> RepoResult<ConsentRecord> {
    let sql = format!(
      "INSERT INTO consents(clinic_id, patient_id, kind, granted, \
       recorded_at_ms, recorded_by) \
       VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
       RETURNING {CONSENT_COLUMNS}"
    );

    let row = sqlx::query_as::<_, ConsentRecord>(&sql)
      .bind(clinic_id)
      .bind(patient_id)
      .bind(input.kind.as_str())
      .bind(input.granted)
      .bind(now_ms)
      .bind(recorded_by)
      .fetch_one(&self.pool)
      .await?;

    Ok(row)
  }

  async fn consents(
    &self,
    clinic_id: i64,
    patient_id: i64
  ) -> RepoResult<Vec<ConsentRecord>> {
    let sql = format!(
      "SELECT {CONSENT_COLUMNS} FROM consents \
       WHERE clinic_id = ?1 AND patient_id = ?2 \
       ORDER BY recorded_at_ms, id"
    );

    let rows = sqlx::query_as::<_, ConsentRecord>(&sql)
      .bind(clinic_id)
      .bind(patient_id)
      .fetch_all(&self.pool)
      .await?;

    Ok(rows)
  }
}
