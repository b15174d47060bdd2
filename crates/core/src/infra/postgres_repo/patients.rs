use tracing::info;

use super::PostgresRepo;
use super::appointments::APPOINTMENT_COLUMNS;
use crate::domain::model::{
  Appointment,
  ERASED_MARKER,
  Erasure,
  NewPatient,
  Patient
};
use crate::ports::repo::{
  PatientRepo,
  RepoError,
  RepoResult
};

const PATIENT_COLUMNS: &str = "id, clinic_id, first_name, last_name, \
   email, phone, created_at_ms, erased_at_ms";

#[async_trait::async_trait]
impl PatientRepo for PostgresRepo {
  async fn create_patient(
    &self,
    clinic_id: i64,
    input: &NewPatient,
    now_ms: i64
  ) -> RepoResult<Patient> {
    let sql = format!(
      "INSERT INTO patients(clinic_id, first_name, last_name, \
       email, phone, created_at_ms) \
       VALUES ($1, $2, $3, $4, $5, $6) \
       RETURNING {PATIENT_COLUMNS}"
    );

    let row = sqlx::query_as::<_, Patient>(&sql)
      .bind(clinic_id)
      .bind(&input.first_name)
      .bind(&input.last_name)
      .bind(input.email.as_deref())
      .bind(input.phone.as_deref())
      .bind(now_ms)
      .fetch_one(&self.pool)
      .await?;

    Ok(row)
  }

  async fn patient(
    &self,
    clinic_id: i64,
    id: i64
  ) -> RepoResult<Patient> {
    let sql = format!(
      "SELECT {PATIENT_COLUMNS} FROM patients \
       WHERE clinic_id = $1 AND id = $2"
    );

    sqlx::query_as::<_, Patient>(&sql)
      .bind(clinic_id)
      .bind(id)
      .fetch_optional(&self.pool)
      .await?
      .ok_or(RepoError::NotFound("patient"))
  }

  async fn list_patients(
    &self,
    clinic_id: i64,
    include_erased: bool
  ) -> RepoResult<Vec<Patient>> {
    let sql = format!(
      "SELECT {PATIENT_COLUMNS} FROM patients \
       WHERE clinic_id = $1 AND ($2 OR erased_at_ms IS NULL) \
       ORDER BY last_name, first_name, id"
    );

    let rows = sqlx::query_as::<_, Patient>(&sql)
      .bind(clinic_id)
      .bind(include_erased)
      .fetch_all(&self.pool)
      .await?;

    Ok(rows)
  }

  async fn count_patients(
    &self,
    clinic_id: i64
  ) -> RepoResult<i64> {
    let n: i64 = sqlx::query_scalar(
      r#"
      SELECT COUNT(*) FROM patients
      WHERE clinic_id = $1 AND erased_at_ms IS NULL
      "#
    )
    .bind(clinic_id)
    .fetch_one(&self.pool)
    .await?;

    Ok(n)
  }

  async fn erase_patient(
    &self,
    clinic_id: i64,
    id: i64,
    now_ms: i64
  ) -> RepoResult<Erasure> {
    let mut tx = self.pool.begin().await?;

    let erased_at: Option<Option<i64>> =
      sqlx::query_scalar(
        "SELECT erased_at_ms FROM patients \
         WHERE clinic_id = $1 AND id = $2"
      )
      .bind(clinic_id)
      .bind(id)
      .fetch_optional(&mut *tx)
      .await?;

    match erased_at {
      | None => {
        return Err(RepoError::NotFound("patient"));
      }
      | Some(Some(_)) => {
        return Err(RepoError::Conflict(
          "patient already erased".to_string()
        ));
      }
      | Some(None) => {}
    }

    let sql = format!(
      "UPDATE patients SET first_name = $3, last_name = $3, \
       email = NULL, phone = NULL, erased_at_ms = $4 \
       WHERE clinic_id = $1 AND id = $2 \
       RETURNING {PATIENT_COLUMNS}"
    );

    let patient = sqlx::query_as::<_, Patient>(&sql)
      .bind(clinic_id)
      .bind(id)
      .bind(ERASED_MARKER)
      .bind(now_ms)
      .fetch_one(&mut *tx)
      .await?;

    sqlx::query(
      "UPDATE appointments SET notes = NULL \
       WHERE clinic_id = $1 AND patient_id = $2"
    )
    .bind(clinic_id)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    let sql = format!(
      "UPDATE appointments SET status = 'cancelled', \
       updated_at_ms = $3 \
       WHERE clinic_id = $1 AND patient_id = $2 \
         AND starts_at_ms >= $3 \
         AND status IN ('scheduled', 'confirmed') \
       RETURNING {APPOINTMENT_COLUMNS}"
    );

    let cancelled = sqlx::query_as::<_, Appointment>(&sql)
      .bind(clinic_id)
      .bind(id)
      .bind(now_ms)
      .fetch_all(&mut *tx)
      .await?;

    tx.commit().await?;

    info!(
      clinic_id,
      patient_id = id,
      cancelled = cancelled.len(),
      "patient erased"
    );

    Ok(Erasure { patient, cancelled })
  }
}
