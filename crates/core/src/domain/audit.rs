//! GDPR audit trail and consent records.

use std::str::FromStr;

use serde::{
  Deserialize,
  Serialize
};
use serde_json::Value;

use crate::domain::model::{
  ParseEnumError,
  Patient
};
use crate::domain::scheduling::DAY_MS;

pub const DEFAULT_PAGE_LIMIT: i64 = 50;
pub const MAX_PAGE_LIMIT: i64 = 500;
pub const MIN_RETENTION_DAYS: i64 = 30;
pub const MAX_RETENTION_DAYS: i64 = 36_500;
pub const REDACTED: &str = "[REDACTED]";

/// Keys whose values never reach the
/// audit table.
const SENSITIVE_KEYS: &[&str] = &[
  "password",
  "token",
  "secret",
  "access_token",
  "refresh_token",
  "email",
  "phone",
  "ssn",
  "national_id",
  "notes",
  "address"
];

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "snake_case")]

pub enum AuditAction {
  Create,
  Read,
  Update,
  Delete,
  Export,
  Erase,
  ConsentGranted,
  ConsentRevoked,
  Sync,
  Purge
}

impl AuditAction {
  pub fn as_str(self) -> &'static str {
    match self {
      | Self::Create => "create",
      | Self::Read => "read",
      | Self::Update => "update",
      | Self::Delete => "delete",
      | Self::Export => "export",
      | Self::Erase => "erase",
      | Self::ConsentGranted => {
        "consent_granted"
      }
      | Self::ConsentRevoked => {
        "consent_revoked"
      }
      | Self::Sync => "sync",
      | Self::Purge => "purge"
    }
  }
}

impl FromStr for AuditAction {
  type Err = ParseEnumError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s.trim() {
      | "create" => Ok(Self::Create),
      | "read" => Ok(Self::Read),
      | "update" => Ok(Self::Update),
      | "delete" => Ok(Self::Delete),
      | "export" => Ok(Self::Export),
      | "erase" => Ok(Self::Erase),
      | "consent_granted" => {
        Ok(Self::ConsentGranted)
      }
      | "consent_revoked" => {
        Ok(Self::ConsentRevoked)
      }
      | "sync" => Ok(Self::Sync),
      | "purge" => Ok(Self::Purge),
      | other => {
        Err(ParseEnumError::new(
          "audit action",
          other
        ))
      }
    }
  }
}

impl TryFrom<String> for AuditAction {
  type Error = ParseEnumError;

  fn try_from(
    value: String
  ) -> Result<Self, Self::Error> {
    value.parse()
  }
}

/// Caller details captured from the
/// request.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]

pub struct RequestMeta {
  pub ip_address: Option<String>,
  pub user_agent: Option<String>
}

#[derive(Debug, Clone)]

pub struct NewAuditEvent {
  pub clinic_id:     i64,
  pub actor_user_id: Option<i64>,
  pub action:        AuditAction,
  pub entity_type:   String,
  pub entity_id:     Option<String>,
  pub patient_id:    Option<i64>,
  pub metadata:      Value,
  pub ip_address:    Option<String>,
  pub user_agent:    Option<String>,
  pub created_at_ms: i64
}

impl NewAuditEvent {
  pub fn new(
    clinic_id: i64,
    actor_user_id: Option<i64>,
    action: AuditAction,
    entity_type: impl Into<String>,
    created_at_ms: i64
  ) -> Self {
    Self {
      clinic_id,
      actor_user_id,
      action,
      entity_type: entity_type.into(),
      entity_id: None,
      patient_id: None,
      metadata: Value::Object(
        Default::default()
      ),
      ip_address: None,
      user_agent: None,
      created_at_ms
    }
  }

  pub fn entity(
    mut self,
    id: impl ToString
  ) -> Self {
    self.entity_id = Some(id.to_string());
    self
  }

  pub fn patient(
    mut self,
    patient_id: i64
  ) -> Self {
    self.patient_id = Some(patient_id);
    self
  }

  pub fn metadata(
    mut self,
    metadata: Value
  ) -> Self {
    self.metadata = metadata;
    self
  }

  pub fn request(
    mut self,
    meta: &RequestMeta
  ) -> Self {
    self.ip_address =
      meta.ip_address.clone();
    self.user_agent =
      meta.user_agent.clone();
    self
  }

  /// Applies [`redact`] to the metadata.
  pub fn redacted(mut self) -> Self {
    self.metadata = redact(&self.metadata);
    self
  }
}

#[derive(Debug, Clone, Serialize)]

pub struct AuditEvent {
  pub id:            i64,
  pub clinic_id:     i64,
  pub actor_user_id: Option<i64>,
  pub action:        AuditAction,
  pub entity_type:   String,
  pub entity_id:     Option<String>,
  pub patient_id:    Option<i64>,
  pub metadata:      Value,
  pub ip_address:    Option<String>,
  pub user_agent:    Option<String>,
  pub created_at_ms: i64
}

/// Stored shape; metadata is JSON text.
#[derive(Debug, Clone, sqlx::FromRow)]

pub struct AuditEventRow {
  pub id:            i64,
  pub clinic_id:     i64,
  pub actor_user_id: Option<i64>,
  #[sqlx(try_from = "String")]
  pub action:        AuditAction,
  pub entity_type:   String,
  pub entity_id:     Option<String>,
  pub patient_id:    Option<i64>,
  pub metadata:      String,
  pub ip_address:    Option<String>,
  pub user_agent:    Option<String>,
  pub created_at_ms: i64
}

impl From<AuditEventRow> for AuditEvent {
  fn from(row: AuditEventRow) -> Self {
    let metadata =
      serde_json::from_str(&row.metadata)
        .unwrap_or(Value::String(
          row.metadata
        ));

    Self {
      id: row.id,
      clinic_id: row.clinic_id,
      actor_user_id: row.actor_user_id,
      action: row.action,
      entity_type: row.entity_type,
      entity_id: row.entity_id,
      patient_id: row.patient_id,
      metadata,
      ip_address: row.ip_address,
      user_agent: row.user_agent,
      created_at_ms: row.created_at_ms
    }
  }
}

#[derive(
  Debug, Clone, Default, Deserialize,
)]

pub struct AuditFilter {
  pub entity_type:   Option<String>,
  pub entity_id:     Option<String>,
  pub actor_user_id: Option<i64>,
  pub action:        Option<AuditAction>,
  pub patient_id:    Option<i64>,
  pub from_ms:       Option<i64>,
  pub to_ms:         Option<i64>,
  pub limit:         Option<i64>,
  pub offset:        Option<i64>
}

impl AuditFilter {
  /// `(limit, offset)` after clamping.
  pub fn page(&self) -> (i64, i64) {
    let limit = self
      .limit
      .unwrap_or(DEFAULT_PAGE_LIMIT)
      .clamp(1, MAX_PAGE_LIMIT);

    let offset =
      self.offset.unwrap_or(0).max(0);

    (limit, offset)
  }
}

#[derive(Debug, Clone, Serialize)]

pub struct AuditPage {
  pub events: Vec<AuditEvent>,
  pub total:  i64,
  pub limit:  i64,
  pub offset: i64
}

fn is_sensitive(key: &str) -> bool {
  let lower = key.to_lowercase();

  SENSITIVE_KEYS.iter().any(|k| {
    lower == *k
      || lower.ends_with(&format!("_{k}"))
  })
}

/// Replaces the values of sensitive keys
/// at any depth.
pub fn redact(value: &Value) -> Value {
  match value {
    | Value::Object(map) => {
      Value::Object(
        map
          .iter()
          .map(|(k, v)| {
            if is_sensitive(k) {
              (
                k.clone(),
                Value::String(
                  REDACTED.to_string()
                )
              )
            } else {
              (k.clone(), redact(v))
            }
          })
          .collect()
      )
    }
    | Value::Array(items) => {
      Value::Array(
        items.iter().map(redact).collect()
      )
    }
    | other => other.clone()
  }
}

/// Events created before the returned
/// instant fall outside retention.
pub fn retention_cutoff(
  now_ms: i64,
  retention_days: i64
) -> Option<i64> {
  if !(MIN_RETENTION_DAYS..=MAX_RETENTION_DAYS)
    .contains(&retention_days)
  {
    return None;
  }

  now_ms.checked_sub(retention_days * DAY_MS)
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "snake_case")]

pub enum ConsentKind {
  Treatment,
  DataProcessing,
  Marketing,
  Communications
}

impl ConsentKind {
  pub fn as_str(self) -> &'static str {
    match self {
      | Self::Treatment => "treatment",
      | Self::DataProcessing => {
        "data_processing"
      }
      | Self::Marketing => "marketing",
      | Self::Communications => {
        "communications"
      }
    }
  }
}

impl FromStr for ConsentKind {
  type Err = ParseEnumError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s.trim() {
      | "treatment" => Ok(Self::Treatment),
      | "data_processing" => {
        Ok(Self::DataProcessing)
      }
      | "marketing" => Ok(Self::Marketing),
      | "communications" => {
        Ok(Self::Communications)
      }
      | other => {
        Err(ParseEnumError::new(
          "consent kind",
          other
        ))
      }
    }
  }
}

impl TryFrom<String> for ConsentKind {
  type Error = ParseEnumError;

  fn try_from(
    value: String
  ) -> Result<Self, Self::Error> {
    value.parse()
  }
}

#[derive(
  Debug, Clone, Serialize, sqlx::FromRow,
)]

pub struct ConsentRecord {
  pub id:             i64,
  pub clinic_id:      i64,
  pub patient_id:     i64,
  #[sqlx(try_from = "String")]
  pub kind:           ConsentKind,
  pub granted:        bool,
  pub recorded_at_ms: i64,
  pub recorded_by:    Option<i64>
}

#[derive(
  Debug, Clone, Copy, Deserialize,
)]

pub struct ConsentInput {
  pub kind:    ConsentKind,
  pub granted: bool
}

impl ConsentInput {
  pub fn audit_action(&self) -> AuditAction {
    if self.granted {
      AuditAction::ConsentGranted
    } else {
      AuditAction::ConsentRevoked
    }
  }
}

/// Latest record per kind. Input order
/// does not matter; ties on timestamp go
/// to the higher id.
pub fn current_consents(
  records: &[ConsentRecord]
) -> Vec<ConsentRecord> {
  let mut latest: Vec<ConsentRecord> =
    Vec::new();

  for record in records {
    match latest
      .iter_mut()
      .find(|r| r.kind == record.kind)
    {
      | Some(existing) => {
        if (
          record.recorded_at_ms,
          record.id
        ) > (
          existing.recorded_at_ms,
          existing.id
        ) {
          *existing = record.clone();
        }
      }
      | None => latest.push(record.clone())
    }
  }

  latest.sort_by_key(|r| r.kind.as_str());
  latest
}

/// Everything the clinic holds about one
/// patient (right of access).
#[derive(Debug, Clone, Serialize)]

pub struct AccessReport {
  pub patient:         Patient,
  pub consents:        Vec<ConsentRecord>,
  pub consent_history: Vec<ConsentRecord>,
  pub events:          Vec<AuditEvent>,
  pub generated_at_ms: i64
}
