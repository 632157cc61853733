use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_database::{validate_key, RealtimeClient, StoreError};

use crate::models::{Appointment, ExceptionKind, ScheduleFilter, ScheduleRule};
use crate::services::names::NameSource;

pub const RULES_COLLECTION: &str = "scheduleRules";
pub const APPOINTMENTS_COLLECTION: &str = "appointments";
pub const USERS_COLLECTION: &str = "users";

/// Persistence seam for rules and appointments.
///
/// Reads are snapshots; no read-your-writes guarantee is assumed.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn rules_for(&self, filter: &ScheduleFilter, auth_token: &str) -> Result<Vec<ScheduleRule>, StoreError>;

    async fn appointments_for(&self, filter: &ScheduleFilter, auth_token: &str) -> Result<Vec<Appointment>, StoreError>;

    async fn appointment(&self, appointment_id: &str, auth_token: &str) -> Result<Option<Appointment>, StoreError>;

    async fn rule(&self, rule_id: &str, auth_token: &str) -> Result<Option<ScheduleRule>, StoreError>;

    async fn set_exception(
        &self,
        rule_id: &str,
        kind: ExceptionKind,
        key: &str,
        auth_token: &str,
    ) -> Result<(), StoreError>;

    async fn update_appointment(&self, appointment_id: &str, fields: Value, auth_token: &str) -> Result<(), StoreError>;

    async fn push_appointment(&self, record: Value, auth_token: &str) -> Result<String, StoreError>;

    async fn push_rule(&self, record: Value, auth_token: &str) -> Result<String, StoreError>;
}

pub struct RealtimeScheduleStore {
    client: Arc<RealtimeClient>,
}

impl RealtimeScheduleStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Arc::new(RealtimeClient::new(config)),
        }
    }

    pub fn with_client(client: Arc<RealtimeClient>) -> Self {
        Self { client }
    }
}

/// Decodes children one by one so a single bad record does not hide the rest.
fn decode_children<T, F>(collection: &str, children: HashMap<String, Value>, mut assign_id: F) -> Vec<T>
where
    T: DeserializeOwned,
    F: FnMut(&mut T, String),
{
    let mut decoded = Vec::with_capacity(children.len());
    for (key, value) in children {
        match serde_json::from_value::<T>(value) {
            Ok(mut record) => {
                assign_id(&mut record, key);
                decoded.push(record);
            }
            Err(e) => warn!("Skipping malformed {} record {}: {}", collection, key, e),
        }
    }
    decoded
}

#[async_trait]
impl ScheduleStore for RealtimeScheduleStore {
    async fn rules_for(&self, filter: &ScheduleFilter, auth_token: &str) -> Result<Vec<ScheduleRule>, StoreError> {
        let children = self
            .client
            .query_equal_to(RULES_COLLECTION, filter.field(), filter.id(), Some(auth_token))
            .await?;
        debug!("Fetched {} schedule rules for {:?}", children.len(), filter);

        Ok(decode_children(RULES_COLLECTION, children, |rule: &mut ScheduleRule, key| {
            rule.id = key
        }))
    }

    async fn appointments_for(&self, filter: &ScheduleFilter, auth_token: &str) -> Result<Vec<Appointment>, StoreError> {
        let children = self
            .client
            .query_equal_to(APPOINTMENTS_COLLECTION, filter.field(), filter.id(), Some(auth_token))
            .await?;
        debug!("Fetched {} appointments for {:?}", children.len(), filter);

        Ok(decode_children(APPOINTMENTS_COLLECTION, children, |appointment: &mut Appointment, key| {
            appointment.id = key
        }))
    }

    async fn appointment(&self, appointment_id: &str, auth_token: &str) -> Result<Option<Appointment>, StoreError> {
        let path = format!("{}/{}", APPOINTMENTS_COLLECTION, validate_key(appointment_id)?);
        let appointment = self.client.get::<Appointment>(&path, Some(auth_token)).await?;

        Ok(appointment.map(|mut appointment| {
            appointment.id = appointment_id.to_string();
            appointment
        }))
    }

    async fn rule(&self, rule_id: &str, auth_token: &str) -> Result<Option<ScheduleRule>, StoreError> {
        let path = format!("{}/{}", RULES_COLLECTION, validate_key(rule_id)?);
        let rule = self.client.get::<ScheduleRule>(&path, Some(auth_token)).await?;

        Ok(rule.map(|mut rule| {
            rule.id = rule_id.to_string();
            rule
        }))
    }

    async fn set_exception(
        &self,
        rule_id: &str,
        kind: ExceptionKind,
        key: &str,
        auth_token: &str,
    ) -> Result<(), StoreError> {
        let path = format!(
            "{}/{}/exceptions/{}/{}",
            RULES_COLLECTION,
            validate_key(rule_id)?,
            kind.as_str(),
            validate_key(key)?
        );
        self.client.set(&path, json!(true), Some(auth_token)).await
    }

    async fn update_appointment(&self, appointment_id: &str, fields: Value, auth_token: &str) -> Result<(), StoreError> {
        let path = format!("{}/{}", APPOINTMENTS_COLLECTION, validate_key(appointment_id)?);
        self.client.update(&path, fields, Some(auth_token)).await
    }

    async fn push_appointment(&self, record: Value, auth_token: &str) -> Result<String, StoreError> {
        self.client.push(APPOINTMENTS_COLLECTION, record, Some(auth_token)).await
    }

    async fn push_rule(&self, record: Value, auth_token: &str) -> Result<String, StoreError> {
        self.client.push(RULES_COLLECTION, record, Some(auth_token)).await
    }
}

#[async_trait]
impl NameSource for RealtimeScheduleStore {
    async fn fetch_display_name(&self, user_id: &str, auth_token: &str) -> anyhow::Result<Option<String>> {
        let path = format!("{}/{}", USERS_COLLECTION, validate_key(user_id)?);
        let profile = self.client.get::<Value>(&path, Some(auth_token)).await?;

        Ok(profile.and_then(|profile| {
            ["name", "displayName", "fullName"]
                .iter()
                .find_map(|field| profile[*field].as_str().map(str::to_string))
        }))
    }
}
