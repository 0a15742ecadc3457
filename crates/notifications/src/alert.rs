use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use pharmastock_core::UserId;

/// What an alert is about.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AlertKind {
    /// A medicine's on-hand total is below its threshold. Subject: medicine id.
    LowStock,
    /// A stocked batch expires inside the warning window. Subject: batch id.
    Expiring,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::LowStock => "lowStock",
            AlertKind::Expiring => "expiring",
        }
    }
}

impl core::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification request handed to the external dispatcher.
///
/// The dispatcher owns channel delivery (mail, in-app, push) and any rate
/// limiting of its own. Recipients are resolved by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRequest {
    pub alert_id: Uuid,
    pub recipient_ids: Vec<UserId>,
    pub kind: AlertKind,
    pub subject_id: Uuid,
    pub message: String,
    pub data: JsonValue,
    pub raised_at: DateTime<Utc>,
}

impl AlertRequest {
    pub fn new(
        kind: AlertKind,
        subject_id: Uuid,
        recipient_ids: Vec<UserId>,
        message: impl Into<String>,
        data: JsonValue,
        raised_at: DateTime<Utc>,
    ) -> Self {
        Self {
            alert_id: Uuid::now_v7(),
            recipient_ids,
            kind,
            subject_id,
            message: message.into(),
            data,
            raised_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_uses_dispatcher_field_names() {
        let recipient = UserId::new();
        let alert = AlertRequest::new(
            AlertKind::LowStock,
            Uuid::now_v7(),
            vec![recipient],
            "Paracetamol is low",
            json!({ "currentTotal": 3, "threshold": 10 }),
            Utc::now(),
        );

        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["kind"], "lowStock");
        assert_eq!(value["recipientIds"][0], recipient.to_string());
        assert_eq!(value["data"]["threshold"], 10);
        assert!(value.get("subjectId").is_some());
    }
}
