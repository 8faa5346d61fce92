//! Webhook payload parsing, signature verification, and event classification.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// The only webhook event this service acts on.
pub const PROJECTS_V2_ITEM_EVENT: &str = "projects_v2_item";

/// Verify a GitHub webhook signature using HMAC-SHA256.
///
/// # Arguments
/// * `body` - Raw webhook body bytes
/// * `signature` - Signature from the `X-Hub-Signature-256` header, in the
///   form `sha256=<hex>`
/// * `secret` - Webhook signing secret
///
/// # Returns
/// `true` if signature is valid, `false` otherwise
#[must_use]
pub fn verify_webhook_signature(body: &[u8], signature: &str, secret: &str) -> bool {
    let Some(hex_signature) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let Ok(signature_bytes) = hex::decode(hex_signature) else {
        return false;
    };

    // Compute HMAC-SHA256
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let computed = mac.finalize().into_bytes();

    // Constant-time comparison to prevent timing attacks
    computed.as_slice().ct_eq(&signature_bytes).into()
}

/// Webhook action type
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookAction {
    /// Project item field edited
    Edited,
    /// Project item created
    Created,
    /// Project item deleted
    Deleted,
    /// Project item archived
    Archived,
    /// Project item restored
    Restored,
    /// Project item reordered
    Reordered,
    /// Unknown action (catch-all to avoid parse failures)
    #[serde(other)]
    Unknown,
}

/// Organization that owns the project.
#[derive(Debug, Clone, Deserialize)]
pub struct Organization {
    /// Organization login name
    pub login: String,
}

/// GitHub App installation reference.
#[derive(Debug, Clone, Deserialize)]
pub struct Installation {
    /// Installation ID
    pub id: i64,
}

/// The project item the event refers to.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectsV2Item {
    /// Numeric item ID within the project
    pub id: i64,
}

/// Field-value change carried by an `edited` action.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldValueChange {
    /// Field type (`date`, `single_select`, `text`, ...)
    #[serde(default)]
    pub field_type: Option<String>,
    /// Field display name
    #[serde(default)]
    pub field_name: Option<String>,
    /// Project number the item belongs to
    #[serde(default)]
    pub project_number: Option<i64>,
    /// New field value. Shape depends on `field_type`: a string for date
    /// fields, an object with `name` for single-select fields.
    #[serde(default)]
    pub to: Option<Value>,
}

/// `changes` envelope of an `edited` webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct Changes {
    /// The changed field value
    #[serde(default)]
    pub field_value: Option<FieldValueChange>,
}

/// GitHub Projects V2 item webhook payload (simplified).
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectsV2ItemEvent {
    /// Action type
    pub action: WebhookAction,
    /// Organization that owns the project
    #[serde(default)]
    pub organization: Option<Organization>,
    /// Changed field
    #[serde(default)]
    pub changes: Option<Changes>,
    /// The project item
    #[serde(default)]
    pub projects_v2_item: Option<ProjectsV2Item>,
    /// App installation the event was delivered for
    #[serde(default)]
    pub installation: Option<Installation>,
}

/// Synchronization action derived from a classified webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// "Target date" changed to a value: create or update the mapped task.
    DueDate {
        /// New due date as delivered by GitHub (`YYYY-MM-DD` or RFC 3339)
        due: String,
    },
    /// "Status" changed to "Done": complete the mapped task.
    Complete,
}

/// An actionable event with the identifiers the orchestrator needs.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    /// Organization login
    pub org: String,
    /// Project number
    pub project_number: i64,
    /// Project item ID
    pub item_id: i64,
    /// GitHub App installation ID
    pub installation_id: i64,
    /// What to do with the mapped task
    pub action: SyncAction,
}

/// Classification result for one webhook delivery.
#[derive(Debug, Clone)]
pub enum Classification {
    /// Event carries sync semantics; run the orchestrator.
    Sync(SyncRequest),
    /// Event is intentionally ignored; acknowledge with 200 so GitHub does
    /// not retry the delivery.
    Skip(&'static str),
    /// Event is malformed or of the wrong type; reject with 400.
    Invalid(&'static str),
}

/// Classify a webhook delivery.
///
/// Two-stage filter: envelope level (event type, action), then field level.
/// GitHub sends every field edit through the same endpoint; only the
/// "Target date" and "Status" transitions carry sync semantics.
#[must_use]
pub fn classify(event_type: &str, event: &ProjectsV2ItemEvent) -> Classification {
    if event_type != PROJECTS_V2_ITEM_EVENT {
        return Classification::Invalid("unsupported event type");
    }

    if event.action != WebhookAction::Edited {
        return Classification::Skip("action not edited");
    }

    let Some(change) = event.changes.as_ref().and_then(|c| c.field_value.as_ref()) else {
        return Classification::Skip("no field change");
    };

    let field_type = change.field_type.as_deref().unwrap_or_default();
    let field_name = change.field_name.as_deref().unwrap_or_default();

    let action = match (field_type, field_name) {
        ("date", "Target date") => match change.to.as_ref().and_then(Value::as_str) {
            Some(due) => SyncAction::DueDate {
                due: due.to_string(),
            },
            // Clearing the target date does not retract the task.
            None => return Classification::Skip("date removed"),
        },
        ("single_select", "Status") => {
            let option_name = change
                .to
                .as_ref()
                .and_then(|to| to.get("name"))
                .and_then(Value::as_str);
            if option_name == Some("Done") {
                SyncAction::Complete
            } else {
                return Classification::Skip("status not Done");
            }
        }
        _ => return Classification::Skip("field not tracked"),
    };

    let Some(org) = event.organization.as_ref().map(|o| o.login.clone()) else {
        return Classification::Invalid("missing organization");
    };
    let Some(project_number) = change.project_number else {
        return Classification::Invalid("missing project number");
    };
    let Some(item_id) = event.projects_v2_item.as_ref().map(|i| i.id) else {
        return Classification::Invalid("missing project item");
    };
    let Some(installation_id) = event.installation.as_ref().map(|i| i.id) else {
        return Classification::Invalid("missing installation");
    };

    Classification::Sync(SyncRequest {
        org,
        project_number,
        item_id,
        installation_id,
        action,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn edited_event(field_type: &str, field_name: &str, to: Value) -> ProjectsV2ItemEvent {
        serde_json::from_value(json!({
            "action": "edited",
            "organization": { "login": "acme" },
            "projects_v2_item": { "id": 42 },
            "installation": { "id": 123 },
            "changes": {
                "field_value": {
                    "field_type": field_type,
                    "field_name": field_name,
                    "project_number": 7,
                    "to": to
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_verify_webhook_signature_valid() {
        let body = b"test payload";
        let secret = "test-secret";

        // Compute expected signature
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let signature = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

        assert!(verify_webhook_signature(body, &signature, secret));
    }

    #[test]
    fn test_verify_webhook_signature_invalid() {
        let body = b"test payload";
        let secret = "test-secret";
        let wrong_signature =
            "sha256=0000000000000000000000000000000000000000000000000000000000000000";

        assert!(!verify_webhook_signature(body, wrong_signature, secret));
    }

    #[test]
    fn test_verify_webhook_signature_missing_prefix() {
        let body = b"test payload";
        let secret = "test-secret";

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let bare = hex::encode(mac.finalize().into_bytes());

        // Correct digest but GitHub's "sha256=" prefix is required
        assert!(!verify_webhook_signature(body, &bare, secret));
    }

    #[test]
    fn test_verify_webhook_signature_malformed() {
        assert!(!verify_webhook_signature(
            b"test payload",
            "sha256=not-hex",
            "test-secret"
        ));
    }

    #[test]
    fn test_classify_wrong_event_type() {
        let event = edited_event("date", "Target date", json!("2025-09-01"));
        assert!(matches!(
            classify("issues", &event),
            Classification::Invalid("unsupported event type")
        ));
    }

    #[test]
    fn test_classify_action_not_edited() {
        let event: ProjectsV2ItemEvent =
            serde_json::from_value(json!({ "action": "created" })).unwrap();
        assert!(matches!(
            classify(PROJECTS_V2_ITEM_EVENT, &event),
            Classification::Skip("action not edited")
        ));
    }

    #[test]
    fn test_classify_unknown_action_parses_and_skips() {
        let event: ProjectsV2ItemEvent =
            serde_json::from_value(json!({ "action": "converted" })).unwrap();
        assert_eq!(event.action, WebhookAction::Unknown);
        assert!(matches!(
            classify(PROJECTS_V2_ITEM_EVENT, &event),
            Classification::Skip("action not edited")
        ));
    }

    #[test]
    fn test_classify_due_date_change() {
        let event = edited_event("date", "Target date", json!("2025-09-01"));
        let Classification::Sync(request) = classify(PROJECTS_V2_ITEM_EVENT, &event) else {
            panic!("expected sync classification");
        };
        assert_eq!(request.org, "acme");
        assert_eq!(request.project_number, 7);
        assert_eq!(request.item_id, 42);
        assert_eq!(request.installation_id, 123);
        assert_eq!(
            request.action,
            SyncAction::DueDate {
                due: "2025-09-01".to_string()
            }
        );
    }

    #[test]
    fn test_classify_date_removed() {
        let event = edited_event("date", "Target date", Value::Null);
        assert!(matches!(
            classify(PROJECTS_V2_ITEM_EVENT, &event),
            Classification::Skip("date removed")
        ));
    }

    #[test]
    fn test_classify_status_done() {
        let event = edited_event(
            "single_select",
            "Status",
            json!({ "id": "opt-1", "name": "Done", "color": "GREEN" }),
        );
        let Classification::Sync(request) = classify(PROJECTS_V2_ITEM_EVENT, &event) else {
            panic!("expected sync classification");
        };
        assert_eq!(request.action, SyncAction::Complete);
    }

    #[test]
    fn test_classify_status_not_done() {
        let event = edited_event(
            "single_select",
            "Status",
            json!({ "id": "opt-2", "name": "In Progress" }),
        );
        assert!(matches!(
            classify(PROJECTS_V2_ITEM_EVENT, &event),
            Classification::Skip("status not Done")
        ));
    }

    #[test]
    fn test_classify_status_cleared() {
        let event = edited_event("single_select", "Status", Value::Null);
        assert!(matches!(
            classify(PROJECTS_V2_ITEM_EVENT, &event),
            Classification::Skip("status not Done")
        ));
    }

    #[test]
    fn test_classify_untracked_field() {
        let event = edited_event("text", "Notes", json!("hello"));
        assert!(matches!(
            classify(PROJECTS_V2_ITEM_EVENT, &event),
            Classification::Skip("field not tracked")
        ));
    }

    #[test]
    fn test_classify_missing_organization() {
        let event: ProjectsV2ItemEvent = serde_json::from_value(json!({
            "action": "edited",
            "projects_v2_item": { "id": 42 },
            "installation": { "id": 123 },
            "changes": {
                "field_value": {
                    "field_type": "date",
                    "field_name": "Target date",
                    "project_number": 7,
                    "to": "2025-09-01"
                }
            }
        }))
        .unwrap();
        assert!(matches!(
            classify(PROJECTS_V2_ITEM_EVENT, &event),
            Classification::Invalid("missing organization")
        ));
    }
}
