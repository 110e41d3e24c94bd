//! SpiceDB relation store over the HTTP gateway
//!
//! Writes use `OPERATION_TOUCH`, which SpiceDB treats as an upsert, so
//! resubmitting a tuple is never an error. Deletes of absent tuples are
//! no-ops on the SpiceDB side as well.

use super::{ObjectRef, RelationStore, RelationStoreError, RelationTuple};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

const OPERATION_TOUCH: &str = "OPERATION_TOUCH";
const OPERATION_DELETE: &str = "OPERATION_DELETE";

const WRITE_PATH: &str = "/v1/relationships/write";
const READ_PATH: &str = "/v1/relationships/read";

/// Relation store client for a SpiceDB HTTP gateway
///
/// The [`Client`] is a process-scoped resource: build it once at startup
/// (see [`SpiceDbRelationStore::build_client`]) and inject it here; its
/// connection pool is shared by every sync call.
pub struct SpiceDbRelationStore {
    client: Client,
    endpoint: String,
    preshared_key: String,
}

impl SpiceDbRelationStore {
    /// Create a store talking to `endpoint` (e.g. `http://spicedb:8443`)
    pub fn new(
        client: Client,
        endpoint: impl Into<String>,
        preshared_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            preshared_key: preshared_key.into(),
        }
    }

    /// Build the shared HTTP client with a per-request timeout
    pub fn build_client(timeout: Duration) -> Result<Client, RelationStoreError> {
        Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                RelationStoreError::Unavailable(format!("failed to build HTTP client: {}", e))
            })
    }

    /// Gateway base URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, path: &str, body: &Value) -> Result<String, RelationStoreError> {
        let response = self
            .client
            .post(format!("{}{}", self.endpoint, path))
            .bearer_auth(&self.preshared_key)
            .json(body)
            .send()
            .await
            .map_err(|e| RelationStoreError::Unavailable(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RelationStoreError::Unavailable(e.to_string()))?;

        if status.is_success() {
            Ok(text)
        } else if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            Err(RelationStoreError::Rejected(format!("{}: {}", status, text)))
        } else {
            Err(RelationStoreError::Unavailable(format!("{}: {}", status, text)))
        }
    }

    async fn update(
        &self,
        operation: &str,
        tuple: &RelationTuple,
    ) -> Result<(), RelationStoreError> {
        let body = json!({
            "updates": [{
                "operation": operation,
                "relationship": relationship(tuple),
            }]
        });

        self.post(WRITE_PATH, &body).await.map(|_| ())
    }
}

fn parse_relationship(value: &Value) -> Option<RelationTuple> {
    let resource = &value["resource"];
    let subject = &value["subject"]["object"];
    Some(RelationTuple::new(
        ObjectRef::new(resource["objectType"].as_str()?, resource["objectId"].as_str()?),
        value["relation"].as_str()?,
        ObjectRef::new(subject["objectType"].as_str()?, subject["objectId"].as_str()?),
    ))
}

fn relationship(tuple: &RelationTuple) -> Value {
    json!({
        "resource": {
            "objectType": tuple.object.object_type,
            "objectId": tuple.object.object_id,
        },
        "relation": tuple.relation,
        "subject": {
            "object": {
                "objectType": tuple.subject.object_type,
                "objectId": tuple.subject.object_id,
            }
        }
    })
}

#[async_trait]
impl RelationStore for SpiceDbRelationStore {
    async fn write(&self, tuple: &RelationTuple) -> Result<(), RelationStoreError> {
        self.update(OPERATION_TOUCH, tuple).await
    }

    async fn delete(&self, tuple: &RelationTuple) -> Result<(), RelationStoreError> {
        self.update(OPERATION_DELETE, tuple).await
    }

    async fn contains(&self, tuple: &RelationTuple) -> Result<bool, RelationStoreError> {
        let body = json!({
            "consistency": { "fullyConsistent": true },
            "relationshipFilter": {
                "resourceType": tuple.object.object_type,
                "optionalResourceId": tuple.object.object_id,
                "optionalRelation": tuple.relation,
                "optionalSubjectFilter": {
                    "subjectType": tuple.subject.object_type,
                    "optionalSubjectId": tuple.subject.object_id,
                }
            }
        });

        // Streamed response: one JSON object per line
        let text = self.post(READ_PATH, &body).await?;
        Ok(text
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .any(|message| message.get("result").is_some()))
    }

    async fn list(
        &self,
        object_type: &str,
        object_id: Option<&str>,
    ) -> Result<Vec<RelationTuple>, RelationStoreError> {
        let mut filter = json!({ "resourceType": object_type });
        if let Some(object_id) = object_id {
            filter["optionalResourceId"] = json!(object_id);
        }
        let body = json!({
            "consistency": { "fullyConsistent": true },
            "relationshipFilter": filter,
        });

        let text = self.post(READ_PATH, &body).await?;
        let mut tuples = Vec::new();
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            let message: Value = serde_json::from_str(line).map_err(|e| {
                RelationStoreError::Unavailable(format!("malformed read response: {}", e))
            })?;

            // Errors after the status line arrive inside the stream
            if let Some(error) = message.get("error") {
                return Err(RelationStoreError::Unavailable(error.to_string()));
            }

            if let Some(tuple) = parse_relationship(&message["result"]["relationship"]) {
                tuples.push(tuple);
            }
        }

        tuples.sort();
        Ok(tuples)
    }
}
