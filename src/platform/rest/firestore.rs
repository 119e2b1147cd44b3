use super::{
    read_json, transport_error,
    value::{expand_dotted, from_typed_fields, to_typed, to_typed_fields},
    PlatformResult, Transport,
};
use crate::{
    error::PlatformError,
    platform::{Direction, DocPath, Document, DocumentStore, Fields, Query},
};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, instrument};

const UNAVAILABLE: &str = "unavailable";

/// Document API error payloads carry a gRPC status (`NOT_FOUND`,
/// `PERMISSION_DENIED`, ...); the SDK spells those `not-found`, `permission-denied`.
pub(crate) fn document_code(body: &Value) -> String {
    body["error"]["status"]
        .as_str()
        .map(|status| status.to_lowercase().replace('_', "-"))
        .unwrap_or_default()
}

#[derive(Clone, Debug)]
pub struct RestStore {
    transport: Transport,
    root: String,
    database: String,
    available: bool,
}

impl RestStore {
    pub(super) fn new(transport: Transport, root: &str, project_id: &str, available: bool) -> Self {
        Self {
            transport,
            root: root.to_string(),
            database: format!("projects/{project_id}/databases/(default)"),
            available,
        }
    }

    pub(crate) fn documents_url(&self) -> String {
        format!("{}/{}/documents", self.root, self.database)
    }

    fn document_name(&self, path: &DocPath) -> String {
        format!("{}/documents/{path}", self.database)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> PlatformResult<reqwest::Response> {
        self.transport
            .decorate(request, true)
            .send()
            .await
            .map_err(|err| transport_error(UNAVAILABLE, &err))
    }

    async fn patch(&self, path: &DocPath, fields: &Fields, mask: Option<Vec<String>>) -> PlatformResult<()> {
        let mut url = self
            .transport
            .url(&format!("{}/{path}", self.documents_url()))?;
        if let Some(mask) = mask {
            let mut pairs = url.query_pairs_mut();
            for field in mask {
                pairs.append_pair("updateMask.fieldPaths", &field);
            }
            pairs.append_pair("currentDocument.exists", "true");
        }
        let request = self
            .transport
            .client
            .patch(url)
            .json(&json!({ "fields": to_typed_fields(fields) }));
        let response = self.send(request).await?;
        read_json(response, UNAVAILABLE, document_code).await?;
        Ok(())
    }
}

fn id_of(name: &str) -> String {
    name.rsplit('/').next().unwrap_or_default().to_string()
}

fn document_from(raw: &Value) -> Document {
    Document {
        id: id_of(raw["name"].as_str().unwrap_or_default()),
        fields: from_typed_fields(raw.get("fields")),
    }
}

/// `posts/p1/comments` → (`posts/p1`, `comments`).
fn split_collection(collection: &str) -> (Option<&str>, &str) {
    match collection.rsplit_once('/') {
        Some((parent, id)) => (Some(parent), id),
        None => (None, collection),
    }
}

pub(crate) fn structured_query(query: &Query) -> Value {
    let (_, collection_id) = split_collection(&query.collection);
    let mut structured = json!({ "from": [{ "collectionId": collection_id }] });

    let filters: Vec<Value> = query
        .filters
        .iter()
        .map(|(field, value)| {
            json!({
                "fieldFilter": {
                    "field": { "fieldPath": field },
                    "op": "EQUAL",
                    "value": to_typed(value),
                }
            })
        })
        .collect();
    match filters.len() {
        0 => {}
        1 => structured["where"] = filters[0].clone(),
        _ => {
            structured["where"] = json!({ "compositeFilter": { "op": "AND", "filters": filters } });
        }
    }

    if !query.order_by.is_empty() {
        structured["orderBy"] = Value::Array(
            query
                .order_by
                .iter()
                .map(|(field, direction)| {
                    let direction = match direction {
                        Direction::Ascending => "ASCENDING",
                        Direction::Descending => "DESCENDING",
                    };
                    json!({ "field": { "fieldPath": field }, "direction": direction })
                })
                .collect(),
        );
    }

    if let Some(limit) = query.limit {
        structured["limit"] = Value::from(limit);
    }

    json!({ "structuredQuery": structured })
}

impl DocumentStore for RestStore {
    fn is_available(&self) -> bool {
        self.available
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn get(&self, path: &DocPath) -> PlatformResult<Option<Document>> {
        let url = self
            .transport
            .url(&format!("{}/{path}", self.documents_url()))?;
        let response = self.send(self.transport.client.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let raw = read_json(response, UNAVAILABLE, document_code).await?;
        Ok(Some(document_from(&raw)))
    }

    #[instrument(skip(self, fields), fields(path = %path))]
    async fn set(&self, path: &DocPath, fields: Fields) -> PlatformResult<()> {
        self.patch(path, &fields, None).await
    }

    #[instrument(skip(self, fields))]
    async fn add(&self, collection: &str, fields: Fields) -> PlatformResult<String> {
        let url = self
            .transport
            .url(&format!("{}/{collection}", self.documents_url()))?;
        let request = self
            .transport
            .client
            .post(url)
            .json(&json!({ "fields": to_typed_fields(&fields) }));
        let response = self.send(request).await?;
        let raw = read_json(response, UNAVAILABLE, document_code).await?;
        let id = id_of(raw["name"].as_str().unwrap_or_default());
        if id.is_empty() {
            return Err(PlatformError::new("", "create response without document name"));
        }
        debug!("created {}/{}", collection, id);
        Ok(id)
    }

    #[instrument(skip(self, fields), fields(path = %path))]
    async fn update(&self, path: &DocPath, fields: Fields) -> PlatformResult<()> {
        let mask: Vec<String> = fields.keys().cloned().collect();
        self.patch(path, &expand_dotted(fields), Some(mask)).await
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn delete(&self, path: &DocPath) -> PlatformResult<()> {
        let url = self
            .transport
            .url(&format!("{}/{path}", self.documents_url()))?;
        let response = self.send(self.transport.client.delete(url)).await?;
        read_json(response, UNAVAILABLE, document_code).await?;
        Ok(())
    }

    #[instrument(skip(self, query), fields(collection = %query.collection))]
    async fn query(&self, query: &Query) -> PlatformResult<Vec<Document>> {
        let parent = match split_collection(&query.collection) {
            (Some(parent), _) => format!("{}/{parent}", self.documents_url()),
            (None, _) => self.documents_url(),
        };
        let url = self.transport.url(&format!("{parent}:runQuery"))?;
        let request = self
            .transport
            .client
            .post(url)
            .json(&structured_query(query));
        let response = self.send(request).await?;
        let raw = read_json(response, UNAVAILABLE, document_code).await?;
        Ok(raw
            .as_array()
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| row.get("document"))
                    .map(document_from)
                    .collect()
            })
            .unwrap_or_default())
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn increment(&self, path: &DocPath, field: &str, delta: i64) -> PlatformResult<()> {
        let url = self.transport.url(&format!("{}:commit", self.documents_url()))?;
        let payload = json!({
            "writes": [{
                "transform": {
                    "document": self.document_name(path),
                    "fieldTransforms": [{
                        "fieldPath": field,
                        "increment": { "integerValue": delta.to_string() },
                    }],
                },
                "currentDocument": { "exists": true },
            }]
        });
        let response = self
            .send(self.transport.client.post(url).json(&payload))
            .await?;
        read_json(response, UNAVAILABLE, document_code).await?;
        Ok(())
    }
}
