//! Weaviate backend over REST and GraphQL
//!
//! Collections map to Weaviate classes. Vectors are supplied by the caller
//! (`vectorizer: none`), distances are cosine.

use std::time::Duration;

use async_trait::async_trait;
use footage_core::{FootageError, FootageResult};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::backend::{CollectionSchema, Neighbor, PropertyFilter, VectorBackend};
use crate::record::RecordProperties;

const PROPERTY_FIELDS: &str = "video_id filename duration embedding_type scope start_time end_time";

#[derive(Debug, Clone)]
pub struct WeaviateConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl WeaviateConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

pub struct WeaviateBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl WeaviateBackend {
    /// Build the client and wait for the readiness probe to pass.
    ///
    /// Fails with `UpstreamUnavailable` if the cluster is unreachable or not ready.
    pub async fn connect(config: WeaviateConfig) -> FootageResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FootageError::config(format!("Failed to create HTTP client: {}", e)))?;

        let backend = Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.filter(|k| !k.trim().is_empty()),
        };

        let response = backend
            .request(reqwest::Method::GET, "/v1/.well-known/ready")
            .send()
            .await
            .map_err(|e| FootageError::upstream(format!("Weaviate unreachable: {}", e)))?;
        if !response.status().is_success() {
            return Err(FootageError::upstream(format!(
                "Weaviate not ready: HTTP {}",
                response.status()
            )));
        }

        info!("Connected to Weaviate at {}", backend.base_url);
        Ok(backend)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match self.api_key {
            Some(ref key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> FootageResult<Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| FootageError::upstream(format!("Weaviate {} failed: {}", what, e)))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(FootageError::api(status, format!("Weaviate {}: {}", what, body)))
    }

    async fn graphql(&self, query: String) -> FootageResult<Value> {
        debug!("GraphQL query: {}", query);
        let response = self
            .send(
                self.request(reqwest::Method::POST, "/v1/graphql")
                    .json(&json!({ "query": query })),
                "graphql",
            )
            .await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| FootageError::parse(format!("Failed to parse GraphQL response: {}", e)))?;

        if let Some(message) = graphql_error(&body) {
            return Err(FootageError::storage(format!("GraphQL error: {}", message)));
        }
        Ok(body)
    }
}

/// Weaviate class definition for a collection schema
pub fn schema_body(schema: &CollectionSchema) -> Value {
    let properties: Vec<Value> = schema
        .properties
        .iter()
        .map(|p| {
            json!({
                "name": p.name,
                "dataType": [p.data_type],
                "description": p.description,
            })
        })
        .collect();

    json!({
        "class": schema.name,
        "description": schema.description,
        "vectorizer": "none",
        "vectorIndexType": "hnsw",
        "vectorIndexConfig": {
            "distance": "cosine",
            "efConstruction": schema.index.ef_construction,
            "maxConnections": schema.index.max_connections,
            "vectorCacheMaxObjects": schema.index.vector_cache_max_objects,
        },
        "properties": properties,
    })
}

/// GraphQL text for a nearest-vector query
pub fn near_vector_query(collection: &str, vector: &[f32], limit: usize) -> String {
    let vector = serde_json::to_string(vector).unwrap_or_else(|_| "[]".to_string());
    format!(
        "{{ Get {{ {}(nearVector: {{vector: {}}}, limit: {}) {{ {} _additional {{ id distance }} }} }} }}",
        collection, vector, limit, PROPERTY_FIELDS
    )
}

/// GraphQL text for a filtered object fetch
pub fn fetch_query(collection: &str, filter: Option<&PropertyFilter>, limit: usize) -> String {
    let mut args = format!("limit: {}", limit);
    if let Some(f) = filter {
        // JSON string quoting is valid GraphQL string quoting
        let value = serde_json::to_string(&f.value).unwrap_or_else(|_| "\"\"".to_string());
        args.push_str(&format!(
            ", where: {{path: [\"{}\"], operator: Equal, valueText: {}}}",
            f.property, value
        ));
    }
    format!(
        "{{ Get {{ {}({}) {{ {} }} }} }}",
        collection, args, PROPERTY_FIELDS
    )
}

fn graphql_error(body: &Value) -> Option<String> {
    let errors = body.get("errors")?.as_array()?;
    let messages: Vec<&str> = errors
        .iter()
        .filter_map(|e| e.get("message").and_then(Value::as_str))
        .collect();
    if errors.is_empty() {
        None
    } else if messages.is_empty() {
        Some("unknown error".to_string())
    } else {
        Some(messages.join("; "))
    }
}

/// Objects from a `Get` response, skipping any that do not parse
pub fn parse_get_response(body: &Value, collection: &str) -> Vec<Neighbor> {
    let Some(objects) = body
        .pointer(&format!("/data/Get/{}", collection))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    objects
        .iter()
        .filter_map(|obj| {
            let properties: RecordProperties = match serde_json::from_value(obj.clone()) {
                Ok(p) => p,
                Err(e) => {
                    warn!("Skipping malformed object in {}: {}", collection, e);
                    return None;
                }
            };
            let additional = obj.get("_additional");
            let id = additional
                .and_then(|a| a.get("id"))
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok());
            let distance = additional
                .and_then(|a| a.get("distance"))
                .and_then(Value::as_f64)
                .unwrap_or(1.0);
            Some(Neighbor {
                id,
                properties,
                distance,
            })
        })
        .collect()
}

/// Per-object error messages from a batch write response
pub fn batch_errors(body: &Value) -> Vec<String> {
    let Some(results) = body.as_array() else {
        return Vec::new();
    };
    results
        .iter()
        .filter_map(|r| r.pointer("/result/errors/error"))
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(|e| e.get("message").and_then(Value::as_str))
        .map(String::from)
        .collect()
}

#[async_trait]
impl VectorBackend for WeaviateBackend {
    #[instrument(skip(self))]
    async fn collection_exists(&self, name: &str) -> FootageResult<bool> {
        let result = self
            .send(
                self.request(reqwest::Method::GET, &format!("/v1/schema/{}", name)),
                "schema lookup",
            )
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(FootageError::Api { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, schema), fields(collection = %schema.name))]
    async fn create_collection(&self, schema: &CollectionSchema) -> FootageResult<()> {
        self.send(
            self.request(reqwest::Method::POST, "/v1/schema")
                .json(&schema_body(schema)),
            "schema create",
        )
        .await?;
        info!("Created collection {}", schema.name);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_collection(&self, name: &str) -> FootageResult<()> {
        let result = self
            .send(
                self.request(reqwest::Method::DELETE, &format!("/v1/schema/{}", name)),
                "schema delete",
            )
            .await;
        match result {
            Ok(_) => {
                info!("Deleted collection {}", name);
                Ok(())
            }
            Err(FootageError::Api { status: 404, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, properties, vector), fields(video_id = %properties.video_id))]
    async fn upsert(
        &self,
        collection: &str,
        id: Uuid,
        properties: &RecordProperties,
        vector: &[f32],
    ) -> FootageResult<()> {
        let body = json!({
            "objects": [{
                "class": collection,
                "id": id.to_string(),
                "properties": properties,
                "vector": vector,
            }]
        });

        let response = self
            .send(
                self.request(reqwest::Method::POST, "/v1/batch/objects")
                    .json(&body),
                "batch write",
            )
            .await?;
        let result: Value = response
            .json()
            .await
            .map_err(|e| FootageError::parse(format!("Failed to parse batch response: {}", e)))?;

        let errors = batch_errors(&result);
        if !errors.is_empty() {
            return Err(FootageError::storage(errors.join("; ")));
        }
        Ok(())
    }

    #[instrument(skip(self, vector))]
    async fn nearest_neighbors(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> FootageResult<Vec<Neighbor>> {
        let body = self
            .graphql(near_vector_query(collection, vector, limit))
            .await?;
        Ok(parse_get_response(&body, collection))
    }

    #[instrument(skip(self))]
    async fn fetch_by_filter(
        &self,
        collection: &str,
        filter: Option<&PropertyFilter>,
        limit: usize,
    ) -> FootageResult<Vec<RecordProperties>> {
        let body = self
            .graphql(fetch_query(collection, filter, limit))
            .await?;
        Ok(parse_get_response(&body, collection)
            .into_iter()
            .map(|n| n.properties)
            .collect())
    }

    #[instrument(skip(self))]
    async fn count(&self, collection: &str) -> FootageResult<usize> {
        let query = format!("{{ Aggregate {{ {} {{ meta {{ count }} }} }} }}", collection);
        let body = self.graphql(query).await?;
        body.pointer(&format!("/data/Aggregate/{}/0/meta/count", collection))
            .and_then(Value::as_u64)
            .map(|c| c as usize)
            .ok_or_else(|| FootageError::parse("Missing count in aggregate response"))
    }

    fn name(&self) -> &str {
        "weaviate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_body() {
        let schema = CollectionSchema::video_segments("NatureVideo", Some(1024));
        let body = schema_body(&schema);

        assert_eq!(body["class"], "NatureVideo");
        assert_eq!(body["vectorizer"], "none");
        assert_eq!(body["vectorIndexConfig"]["distance"], "cosine");
        assert_eq!(body["vectorIndexConfig"]["efConstruction"], 128);
        assert_eq!(body["vectorIndexConfig"]["maxConnections"], 16);
        assert_eq!(body["properties"].as_array().unwrap().len(), 7);
        assert_eq!(body["properties"][2]["dataType"][0], "number");
    }

    #[test]
    fn test_near_vector_query() {
        let query = near_vector_query("NatureVideo", &[0.5, -1.0], 6);
        assert!(query.contains("NatureVideo(nearVector: {vector: [0.5,-1.0]}, limit: 6)"));
        assert!(query.contains("_additional { id distance }"));
    }

    #[test]
    fn test_fetch_query_escapes_value() {
        let filter = PropertyFilter::equal("video_id", "abc\"} injected");
        let query = fetch_query("NatureVideo", Some(&filter), 10);
        assert!(query.contains(r#"valueText: "abc\"} injected""#));
        assert!(query.contains("limit: 10"));
    }

    #[test]
    fn test_parse_get_response() {
        let body = json!({
            "data": { "Get": { "NatureVideo": [
                {
                    "video_id": "v1", "filename": "a.mp4", "duration": 12.0,
                    "embedding_type": "visual-text", "scope": "video",
                    "start_time": 0.0, "end_time": 12.0,
                    "_additional": { "id": "6ba7b810-9dad-11d1-80b4-00c04fd430c8", "distance": 0.25 }
                },
                { "video_id": "broken" }
            ]}}
        });

        let hits = parse_get_response(&body, "NatureVideo");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].properties.video_id, "v1");
        assert!(hits[0].id.is_some());
        assert!((hits[0].similarity() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_graphql_error() {
        assert!(graphql_error(&json!({ "data": {} })).is_none());
        let body = json!({ "errors": [{ "message": "class not found" }] });
        assert_eq!(graphql_error(&body).unwrap(), "class not found");
    }

    #[test]
    fn test_batch_errors() {
        let ok = json!([{ "id": "x", "result": {} }]);
        assert!(batch_errors(&ok).is_empty());

        let failed = json!([{ "result": { "errors": { "error": [
            { "message": "vector lengths don't match: 1024 vs 512" }
        ]}}}]);
        assert_eq!(batch_errors(&failed).len(), 1);
    }
}
