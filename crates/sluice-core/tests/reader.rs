//! Reader behavior without pagination: single request, entrypoint
//! extraction, auth application, GraphQL POST bodies.

use std::sync::Arc;

use serde_json::{json, Value};
use sluice_core::client::{HttpClient, HttpClientConfig};
use sluice_core::model::{DataModel, FieldDef, FieldType};
use sluice_core::read::Reader;
use sluice_core::source::{
    ApiConfig, ApiEndpointConfig, AuthConfig, TableConfig, TransportKind,
};
use sluice_core::watermark::{MemoryWatermarks, Watermarks};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn model() -> Arc<DataModel> {
    DataModel::new(
        "Thing",
        vec![FieldDef::new("id", FieldType::BigInt, "root.id").primary_key()],
    )
    .unwrap()
}

fn reader_for(source: ApiConfig, endpoint_name: &str) -> Reader {
    Reader::new(
        Arc::new(source),
        endpoint_name,
        Arc::new(HttpClient::new(HttpClientConfig::default()).unwrap()),
        Arc::new(MemoryWatermarks::new()) as Arc<dyn Watermarks>,
        None,
        1000,
    )
}

async fn collect(reader: &Reader, url: &str, endpoint: &ApiEndpointConfig) -> Vec<Vec<Value>> {
    let mut stream = reader.read(url, endpoint).unwrap();
    let mut batches = Vec::new();
    while let Some(batch) = stream.next_batch().await.unwrap() {
        batches.push(batch);
    }
    batches
}

#[tokio::test]
async fn unpaginated_rest_endpoint_yields_one_batch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/things"))
        .and(query_param("region", "eu"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 1}, {"id": 2}, {"id": 3}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = ApiConfig::new("demo", &server.uri(), TransportKind::Rest)
        .param("region", "eu");
    let endpoint = ApiEndpointConfig::new()
        .json_entrypoint("data")
        .table(TableConfig::new(model()));
    let reader = reader_for(source, "things");

    let batches = collect(&reader, &format!("{}/things", server.uri()), &endpoint).await;
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 3);
}

#[tokio::test]
async fn bearer_auth_is_applied_to_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/things"))
        .and(header("authorization", "Bearer sk_live_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;

    let source = ApiConfig::new("demo", &server.uri(), TransportKind::Rest)
        .authentication(AuthConfig::Bearer {
            token: "sk_live_123".to_string(),
        });
    let endpoint = ApiEndpointConfig::new()
        .json_entrypoint("data")
        .table(TableConfig::new(model()));
    let reader = reader_for(source, "things");

    let batches = collect(&reader, &format!("{}/things", server.uri()), &endpoint).await;
    assert_eq!(batches.len(), 1);
    assert!(batches[0].is_empty());
}

#[tokio::test]
async fn graphql_endpoint_posts_query_and_variables() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({"query": "query { things { id } }"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"things": [{"id": 10}, {"id": 11}]},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = ApiConfig::new("gql", &server.uri(), TransportKind::GraphQl);
    let endpoint = ApiEndpointConfig::new()
        .json_entrypoint("data.things")
        .body(json!({"query": "query { things { id } }", "variables": {}}))
        .table(TableConfig::new(model()));
    let reader = reader_for(source, "graphql");

    let batches = collect(&reader, &format!("{}/graphql", server.uri()), &endpoint).await;
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 2);
    assert_eq!(batches[0][0]["id"], json!(10));
}

#[tokio::test]
async fn scalar_body_is_wrapped_as_single_item() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/thing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42})))
        .expect(1)
        .mount(&server)
        .await;

    let source = ApiConfig::new("demo", &server.uri(), TransportKind::Rest);
    let endpoint = ApiEndpointConfig::new().table(TableConfig::new(model()));
    let reader = reader_for(source, "thing");

    let batches = collect(&reader, &format!("{}/thing", server.uri()), &endpoint).await;
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0], vec![json!({"id": 42})]);
}
