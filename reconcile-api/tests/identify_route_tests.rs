//! Router tests for `POST /identify` and the health endpoints, run against
//! the in-memory store.


use axum::http::StatusCode;
use proptest::prelude::*;
use reconcile_core::ContactId;
use reconcile_storage::InMemoryContactStore;
use reconcile_test_utils::assertions::{assert_store_invariants, assert_clusters_disjoint};
use reconcile_test_utils::fixtures::{george_and_biff, lorraine_cluster, secondary_at, store_with};
use reconcile_test_utils::generators::arb_request_sequence;
use tower::ServiceExt;

use test_support::{get_request, identify_request, json_body, memory_app};

#[tokio::test]
async fn test_new_identity_wire_shape() {
    let store = InMemoryContactStore::new();
    let response = memory_app(&store)
        .oneshot(identify_request(r#"{"email":"doc@hillvalley.edu","phoneNumber":"555"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let contact = &body["contact"];
    assert!(contact["primaryContatctId"].is_i64());
    assert_eq!(contact["emails"], serde_json::json!(["doc@hillvalley.edu"]));
    assert_eq!(contact["phoneNumbers"], serde_json::json!(["555"]));
    assert_eq!(contact["secondaryContactIds"], serde_json::json!([]));
    assert_eq!(store.len().unwrap(), 1);
}

#[tokio::test]
async fn test_existing_cluster_is_returned() {
    let store = lorraine_cluster();
    let response = memory_app(&store)
        .oneshot(identify_request(
            r#"{"email":"mcfly@hillvalley.edu","phoneNumber":"123456"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(
        body,
        serde_json::json!({
            "contact": {
                "primaryContatctId": 1,
                "emails": ["lorraine@hillvalley.edu", "mcfly@hillvalley.edu"],
                "phoneNumbers": ["123456"],
                "secondaryContactIds": [23]
            }
        })
    );
}

#[tokio::test]
async fn test_merge_through_http() {
    let store = george_and_biff();
    let response = memory_app(&store)
        .oneshot(identify_request(
            r#"{"email":"george@hillvalley.edu","phoneNumber":"717171"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["contact"]["primaryContatctId"], 11);
    assert_eq!(
        body["contact"]["emails"],
        serde_json::json!(["george@hillvalley.edu", "biffsucks@hillvalley.edu"])
    );
    assert_eq!(body["contact"]["secondaryContactIds"][0], 27);
}

#[tokio::test]
async fn test_numeric_phone_number_is_accepted() {
    let store = lorraine_cluster();
    let response = memory_app(&store)
        .oneshot(identify_request(r#"{"phoneNumber":123456}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["contact"]["primaryContatctId"], 1);
}

#[tokio::test]
async fn test_missing_identifiers_are_rejected() {
    let store = InMemoryContactStore::new();
    let response = memory_app(&store)
        .oneshot(identify_request("{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "VALIDATION_FAILED");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Either email or phoneNumber"));
    assert!(store.is_empty().unwrap());
}

#[tokio::test]
async fn test_blank_and_null_identifiers_are_rejected() {
    for payload in [
        r#"{"email":"   ","phoneNumber":""}"#,
        r#"{"email":null,"phoneNumber":null}"#,
        r#"{"email":null}"#,
    ] {
        let store = InMemoryContactStore::new();
        let response = memory_app(&store)
            .oneshot(identify_request(payload))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", payload);
        let body = json_body(response).await;
        assert_eq!(body["code"], "VALIDATION_FAILED");
        assert!(body["message"].as_str().unwrap().contains("non-empty"));
        assert!(store.is_empty().unwrap());
    }
}

#[tokio::test]
async fn test_malformed_bodies_are_invalid_input() {
    for payload in ["not json", r#"{"email": 42}"#, r#"{"phoneNumber": [1]}"#] {
        let store = InMemoryContactStore::new();
        let response = memory_app(&store)
            .oneshot(identify_request(payload))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", payload);
        let body = json_body(response).await;
        assert_eq!(body["code"], "INVALID_INPUT");
    }
}

#[tokio::test]
async fn test_inconsistent_graph_is_internal_error() {
    let store = store_with([secondary_at(2, 0, 99, Some("a@x.com"), None)]);
    let response = memory_app(&store)
        .oneshot(identify_request(r#"{"email":"a@x.com"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["code"], "INCONSISTENT_STATE");
}

#[tokio::test]
async fn test_exhausted_merge_retries_are_reported() {
    let store = george_and_biff();
    store.inject_conflicts(10).unwrap();
    let response = memory_app(&store)
        .oneshot(identify_request(
            r#"{"email":"george@hillvalley.edu","phoneNumber":"717171"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["code"], "TRANSACTION_FAILED");
    assert_eq!(body["details"]["attempts"], 3);
    let demoted = store.contact(ContactId(27)).unwrap().unwrap();
    assert!(demoted.is_primary());
}

#[tokio::test]
async fn test_unavailable_store_is_service_unavailable() {
    let store = InMemoryContactStore::new();
    store.set_unavailable(true).unwrap();
    let response = memory_app(&store)
        .oneshot(identify_request(r#"{"email":"a@x.com"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn test_health_endpoints() {
    let store = InMemoryContactStore::new();
    let app = memory_app(&store);

    let response = app.clone().oneshot(get_request("/health/ping")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"pong");

    let response = app.clone().oneshot(get_request("/health/live")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.clone().oneshot(get_request("/health/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["details"]["database"]["status"], "healthy");

    store.set_unavailable(true).unwrap();
    let response = app.oneshot(get_request("/health/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["status"], "unhealthy");
}

#[cfg(feature = "openapi")]
#[tokio::test]
async fn test_openapi_document_is_served() {
    let store = InMemoryContactStore::new();
    let response = memory_app(&store)
        .oneshot(get_request("/openapi.json"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["paths"].get("/identify").is_some());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Any sequence of well-formed requests succeeds and keeps the graph valid.
    #[test]
    fn prop_http_requests_preserve_invariants(requests in arb_request_sequence(12)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = InMemoryContactStore::new();
            let app = memory_app(&store);

            for request in &requests {
                let body = serde_json::json!({
                    "email": request.email(),
                    "phoneNumber": request.phone_number(),
                });
                let response = app
                    .clone()
                    .oneshot(identify_request(&body.to_string()))
                    .await
                    .unwrap();
                prop_assert_eq!(response.status(), StatusCode::OK);

                let body = json_body(response).await;
                let primary = body["contact"]["primaryContatctId"].as_i64().unwrap();
                prop_assert!(store.contact(ContactId(primary)).unwrap().unwrap().is_primary());
            }

            let contacts = store.contacts().unwrap();
            assert_store_invariants(&contacts);
            assert_clusters_disjoint(&contacts);
            Ok(())
        })?;
    }
}
