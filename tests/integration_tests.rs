//! Integration tests for the MYRAD backend
//!
//! These tests drive the contribution intake end to end (dedup, pipeline,
//! cohort counting, consent logging, points) and exercise the HTTP surface
//! through the assembled axum router.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Duration;
use http_body_util::BodyExt;
use myrad_backend::{
    build_app, ApiComponents, DataType, IntakeError, League, MyradConfig, ProcessingMethod,
    SecurityMiddlewareConfig, SecurityState, SubmissionRequest, UserAccount,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const WALLET_A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const WALLET_B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
const WALLET_C: &str = "0xcccccccccccccccccccccccccccccccccccccccc";
const ENTERPRISE_KEY: &str = "test_enterprise_key_0001";

// ============================================================================
// Test Helpers
// ============================================================================

fn test_config(k_threshold: u64) -> MyradConfig {
    let mut config = MyradConfig::default();
    config.privacy.consent_hash_salt = "integration_test_salt_value".to_string();
    config.privacy.k_threshold = k_threshold;
    config.security.enterprise_api_keys = vec![ENTERPRISE_KEY.to_string()];
    config
}

fn components(k_threshold: u64) -> ApiComponents {
    ApiComponents::from_config(&test_config(k_threshold), None)
}

/// `n` Zomato orders in one city at a fixed amount, all in January 2024
fn zomato_orders(n: usize, amount: f64, city: &str) -> Value {
    let orders: Vec<Value> = (0..n)
        .map(|i| {
            json!({
                "amount": amount,
                "date": format!("2024-01-{:02}", (i % 28) + 1),
                "city": city,
            })
        })
        .collect();
    json!({ "orders": orders })
}

async fn register(components: &ApiComponents, wallet: &str) -> UserAccount {
    let (user, created) = components.users.get_or_create(wallet).await.unwrap();
    assert!(created);
    user
}

fn submission(user: &UserAccount, data_type: DataType, payload: Value, proof: Option<&str>) -> SubmissionRequest {
    SubmissionRequest {
        user_id: user.id.clone(),
        data_type: data_type.as_str().to_string(),
        payload,
        proof_id: proof.map(str::to_string),
    }
}

// ============================================================================
// Contribution Intake
// ============================================================================

mod intake_flow {
    use super::*;

    #[tokio::test]
    async fn test_accepted_contribution_runs_every_step() {
        let components = components(10);
        let user = register(&components, WALLET_A).await;

        let receipt = components
            .intake
            .submit(submission(
                &user,
                DataType::ZomatoOrderHistory,
                zomato_orders(12, 450.0, "Bengaluru"),
                Some("proof_accept_1"),
            ))
            .await
            .unwrap();

        // Quality 1.0 with 12 orders earns the bonus
        assert_eq!(receipt.points_awarded, 30);
        assert_eq!(receipt.breakdown.base, 10);
        assert_eq!(receipt.breakdown.quality, 20);
        assert!(receipt.is_large_data);
        assert!(receipt.has_sellable_data);
        assert_eq!(receipt.cohort_id.as_deref(), Some("zomato:bengaluru:mid:heavy"));
        assert_eq!(receipt.cohort_size, 1);
        assert_eq!(receipt.k_anonymity_compliant, Some(false));
        assert!(receipt.consent_entry_id.is_some());
        assert_eq!(receipt.total_points, 30);
        assert_eq!(receipt.league, League::Bronze);

        let stored = components.store.by_user(&user.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].processing_method, ProcessingMethod::EnterprisePipeline);
        assert_eq!(stored[0].record_count, 12);
        let privacy = &stored[0].sellable_data.as_ref().unwrap().metadata.privacy_compliance;
        assert_eq!(privacy.cohort_size, 1);
        assert_eq!(privacy.k_anonymity_compliant, Some(false));

        assert_eq!(components.cohorts.get_count("zomato:bengaluru:mid:heavy").await, 1);
        assert!(components.consent.is_proof_already_used("proof_accept_1").await);

        let user = components.users.get_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(user.total_points, 30);
        assert_eq!(user.contributions_count, 1);
        assert!(user.last_contribution_at.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_proof_has_no_side_effects() {
        let components = components(10);
        let user = register(&components, WALLET_A).await;

        let first = components
            .intake
            .submit(submission(
                &user,
                DataType::ZomatoOrderHistory,
                zomato_orders(12, 450.0, "Pune"),
                Some("proof_dup"),
            ))
            .await
            .unwrap();

        // Entirely different payload, same proof
        let err = components
            .intake
            .submit(submission(
                &user,
                DataType::NetflixWatchHistory,
                json!({ "watchHistory": [] }),
                Some("proof_dup"),
            ))
            .await
            .unwrap_err();

        match err {
            IntakeError::Duplicate {
                existing_contribution_id,
            } => assert_eq!(existing_contribution_id, Some(first.contribution_id)),
            other => panic!("expected duplicate, got {:?}", other),
        }

        assert_eq!(components.store.by_user(&user.id).await.unwrap().len(), 1);
        assert_eq!(components.consent.get_stats().await.total_entries, 1);
        let user = components.users.get_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(user.total_points, 30);
    }

    #[tokio::test]
    async fn test_proof_used_by_another_user_is_duplicate() {
        let components = components(10);
        let alice = register(&components, WALLET_A).await;
        let bob = register(&components, WALLET_B).await;

        components
            .intake
            .submit(submission(
                &alice,
                DataType::ZomatoOrderHistory,
                zomato_orders(6, 200.0, "Delhi"),
                Some("proof_shared"),
            ))
            .await
            .unwrap();

        let err = components
            .intake
            .submit(submission(
                &bob,
                DataType::ZomatoOrderHistory,
                zomato_orders(6, 200.0, "Delhi"),
                Some("proof_shared"),
            ))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IntakeError::Duplicate {
                existing_contribution_id: None
            }
        ));
    }

    #[tokio::test]
    async fn test_similar_content_is_rate_limited() {
        let components = components(10);
        let user = register(&components, WALLET_A).await;

        components
            .intake
            .submit(submission(
                &user,
                DataType::ZomatoOrderHistory,
                zomato_orders(12, 450.0, "Mumbai"),
                Some("proof_rl_1"),
            ))
            .await
            .unwrap();
        let prior = components.store.by_user(&user.id).await.unwrap().remove(0);

        // 13 orders vs 12: inside the tolerance of 3
        let err = components
            .intake
            .submit(submission(
                &user,
                DataType::ZomatoOrderHistory,
                zomato_orders(13, 450.0, "Mumbai"),
                Some("proof_rl_2"),
            ))
            .await
            .unwrap_err();

        match err {
            IntakeError::RateLimited { retry_after } => {
                assert_eq!(retry_after, prior.created_at + Duration::hours(24));
            }
            other => panic!("expected rate limit, got {:?}", other),
        }

        // 15 orders vs 12 is different enough
        let receipt = components
            .intake
            .submit(submission(
                &user,
                DataType::ZomatoOrderHistory,
                zomato_orders(15, 450.0, "Mumbai"),
                Some("proof_rl_3"),
            ))
            .await
            .unwrap();
        assert_eq!(receipt.total_points, 60);
    }

    #[tokio::test]
    async fn test_other_data_type_is_not_rate_limited() {
        let components = components(10);
        let user = register(&components, WALLET_A).await;

        components
            .intake
            .submit(submission(
                &user,
                DataType::NetflixWatchHistory,
                json!({ "watchHistory": [{ "title": "A", "date": "2024-01-01" }] }),
                None,
            ))
            .await
            .unwrap();

        let receipt = components
            .intake
            .submit(submission(
                &user,
                DataType::ZomatoOrderHistory,
                json!({ "orders": [{ "amount": 100, "date": "2024-01-01" }] }),
                None,
            ))
            .await;
        assert!(receipt.is_ok());
    }

    #[tokio::test]
    async fn test_pipeline_failure_downgrades_to_raw() {
        let components = components(10);
        let user = register(&components, WALLET_A).await;

        let receipt = components
            .intake
            .submit(submission(
                &user,
                DataType::ZomatoOrderHistory,
                json!({ "note": "export failed halfway" }),
                Some("proof_raw"),
            ))
            .await
            .unwrap();

        assert_eq!(receipt.points_awarded, 10);
        assert!(!receipt.has_sellable_data);
        assert!(!receipt.is_large_data);
        assert!(receipt.cohort_id.is_none());
        assert_eq!(receipt.k_anonymity_compliant, None);

        let stored = components.store.by_user(&user.id).await.unwrap();
        assert_eq!(stored[0].processing_method, ProcessingMethod::Raw);
        assert!(stored[0].sellable_data.is_none());

        // Consent is still recorded for raw contributions
        let entry = components.consent.get_by_proof_id("proof_raw").await.unwrap();
        assert_eq!(entry.geo_region, "unknown");
        assert!(entry.cohort_id.is_none());
        assert!(components.cohorts.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_validation_rejects_before_any_state_change() {
        let components = components(10);
        let user = register(&components, WALLET_A).await;

        let mut request = submission(&user, DataType::ZomatoOrderHistory, json!({}), None);
        request.data_type = "myspace_friends".to_string();
        assert!(matches!(
            components.intake.submit(request).await,
            Err(IntakeError::Validation(_))
        ));

        let request = submission(&user, DataType::ZomatoOrderHistory, json!([1, 2, 3]), None);
        assert!(matches!(
            components.intake.submit(request).await,
            Err(IntakeError::Validation(_))
        ));

        let mut request = submission(&user, DataType::ZomatoOrderHistory, json!({}), None);
        request.user_id = "user_missing".to_string();
        assert!(matches!(
            components.intake.submit(request).await,
            Err(IntakeError::UserNotFound)
        ));

        assert!(components.store.by_user(&user.id).await.unwrap().is_empty());
        assert_eq!(components.consent.get_stats().await.total_entries, 0);
    }

    #[tokio::test]
    async fn test_concurrent_copies_of_one_proof_accept_once() {
        let components = components(10);
        let user = register(&components, WALLET_A).await;
        let intake = components.intake.clone();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let intake = intake.clone();
                let request = submission(
                    &user,
                    DataType::ZomatoOrderHistory,
                    zomato_orders(12, 450.0, "Chennai"),
                    Some("proof_race"),
                );
                tokio::spawn(async move { intake.submit(request).await })
            })
            .collect();

        let mut accepted = 0;
        for handle in futures::future::join_all(handles).await {
            match handle.unwrap() {
                Ok(_) => accepted += 1,
                Err(IntakeError::Duplicate { .. }) => {}
                Err(other) => panic!("unexpected outcome {:?}", other),
            }
        }

        assert_eq!(accepted, 1);
        let user = components.users.get_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(user.total_points, 30);
        assert_eq!(components.cohorts.get_count("zomato:chennai:mid:heavy").await, 1);
        assert_eq!(components.intake.tracked_user_locks(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_one_proof_from_many_users_accepts_once() {
        for round in 0..20 {
            let components = components(10);
            let mut users = Vec::new();
            for i in 0..8 {
                users.push(register(&components, &format!("0x{:040x}", i + 1)).await);
            }

            let handles: Vec<_> = users
                .iter()
                .map(|user| {
                    let intake = components.intake.clone();
                    let request = submission(
                        user,
                        DataType::ZomatoOrderHistory,
                        zomato_orders(12, 450.0, "Pune"),
                        Some("shared_proof"),
                    );
                    tokio::spawn(async move { intake.submit(request).await })
                })
                .collect();

            let mut accepted = 0;
            for handle in futures::future::join_all(handles).await {
                match handle.unwrap() {
                    Ok(_) => accepted += 1,
                    Err(IntakeError::Duplicate { .. }) => {}
                    Err(other) => panic!("round {}: unexpected outcome {:?}", round, other),
                }
            }

            assert_eq!(accepted, 1, "round {}", round);
            assert_eq!(components.consent.get_stats().await.total_entries, 1, "round {}", round);
            assert_eq!(components.cohorts.get_count("zomato:pune:mid:heavy").await, 1);
            assert_eq!(components.intake.tracked_user_locks(), 0);
        }
    }
}

// ============================================================================
// Cohorts and Consent
// ============================================================================

mod privacy {
    use super::*;

    #[tokio::test]
    async fn test_cohort_becomes_compliant_at_k() {
        let components = components(3);
        let mut receipts = Vec::new();

        for (i, wallet) in [WALLET_A, WALLET_B, WALLET_C].into_iter().enumerate() {
            let user = register(&components, wallet).await;
            let proof = format!("proof_k_{}", i);
            let receipt = components
                .intake
                .submit(submission(
                    &user,
                    DataType::ZomatoOrderHistory,
                    zomato_orders(12, 450.0, "Hyderabad"),
                    Some(proof.as_str()),
                ))
                .await
                .unwrap();
            receipts.push(receipt);
        }

        let sizes: Vec<u64> = receipts.iter().map(|r| r.cohort_size).collect();
        assert_eq!(sizes, vec![1, 2, 3]);
        assert_eq!(receipts[1].k_anonymity_compliant, Some(false));
        assert_eq!(receipts[2].k_anonymity_compliant, Some(true));

        let cohort = components
            .cohorts
            .get_cohort("zomato:hyderabad:mid:heavy")
            .await
            .unwrap();
        assert!(cohort.compliant);
        assert!(cohort.first_compliant_at.is_some());

        let stats = components.cohorts.get_stats().await;
        assert_eq!(stats.compliant_cohorts, 1);
        assert_eq!(stats.total_profiles, 3);
    }

    #[tokio::test]
    async fn test_consent_entries_never_hold_raw_identity() {
        let components = components(10);
        let user = register(&components, WALLET_A).await;

        components
            .intake
            .submit(submission(
                &user,
                DataType::ZomatoOrderHistory,
                zomato_orders(8, 250.0, "Kolkata"),
                Some("proof_hash"),
            ))
            .await
            .unwrap();

        let entries = components.consent.get_entries_by_user(&user.id).await;
        assert_eq!(entries.len(), 1);

        let entry = &entries[0];
        assert_eq!(entry.hashed_user_id, components.consent.hash_identity(&user.id));
        assert_ne!(entry.hashed_user_id, user.id);
        let hashed_wallet = entry.hashed_wallet.as_deref().unwrap();
        assert_eq!(hashed_wallet, components.consent.hash_identity(WALLET_A));

        let serialized = serde_json::to_string(entry).unwrap();
        assert!(!serialized.contains(&user.id));
        assert!(!serialized.contains(WALLET_A));

        assert_eq!(entry.geo_region, "kolkata");
        assert_eq!(entry.data_summary.record_count, 8);
        assert!(entry.verification.verified);
    }

    #[tokio::test]
    async fn test_audit_export_range() {
        let components = components(10);
        let user = register(&components, WALLET_A).await;

        components
            .intake
            .submit(submission(
                &user,
                DataType::GithubProfile,
                json!({ "contributionsLastYear": 320, "followers": 40, "publicRepos": 25 }),
                None,
            ))
            .await
            .unwrap();

        let now = chrono::Utc::now();
        assert_eq!(components.consent.export_for_audit(None, None).await.len(), 1);
        assert_eq!(
            components
                .consent
                .export_for_audit(Some(now - Duration::hours(1)), None)
                .await
                .len(),
            1
        );
        assert!(components
            .consent
            .export_for_audit(None, Some(now - Duration::hours(1)))
            .await
            .is_empty());
    }
}

// ============================================================================
// HTTP API
// ============================================================================

mod api_router {
    use super::*;

    fn app(components: &ApiComponents) -> Router {
        let security = SecurityState::new(SecurityMiddlewareConfig::from_config(&test_config(
            components.cohorts.k_threshold(),
        )));
        build_app(components, security)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn authed(method: &str, uri: &str, wallet: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer wallet_{}", wallet));
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    fn enterprise(uri: &str, key: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("x-api-key", key)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public_and_hardened() {
        let app = app(&components(10));
        let response = app.clone().oneshot(get("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
        assert_eq!(response.headers()["x-frame-options"], "DENY");
        assert!(response.headers().contains_key("x-ratelimit-limit"));
    }

    #[tokio::test]
    async fn test_user_routes_require_wallet_token() {
        let app = app(&components(10));

        let request = Request::builder()
            .method("POST")
            .uri("/api/auth/verify")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "unauthorized");

        let request = Request::builder()
            .uri("/api/user/profile")
            .header("authorization", "Bearer wallet_0x123")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_verify_profile_and_username() {
        let app = app(&components(10));

        let (status, body) = send(&app, authed("POST", "/api/auth/verify", WALLET_A, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["created"], true);
        assert_eq!(body["user"]["walletAddress"], WALLET_A);
        assert_eq!(body["user"]["totalPoints"], 0);

        let (_, body) = send(&app, authed("POST", "/api/auth/verify", WALLET_A, None)).await;
        assert_eq!(body["created"], false);

        let (status, body) = send(
            &app,
            authed("POST", "/api/user/username", WALLET_A, Some(json!({ "username": "ab" }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Username must be at least 3 characters");

        let (status, body) = send(
            &app,
            authed("POST", "/api/user/username", WALLET_A, Some(json!({ "username": "data_fan" }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "data_fan");

        send(&app, authed("POST", "/api/auth/verify", WALLET_B, None)).await;
        let (status, _) = send(
            &app,
            authed("POST", "/api/user/username", WALLET_B, Some(json!({ "username": "DATA_FAN" }))),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(&app, authed("GET", "/api/user/profile", WALLET_A, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["profile"]["username"], "data_fan");

        let (status, _) = send(&app, authed("GET", "/api/user/profile", WALLET_C, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_contribute_then_duplicate_then_list() {
        let app = app(&components(10));
        send(&app, authed("POST", "/api/auth/verify", WALLET_A, None)).await;

        let body = json!({
            "anonymizedData": zomato_orders(12, 450.0, "Bengaluru"),
            "dataType": "zomato_order_history",
            "reclaimProofId": "proof_http_1",
        });

        let (status, response) =
            send(&app, authed("POST", "/api/contribute", WALLET_A, Some(body.clone()))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["success"], true);
        assert_eq!(response["contribution"]["points_awarded"], 30);
        assert_eq!(response["contribution"]["cohort_id"], "zomato:bengaluru:mid:heavy");

        let (status, response) =
            send(&app, authed("POST", "/api/contribute", WALLET_A, Some(body))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(response["code"], "duplicate_submission");
        assert!(response["existing_contribution_id"].is_string());

        let (status, response) =
            send(&app, authed("GET", "/api/user/contributions", WALLET_A, None)).await;
        assert_eq!(status, StatusCode::OK);
        let contributions = response["contributions"].as_array().unwrap();
        assert_eq!(contributions.len(), 1);
        assert_eq!(contributions[0]["processingMethod"], "enterprise_pipeline");
        assert_eq!(contributions[0]["reclaimProofId"], "proof_http_1");
    }

    #[tokio::test]
    async fn test_contribute_rate_limited_sets_header() {
        let app = app(&components(10));
        send(&app, authed("POST", "/api/auth/verify", WALLET_A, None)).await;

        for (proof, expected) in [("p_1", StatusCode::OK), ("p_2", StatusCode::TOO_MANY_REQUESTS)] {
            let body = json!({
                "anonymizedData": zomato_orders(12, 450.0, "Goa"),
                "dataType": "zomato_order_history",
                "reclaimProofId": proof,
            });
            let request = authed("POST", "/api/contribute", WALLET_A, Some(body));
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), expected);

            if expected == StatusCode::TOO_MANY_REQUESTS {
                let retry: i64 = response.headers()["retry-after"].to_str().unwrap().parse().unwrap();
                assert!(retry > 0 && retry <= 24 * 3600);
            }
        }
    }

    #[tokio::test]
    async fn test_contribute_validation_and_unknown_user() {
        let app = app(&components(10));

        let body = json!({ "anonymizedData": { "orders": [] }, "dataType": "zomato_order_history" });
        let (status, _) = send(&app, authed("POST", "/api/contribute", WALLET_A, Some(body))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        send(&app, authed("POST", "/api/auth/verify", WALLET_A, None)).await;
        let body = json!({ "dataType": "zomato_order_history" });
        let (status, response) =
            send(&app, authed("POST", "/api/contribute", WALLET_A, Some(body))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["error"], "anonymizedData is required");
    }

    #[tokio::test]
    async fn test_enterprise_requires_exact_key() {
        let app = app(&components(10));

        let (status, _) = send(&app, get("/api/enterprise/cohorts")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, enterprise("/api/enterprise/cohorts", "test_enterprise_key")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(&app, enterprise("/api/enterprise/cohorts", ENTERPRISE_KEY)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["k_threshold"], 10);
        assert_eq!(body["stats"]["total_cohorts"], 0);
    }

    #[tokio::test]
    async fn test_dataset_hides_pending_cohorts() {
        let components = components(2);
        let app = app(&components);

        for (wallet, proof, city) in [
            (WALLET_A, "ds_1", "Jaipur"),
            (WALLET_B, "ds_2", "Jaipur"),
            (WALLET_C, "ds_3", "Surat"),
        ] {
            let user = register(&components, wallet).await;
            components
                .intake
                .submit(submission(
                    &user,
                    DataType::ZomatoOrderHistory,
                    zomato_orders(12, 450.0, city),
                    Some(proof),
                ))
                .await
                .unwrap();
        }

        let (status, body) = send(&app, enterprise("/api/enterprise/dataset", ENTERPRISE_KEY)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["dataset_info"]["total_records"], 2);
        for record in body["records"].as_array().unwrap() {
            assert_eq!(record["audience_segment"]["segment_id"], "zomato:jaipur:mid:heavy");
            assert_eq!(record["metadata"]["privacy_compliance"]["cohort_size"], 2);
            assert_eq!(record["metadata"]["privacy_compliance"]["k_anonymity_compliant"], true);
        }

        let (_, body) = send(
            &app,
            enterprise("/api/enterprise/dataset?include_pending=true&limit=10", ENTERPRISE_KEY),
        )
        .await;
        assert_eq!(body["dataset_info"]["total_records"], 3);

        let (status, _) = send(
            &app,
            enterprise("/api/enterprise/dataset?data_type=orkut", ENTERPRISE_KEY),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = send(&app, enterprise("/api/enterprise/insights", ENTERPRISE_KEY)).await;
        assert_eq!(body["insights"]["total_contributions"], 3);
        assert_eq!(body["insights"]["total_users"], 3);
        assert_eq!(body["insights"]["data_type_breakdown"]["zomato_order_history"], 3);
        assert_eq!(body["insights"]["compliant_cohorts"], 1);
        assert_eq!(body["insights"]["average_points_per_user"], 30);
        assert_eq!(body["insights"]["recent_activity"]["last_24_hours"], 3);
        assert_eq!(body["insights"]["recent_activity"]["last_7_days"], 3);
    }

    #[tokio::test]
    async fn test_enterprise_data_pages_without_identity() {
        let components = components(10);
        let app = app(&components);

        for (wallet, proof) in [(WALLET_A, "page_1"), (WALLET_B, "page_2"), (WALLET_C, "page_3")] {
            let user = register(&components, wallet).await;
            components
                .intake
                .submit(submission(
                    &user,
                    DataType::ZomatoOrderHistory,
                    zomato_orders(6, 300.0, "Indore"),
                    Some(proof),
                ))
                .await
                .unwrap();
        }

        let (status, body) = send(
            &app,
            enterprise("/api/enterprise/data?limit=2&offset=1", ENTERPRISE_KEY),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 3);
        assert_eq!(body["offset"], 1);
        assert_eq!(body["limit"], 2);
        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        for item in data {
            assert_eq!(item["data_type"], "zomato_order_history");
            assert!(item.get("user_id").is_none());
            assert!(item.get("wallet_address").is_none());
        }
        assert!(!body.to_string().contains(WALLET_A));

        let (_, body) = send(
            &app,
            enterprise("/api/enterprise/data?data_type=github_profile", ENTERPRISE_KEY),
        )
        .await;
        assert_eq!(body["total"], 0);

        let (status, _) = send(&app, get("/api/enterprise/data")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_points_balance_and_history() {
        let components = components(10);
        let app = app(&components);
        let user = register(&components, WALLET_A).await;

        let receipt = components
            .intake
            .submit(submission(
                &user,
                DataType::ZomatoOrderHistory,
                zomato_orders(12, 450.0, "Nagpur"),
                Some("points_proof"),
            ))
            .await
            .unwrap();

        let (status, body) = send(&app, authed("GET", "/api/user/points", WALLET_A, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["points"]["balance"], receipt.total_points);
        let history = body["points"]["history"].as_array().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["contributionId"], receipt.contribution_id.as_str());
        assert_eq!(history[0]["points"], receipt.points_awarded);

        let (status, _) = send(&app, authed("GET", "/api/user/points", WALLET_B, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_consent_ledger_export() {
        let components = components(10);
        let app = app(&components);
        let user = register(&components, WALLET_A).await;
        components
            .intake
            .submit(submission(
                &user,
                DataType::ZomatoOrderHistory,
                zomato_orders(5, 800.0, "Lucknow"),
                Some("ledger_proof"),
            ))
            .await
            .unwrap();

        let (status, body) =
            send(&app, enterprise("/api/enterprise/consent-ledger", ENTERPRISE_KEY)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stats"]["total_entries"], 1);
        assert_eq!(body["entries"].as_array().unwrap().len(), 1);
        assert!(body["exported_at"].is_string());

        let (_, body) = send(
            &app,
            enterprise(
                "/api/enterprise/consent-ledger?start_date=2000-01-01&end_date=2000-12-31",
                ENTERPRISE_KEY,
            ),
        )
        .await;
        assert!(body["entries"].as_array().unwrap().is_empty());

        let (status, _) = send(
            &app,
            enterprise("/api/enterprise/consent-ledger?start_date=yesterday", ENTERPRISE_KEY),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_proof_callback_then_claim() {
        let app = app(&components(10));

        let callback = json!({
            "proofs": [{
                "identifier": "proof_cb_1",
                "claimData": {
                    "context": "{\"extractedParameters\":{\"city\":\"Pune\"}}"
                }
            }],
            "context": format!("{{\"walletAddress\":\"{}\",\"provider\":\"zomato\"}}", WALLET_A),
        });
        let request = Request::builder()
            .method("POST")
            .uri("/api/reclaim/callback")
            .header("content-type", "application/json")
            .body(Body::from(callback.to_string()))
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["proofId"], "proof_cb_1");

        let (_, body) = send(&app, get("/api/reclaim/proof/proof_cb_1")).await;
        assert_eq!(body["success"], true);

        let uri = format!("/api/reclaim/pending/{}/zomato", WALLET_A);
        let (_, body) = send(&app, get(&uri)).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["contribution"]["proof_id"], "proof_cb_1");
        assert_eq!(body["contribution"]["attributes"]["city"], "Pune");

        // Claimed proofs are gone
        let (_, body) = send(&app, get(&uri)).await;
        assert_eq!(body["success"], false);

        let request = Request::builder()
            .method("POST")
            .uri("/api/reclaim/callback")
            .body(Body::from("{}"))
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No proofs provided");
    }

    #[tokio::test]
    async fn test_leaderboard_orders_by_points() {
        let components = components(10);
        let app = app(&components);

        let alice = register(&components, WALLET_A).await;
        let bob = register(&components, WALLET_B).await;
        components.users.record_contribution(&alice.id, 30).await.unwrap();
        components.users.record_contribution(&bob.id, 250).await.unwrap();

        let (status, body) = send(&app, get("/api/leaderboard?limit=5")).await;
        assert_eq!(status, StatusCode::OK);

        let board = body["leaderboard"].as_array().unwrap();
        assert_eq!(board.len(), 2);
        assert_eq!(board[0]["rank"], 1);
        assert_eq!(board[0]["totalPoints"], 250);
        assert_eq!(board[0]["league"], "Silver");
        assert_eq!(board[0]["walletAddress"], "0xbbbb...bbbb");
        assert_eq!(board[1]["totalPoints"], 30);
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let components = components(10);
        let mut config = test_config(10);
        config.security.max_request_size = 64;
        let app = build_app(
            &components,
            SecurityState::new(SecurityMiddlewareConfig::from_config(&config)),
        );

        let payload = "x".repeat(200);
        let request = Request::builder()
            .method("POST")
            .uri("/api/reclaim/callback")
            .header("content-length", payload.len())
            .body(Body::from(payload))
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }
}

#[tokio::test]
async fn test_components_share_state() {
    let components = components(10);
    let shared = Arc::clone(&components.users);
    register(&components, WALLET_A).await;
    assert_eq!(shared.count().await.unwrap(), 1);
}
