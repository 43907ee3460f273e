use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use shardplane::config::ControlPlaneConfig;
use shardplane::control_plane::ControlPlane;
use shardplane::router::{RouterCache, TopologySource};
use shardplane::web::{control_plane_router, routing_router};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

async fn seeded() -> ControlPlane {
    ControlPlane::bootstrap(&ControlPlaneConfig::new().seed_demo(true))
        .await
        .expect("seeded control plane")
}

#[tokio::test]
async fn placement_and_shard_map_round_trip_over_http() {
    let router = control_plane_router(seeded().await);

    let created = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/placement/plan",
            json!({
                "fleetId": "f-new",
                "preferredRegions": ["us-east-1"],
                "hotnessScore": 50,
                "residency": "any",
                "tier": "gold",
                "durability": "platinum"
            }),
        ))
        .await
        .expect("placement response");
    assert_eq!(created.status(), StatusCode::CREATED);
    let shard = decode_json(created).await;
    assert_eq!(shard["shardId"], "shard-us-east-1-50");
    assert_eq!(shard["commitPolicy"], "global-quorum");
    assert_eq!(shard["replicationLane"], "streaming+archive");
    assert_eq!(shard["quota"]["maxQps"], 20_000);

    let listed = router
        .clone()
        .oneshot(get_request("/shard-map"))
        .await
        .expect("shard map response");
    assert_eq!(listed.status(), StatusCode::OK);
    let map = decode_json(listed).await;
    assert_eq!(map.as_array().expect("array").len(), 3);
}

#[tokio::test]
async fn error_kinds_map_to_http_statuses() {
    let router = control_plane_router(seeded().await);

    let bad_enum = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/placement/plan",
            json!({ "fleetId": "f-x", "hotnessScore": 1, "residency": "mars-only" }),
        ))
        .await
        .expect("response");
    assert_eq!(bad_enum.status(), StatusCode::BAD_REQUEST);
    assert_eq!(decode_json(bad_enum).await["code"], "validation_error");

    let missing = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/failover/plan",
            json!({ "shardId": "shard-zz", "promoteRegion": "us-west-2" }),
        ))
        .await
        .expect("response");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let body = decode_json(missing).await;
    assert_eq!(body["code"], "not_found");
    assert!(body["error"].as_str().expect("message").contains("shard-zz"));

    let out_of_order = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/failover/advance",
            json!({ "shardId": "shard-a1", "command": { "step": "promote" } }),
        ))
        .await
        .expect("response");
    assert_eq!(out_of_order.status(), StatusCode::CONFLICT);
    assert_eq!(decode_json(out_of_order).await["code"], "conflict");

    let malformed = router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/policies")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn failover_plan_and_execution_over_http() {
    let router = control_plane_router(seeded().await);

    let planned = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/failover/plan",
            json!({ "shardId": "shard-a1", "promoteRegion": "us-west-2" }),
        ))
        .await
        .expect("plan response");
    assert_eq!(planned.status(), StatusCode::OK);
    let plan = decode_json(planned).await;
    let steps = plan["steps"].as_array().expect("steps");
    assert_eq!(steps.len(), 5);
    assert_eq!(steps[3]["name"], "update-map");
    assert!(
        steps[2]["description"]
            .as_str()
            .expect("description")
            .contains("us-west-2")
    );

    for command in [
        json!({ "step": "declare", "promoteRegion": "us-west-2" }),
        json!({ "step": "promote" }),
        json!({ "step": "update-map" }),
        json!({ "step": "verify", "primaryLsn": 77, "replicaLsns": [77] }),
    ] {
        let response = router
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/failover/advance",
                json!({ "shardId": "shard-a1", "command": command }),
            ))
            .await
            .expect("advance response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let events = decode_json(
        router
            .clone()
            .oneshot(get_request("/events"))
            .await
            .expect("events response"),
    )
    .await;
    let types: Vec<&str> = events
        .as_array()
        .expect("events")
        .iter()
        .map(|event| event["type"].as_str().expect("type"))
        .collect();
    assert_eq!(
        types,
        vec![
            "failover.planned",
            "failover.declared",
            "failover.promoting",
            "failover.map_updated",
            "failover.completed",
        ]
    );

    let detect = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/failover/detect",
            json!({ "shardId": "shard-a1", "walBacklog": 16, "replicaLagSecs": 0 }),
        ))
        .await
        .expect("detect response");
    assert_eq!(detect.status(), StatusCode::OK);
    assert_eq!(decode_json(detect).await["degraded"], true);
}

#[tokio::test]
async fn policies_and_catalog_over_http() {
    let router = control_plane_router(seeded().await);

    let submitted = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/policies",
            json!({ "durability": "platinum", "consistency": "strong", "tier": "gold" }),
        ))
        .await
        .expect("policy response");
    assert_eq!(submitted.status(), StatusCode::CREATED);
    let body = decode_json(submitted).await;
    assert_eq!(body["validation"]["ok"], true);
    assert_eq!(body["policy"]["version"], 1);
    assert_eq!(body["policy"]["residency"], "any");
    assert_eq!(
        body["validation"]["notes"].as_array().expect("notes").len(),
        1
    );

    let tenant = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/tenants",
            json!({ "name": "Initech", "slaTier": "bronze" }),
        ))
        .await
        .expect("tenant response");
    assert_eq!(tenant.status(), StatusCode::CREATED);
    let tenant_id = decode_json(tenant).await["id"]
        .as_str()
        .expect("tenant id")
        .to_string();

    let fleet = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/fleets",
            json!({ "tenantId": tenant_id, "name": "Initech HQ", "preferredRegions": ["eu-west-1"] }),
        ))
        .await
        .expect("fleet response");
    assert_eq!(fleet.status(), StatusCode::CREATED);

    let acme_fleets = decode_json(
        router
            .clone()
            .oneshot(get_request("/fleets?tenantId=t-acme"))
            .await
            .expect("fleets response"),
    )
    .await;
    assert_eq!(acme_fleets.as_array().expect("fleets").len(), 2);

    let orphan = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/fleets",
            json!({ "tenantId": "t-ghost", "name": "Ghost" }),
        ))
        .await
        .expect("orphan response");
    assert_eq!(orphan.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn router_routes_and_reports_missing_fleets() {
    let control = seeded().await;
    let cache = Arc::new(RouterCache::new(
        Arc::new(TopologySource::new(control.topology.clone())),
        Duration::from_secs(5),
        Duration::from_secs(1),
    ));
    let router = routing_router(cache);

    let routed = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/route",
            json!({
                "tenantId": "t-acme",
                "fleetId": "f-acme-ny",
                "op": "write",
                "requestId": "req-fixed"
            }),
        ))
        .await
        .expect("route response");
    assert_eq!(routed.status(), StatusCode::OK);
    let decision = decode_json(routed).await;
    assert_eq!(decision["targetNodeId"], "n-a1-primary");
    assert_eq!(decision["requestId"], "req-fixed");
    assert_eq!(decision["consistencyTier"], "gold");
    assert!(decision["cacheAgeMs"].is_u64());

    let missing = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/route",
            json!({ "tenantId": "t-acme", "fleetId": "f-nowhere", "op": "read" }),
        ))
        .await
        .expect("route response");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(decode_json(missing).await["code"], "not_found");

    let health = router
        .oneshot(get_request("/health"))
        .await
        .expect("health response");
    assert_eq!(health.status(), StatusCode::OK);
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

async fn decode_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
