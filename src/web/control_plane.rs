use super::{Result, decode};
use crate::catalog::{NewFleet, NewTenant, TenantUpdate};
use crate::control_plane::ControlPlane;
use crate::core::{Fleet, NodeStatus, Region, ShardMapEntry, Tenant};
use crate::events::Event;
use crate::failover::{
    DetectOutcome, FailoverCommand, FailoverPlan, FailoverTransition, ShardHealthReport,
};
use crate::placement::PlacementRequest;
use crate::policy::{PolicyDocument, PolicyDraft, PolicySubmission};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FleetQuery {
    tenant_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TenantPatch {
    id: String,
    #[serde(flatten)]
    update: TenantUpdate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FailoverPlanBody {
    shard_id: String,
    promote_region: Region,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FailoverDetectBody {
    shard_id: String,
    #[serde(flatten)]
    report: ShardHealthReport,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FailoverAdvanceBody {
    shard_id: String,
    command: FailoverCommand,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeStatusBody {
    shard_id: String,
    node_id: String,
    status: NodeStatus,
}

/// HTTP surface of the control plane.
pub fn control_plane_router(control: ControlPlane) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tenants", get(list_tenants).post(create_tenant).patch(update_tenant))
        .route("/fleets", get(list_fleets).post(register_fleet))
        .route("/placement/plan", post(plan_placement))
        .route("/shard-map", get(shard_map))
        .route("/shards/node-status", post(report_node_status))
        .route("/failover/plan", post(plan_failover))
        .route("/failover/detect", post(detect_failover))
        .route("/failover/advance", post(advance_failover))
        .route("/policies", get(list_policies).post(submit_policy))
        .route("/events", get(list_events))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(control)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_tenants(State(control): State<ControlPlane>) -> Result<Json<Vec<Tenant>>> {
    Ok(Json(control.catalog.list_tenants().await?))
}

async fn create_tenant(
    State(control): State<ControlPlane>,
    body: Bytes,
) -> Result<(StatusCode, Json<Tenant>)> {
    let request: NewTenant = decode(&body)?;
    let tenant = control.catalog.create_tenant(request).await?;
    Ok((StatusCode::CREATED, Json(tenant)))
}

async fn update_tenant(State(control): State<ControlPlane>, body: Bytes) -> Result<Json<Tenant>> {
    let patch: TenantPatch = decode(&body)?;
    let tenant = control.catalog.update_tenant(&patch.id, patch.update).await?;
    Ok(Json(tenant))
}

async fn list_fleets(
    State(control): State<ControlPlane>,
    Query(query): Query<FleetQuery>,
) -> Result<Json<Vec<Fleet>>> {
    Ok(Json(control.catalog.list_fleets(query.tenant_id.as_deref()).await?))
}

async fn register_fleet(
    State(control): State<ControlPlane>,
    body: Bytes,
) -> Result<(StatusCode, Json<Fleet>)> {
    let request: NewFleet = decode(&body)?;
    let fleet = control.catalog.register_fleet(request).await?;
    Ok((StatusCode::CREATED, Json(fleet)))
}

async fn plan_placement(
    State(control): State<ControlPlane>,
    body: Bytes,
) -> Result<(StatusCode, Json<ShardMapEntry>)> {
    let request: PlacementRequest = decode(&body)?;
    let shard = control.placement.plan_placement(request).await?;
    Ok((StatusCode::CREATED, Json(shard)))
}

async fn shard_map(State(control): State<ControlPlane>) -> Result<Json<Vec<ShardMapEntry>>> {
    Ok(Json(control.topology.get_all().await?))
}

async fn report_node_status(
    State(control): State<ControlPlane>,
    body: Bytes,
) -> Result<Json<ShardMapEntry>> {
    let request: NodeStatusBody = decode(&body)?;
    let shard = control
        .failover
        .report_node_status(&request.shard_id, &request.node_id, request.status)
        .await?;
    Ok(Json(shard))
}

async fn plan_failover(
    State(control): State<ControlPlane>,
    body: Bytes,
) -> Result<Json<FailoverPlan>> {
    let request: FailoverPlanBody = decode(&body)?;
    let plan = control
        .failover
        .plan_failover(&request.shard_id, request.promote_region)
        .await?;
    Ok(Json(plan))
}

async fn detect_failover(
    State(control): State<ControlPlane>,
    body: Bytes,
) -> Result<Json<DetectOutcome>> {
    let request: FailoverDetectBody = decode(&body)?;
    let outcome = control
        .failover
        .detect(&request.shard_id, request.report)
        .await?;
    Ok(Json(outcome))
}

async fn advance_failover(
    State(control): State<ControlPlane>,
    body: Bytes,
) -> Result<Json<FailoverTransition>> {
    let request: FailoverAdvanceBody = decode(&body)?;
    let transition = control
        .failover
        .advance(&request.shard_id, request.command)
        .await?;
    Ok(Json(transition))
}

async fn list_policies(
    State(control): State<ControlPlane>,
) -> Result<Json<Vec<PolicyDocument>>> {
    Ok(Json(control.policies.get_policies().await?))
}

async fn submit_policy(
    State(control): State<ControlPlane>,
    body: Bytes,
) -> Result<(StatusCode, Json<PolicySubmission>)> {
    let draft: PolicyDraft = decode(&body)?;
    let submission = control.policies.submit_policy(draft).await?;
    Ok((StatusCode::CREATED, Json(submission)))
}

async fn list_events(State(control): State<ControlPlane>) -> Result<Json<Vec<Event>>> {
    Ok(Json(control.events.snapshot()?))
}
