//! HTTP surface: routes, handlers, and response assembly.

use crate::auth;
use crate::error::ApiError;
use crate::execute;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use quarry_audit::{AuditEntry, AuditQuery, DEFAULT_WINDOW_HOURS};
use quarry_core::{Operation, truncate_digest};
use quarry_engine::{
    EngineError, MUTATION_ROW_ESTIMATE, TableCatalog, build_mutation_spec, build_query_spec,
    check_write, column_schema, compile_count, compile_delete, compile_insert, compile_select,
    compile_update,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/_tables", get(list_tables))
        .route("/api/_tables/refresh", post(refresh_tables))
        .route("/api/_tables/{table}/schema", get(table_schema))
        .route("/api/_audit", get(audit_list))
        .route("/api/_audit/summary", get(audit_summary))
        .route(
            "/api/{table}",
            get(read_table)
                .post(create_rows)
                .patch(update_rows)
                .delete(delete_rows),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Read response envelope.
#[derive(Debug, Serialize)]
struct ReadResponse {
    data: Vec<serde_json::Value>,
    total: u64,
    page: u64,
    #[serde(rename = "pageSize")]
    page_size: u32,
}

/// Mutation response envelope.
#[derive(Debug, Serialize)]
struct MutationResponse {
    success: bool,
    #[serde(rename = "affectedRows")]
    affected_rows: u64,
    data: Vec<serde_json::Value>,
    message: String,
    operation: &'static str,
    table: String,
    timestamp: DateTime<Utc>,
}

/// Mutation request body for CREATE/UPDATE; DELETE may omit it entirely.
#[derive(Debug, Default, Deserialize)]
struct MutationBody {
    #[serde(default)]
    data: Option<serde_json::Map<String, serde_json::Value>>,

    #[serde(default, rename = "returnColumns")]
    return_columns: Vec<String>,
}

async fn healthz(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "ok": true,
        "service": "quarry-server",
        "tables": state.catalog.snapshot().len(),
    }))
}

async fn read_table(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<ReadResponse>, ApiError> {
    let catalog = state.catalog.snapshot();
    let spec = build_query_spec(&table, &params, &catalog)
        .map_err(|e| map_engine_error(&state, e))?;

    let select = compile_select(&spec);
    let count = compile_count(&spec);

    let data = execute::fetch_rows(&state.pool, &select)
        .await
        .map_err(|e| map_engine_error(&state, e))?;
    let total = execute::fetch_count(&state.pool, &count)
        .await
        .map_err(|e| map_engine_error(&state, e))?;

    Ok(Json(ReadResponse {
        data,
        total,
        page: spec.offset / u64::from(spec.limit) + 1,
        page_size: spec.limit,
    }))
}

async fn create_rows(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    Json(body): Json<MutationBody>,
) -> Result<Json<MutationResponse>, ApiError> {
    mutate(state, table, Operation::Create, body, params, headers).await
}

async fn update_rows(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    Json(body): Json<MutationBody>,
) -> Result<Json<MutationResponse>, ApiError> {
    mutate(state, table, Operation::Update, body, params, headers).await
}

async fn delete_rows(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: Option<Json<MutationBody>>,
) -> Result<Json<MutationResponse>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    mutate(state, table, Operation::Delete, body, params, headers).await
}

/// Shared mutation path: validate, enforce permissions, compile, execute,
/// and record the attempt. The audit entry is written for every attempt,
/// including ones rejected before any SQL existed.
async fn mutate(
    state: Arc<AppState>,
    table: String,
    operation: Operation,
    body: MutationBody,
    params: Vec<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<MutationResponse>, ApiError> {
    let digest = auth::extract_key_digest(&headers, &params);
    let outcome =
        run_mutation_pipeline(&state, &table, operation, &body, &params, digest.as_deref()).await;

    let audit_digest = digest
        .as_deref()
        .map(truncate_digest)
        .unwrap_or_else(|| "anonymous".to_string());
    let mut builder = AuditEntry::builder(audit_digest, operation, &table)
        .filters(filter_params_json(&params));
    if let Some(data) = &body.data {
        builder = builder.data(serde_json::Value::Object(data.clone()));
    }
    if let Some(addr) = client_address(&headers) {
        builder = builder.client_address(addr);
    }
    if let Some(agent) = headers.get("user-agent").and_then(|v| v.to_str().ok()) {
        builder = builder.user_agent(agent);
    }
    let entry = match &outcome {
        Ok((affected, _)) => builder.affected_rows(*affected).success(true).build(),
        Err(err) => builder.error_message(err.to_string()).build(),
    };
    state.audit.record_detached(entry);

    match outcome {
        Ok((affected_rows, data)) => Ok(Json(MutationResponse {
            success: true,
            affected_rows,
            message: format!("{} affected {} row(s)", operation, affected_rows),
            data,
            operation: operation.as_str(),
            table,
            timestamp: Utc::now(),
        })),
        Err(err) => Err(map_engine_error(&state, err)),
    }
}

async fn run_mutation_pipeline(
    state: &AppState,
    table: &str,
    operation: Operation,
    body: &MutationBody,
    params: &[(String, String)],
    digest: Option<&str>,
) -> Result<(u64, Vec<serde_json::Value>), EngineError> {
    let catalog = state.catalog.snapshot();
    let spec = build_mutation_spec(
        table,
        operation,
        body.data.as_ref(),
        &body.return_columns,
        params,
        &catalog,
    )?;

    let digest = digest
        .ok_or_else(|| EngineError::Forbidden("no API key provided".to_string()))?;
    // CREATE inserts exactly one row; UPDATE/DELETE use the fixed
    // conservative pre-check estimate.
    let estimate = match operation {
        Operation::Create => 1,
        Operation::Update | Operation::Delete => MUTATION_ROW_ESTIMATE,
    };
    check_write(&state.permissions, digest, operation, spec.table.as_str(), estimate)?;

    let stmt = match operation {
        Operation::Create => compile_insert(&spec)?,
        Operation::Update => compile_update(&spec)?,
        Operation::Delete => compile_delete(&spec)?,
    };
    execute::run_mutation(&state.pool, &stmt).await
}

async fn list_tables(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let catalog = state.catalog.snapshot();
    let tables: Vec<&str> = catalog.tables().collect();
    Json(json!({
        "tables": tables,
        "count": tables.len(),
    }))
}

async fn table_schema(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let catalog = state.catalog.snapshot();
    let columns = column_schema(&state.pool, &catalog, &table)
        .await
        .map_err(|e| map_engine_error(&state, e))?;
    Ok(Json(json!({
        "table": table,
        "columns": columns,
    })))
}

#[derive(Debug, Deserialize)]
struct RefreshParams {
    #[serde(rename = "apiKey")]
    api_key: Option<String>,
}

async fn refresh_tables(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RefreshParams>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_write_key(&state, &headers, params.api_key.as_deref())?;

    let catalog = TableCatalog::load(&state.pool).await.map_err(|e| {
        tracing::error!(error = %e, "catalog refresh failed");
        ApiError::internal("catalog refresh failed")
    })?;
    let count = catalog.len();
    state.catalog.swap(catalog);
    Ok(Json(json!({ "ok": true, "tables": count })))
}

#[derive(Debug, Deserialize)]
struct AuditListParams {
    table: Option<String>,
    operation: Option<String>,
    success: Option<bool>,
    hours: Option<i64>,
    limit: Option<usize>,
    offset: Option<usize>,
    #[serde(rename = "apiKey")]
    api_key: Option<String>,
}

async fn audit_list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditListParams>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_write_key(&state, &headers, params.api_key.as_deref())?;

    let operation = match &params.operation {
        Some(raw) => Some(raw.parse::<Operation>().map_err(ApiError::bad_request)?),
        None => None,
    };
    let hours = params.hours.unwrap_or(DEFAULT_WINDOW_HOURS).max(1);
    let filter = AuditQuery {
        table: params.table,
        operation,
        success: params.success,
        since: Utc::now() - chrono::Duration::hours(hours),
        until: None,
        limit: params.limit.unwrap_or(100),
        offset: params.offset.unwrap_or(0),
    };
    let entries = state.audit.query(filter).await.map_err(|e| {
        tracing::error!(error = %e, "audit query failed");
        ApiError::internal("audit query failed")
    })?;
    Ok(Json(json!({
        "count": entries.len(),
        "entries": entries,
    })))
}

#[derive(Debug, Deserialize)]
struct AuditSummaryParams {
    hours: Option<i64>,
    #[serde(rename = "apiKey")]
    api_key: Option<String>,
}

async fn audit_summary(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditSummaryParams>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_write_key(&state, &headers, params.api_key.as_deref())?;

    let summary = state.audit.summarize(params.hours).await.map_err(|e| {
        tracing::error!(error = %e, "audit summary failed");
        ApiError::internal("audit summary failed")
    })?;
    Ok(Json(serde_json::to_value(summary).unwrap_or_default()))
}

/// Gate for the catalog-refresh and audit-review endpoints: the caller must
/// present a key that has any write-permission record.
fn require_write_key(
    state: &AppState,
    headers: &HeaderMap,
    api_key_param: Option<&str>,
) -> Result<(), ApiError> {
    let params: Vec<(String, String)> = api_key_param
        .map(|k| vec![("apiKey".to_string(), k.to_string())])
        .unwrap_or_default();
    match auth::extract_key_digest(headers, &params) {
        Some(digest) if state.has_write_record(&digest) => Ok(()),
        _ => Err(ApiError::forbidden(
            "this endpoint requires a write-permissioned API key",
        )),
    }
}

fn map_engine_error(state: &AppState, err: EngineError) -> ApiError {
    if !err.is_client_error() {
        tracing::error!(kind = err.kind(), error = %err, "statement execution failed");
    }
    ApiError::from_engine(err, state.disclose_errors)
}

/// Request filter parameters as a JSON object for the audit row. Repeated
/// keys (`join` may appear several times) collect into an array. The API
/// key is the one parameter that must never be persisted.
fn filter_params_json(params: &[(String, String)]) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (key, value) in params {
        if key == "apiKey" {
            continue;
        }
        let value = serde_json::Value::String(value.clone());
        match map.get_mut(key) {
            None => {
                map.insert(key.clone(), value);
            }
            Some(serde_json::Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = serde_json::Value::Array(vec![first, value]);
            }
        }
    }
    serde_json::Value::Object(map)
}

fn client_address(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use quarry_audit::{AuditEntry, AuditQuery, AuditRecorder, AuditStorage, MemoryStorage};
    use quarry_core::WritePermissionSet;
    use quarry_core::config::WritePermissionEntry;
    use quarry_engine::SharedCatalog;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    fn test_state(permissions: WritePermissionSet) -> (Arc<AppState>, Arc<MemoryStorage>) {
        // Lazy pool: never connects unless a handler reaches the database,
        // which these tests are careful not to do.
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/quarry_test")
            .unwrap();
        let storage = Arc::new(MemoryStorage::new());
        let state = Arc::new(AppState {
            pool,
            catalog: SharedCatalog::new(TableCatalog::from_tables(["users", "orders"])),
            permissions,
            audit: AuditRecorder::new(storage.clone()),
            disclose_errors: false,
        });
        (state, storage)
    }

    fn app(permissions: WritePermissionSet) -> Router {
        router(test_state(permissions).0)
    }

    /// The trail write is detached from the response; yield until it lands.
    async fn recorded_entries(storage: &MemoryStorage, want: usize) -> Vec<AuditEntry> {
        for _ in 0..100 {
            let entries = storage.query(AuditQuery::default()).await.unwrap();
            if entries.len() >= want {
                return entries;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {want} audit entries to be recorded");
    }

    async fn send(app: Router, req: Request<Body>) -> StatusCode {
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let status = send(
            app(WritePermissionSet::default()),
            Request::get("/healthz").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_table_is_not_found() {
        let status = send(
            app(WritePermissionSet::default()),
            Request::get("/api/missing_table").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn out_of_range_limit_is_bad_request() {
        let status = send(
            app(WritePermissionSet::default()),
            Request::get("/api/users?limit=0").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn injection_signature_in_filter_is_bad_request() {
        let status = send(
            app(WritePermissionSet::default()),
            Request::get("/api/users?name_eq=a%27%3B%20DROP%20TABLE%20users")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn mutation_without_key_is_forbidden() {
        let req = Request::post("/api/users")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"data": {"name": "x"}}"#))
            .unwrap();
        let status = send(app(WritePermissionSet::default()), req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn update_without_filters_is_bad_request() {
        let entries = [WritePermissionEntry {
            api_key: Some("k".into()),
            api_key_digest: None,
            tables: vec!["*".into()],
            operations: vec![Operation::Update],
            max_records_per_operation: 10,
            rate_limit_per_minute: None,
        }];
        let permissions = WritePermissionSet::from_entries(&entries).unwrap();
        let req = Request::patch("/api/users")
            .header("x-api-key", "k")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"data": {"name": "x"}}"#))
            .unwrap();
        let status = send(app(permissions), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn audit_review_requires_write_key() {
        let status = send(
            app(WritePermissionSet::default()),
            Request::get("/api/_audit").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let status = send(
            app(WritePermissionSet::default()),
            Request::get("/api/_audit/summary").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn keyless_mutation_attempt_is_audited_as_failure() {
        let (state, storage) = test_state(WritePermissionSet::default());
        let req = Request::post("/api/users?note_eq=hello")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"data": {"name": "x"}}"#))
            .unwrap();
        let status = router(state).oneshot(req).await.unwrap().status();
        assert_eq!(status, StatusCode::FORBIDDEN);

        let entries = recorded_entries(&storage, 1).await;
        let entry = &entries[0];
        assert!(!entry.success);
        assert_eq!(entry.operation, Operation::Create);
        assert_eq!(entry.table, "users");
        assert_eq!(entry.affected_rows, 0);
        assert_eq!(entry.api_key_digest, "anonymous");
        assert!(entry.error_message.as_deref().unwrap().contains("API key"));
        // The request's filter parameters travel with the entry.
        assert_eq!(entry.filters.as_ref().unwrap()["note_eq"], "hello");
    }

    #[tokio::test]
    async fn pre_sql_rejection_is_audited_with_its_error() {
        let entries = [WritePermissionEntry {
            api_key: Some("k".into()),
            api_key_digest: None,
            tables: vec!["*".into()],
            operations: vec![Operation::Update],
            max_records_per_operation: 10,
            rate_limit_per_minute: None,
        }];
        let permissions = WritePermissionSet::from_entries(&entries).unwrap();
        let (state, storage) = test_state(permissions);

        // Unfiltered UPDATE fails validation before any SQL exists; the
        // attempt still lands in the trail.
        let req = Request::patch("/api/users")
            .header("x-api-key", "k")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"data": {"name": "x"}}"#))
            .unwrap();
        let status = router(state).oneshot(req).await.unwrap().status();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let recorded = recorded_entries(&storage, 1).await;
        let entry = &recorded[0];
        assert!(!entry.success);
        assert_eq!(entry.operation, Operation::Update);
        assert!(entry.error_message.as_deref().unwrap().contains("filter"));
        assert_ne!(entry.api_key_digest, "anonymous");
    }

    #[test]
    fn repeated_filter_params_are_all_recorded() {
        let params: Vec<(String, String)> = [
            ("join", "aId:orders:id:total"),
            ("join", "bId:users:id:name"),
            ("id_eq", "1"),
            ("apiKey", "secret"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let recorded = filter_params_json(&params);
        assert_eq!(
            recorded["join"],
            serde_json::json!(["aId:orders:id:total", "bId:users:id:name"])
        );
        assert_eq!(recorded["id_eq"], "1");
        assert!(recorded.get("apiKey").is_none());
    }

    #[tokio::test]
    async fn table_listing_is_open() {
        let status = send(
            app(WritePermissionSet::default()),
            Request::get("/api/_tables").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
}
