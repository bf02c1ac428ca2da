//! API HTTP (axum) au-dessus de `NetlensService`

use crate::error::{IngestError, QueryError};
use crate::models::DecodedPacket;
use crate::services::query::PacketQuery;
use crate::services::NetlensService;
use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::{error, info};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

type SharedService = Arc<NetlensService>;

/// Nombre maximal d'ingestions listées par requête
const MAX_RUNS_LIMIT: usize = 1000;

/// Erreur convertie en réponse `{detail}`
#[derive(Debug)]
pub enum ApiError {
    Query(QueryError),
    Ingest(IngestError),
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        ApiError::Query(e)
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        ApiError::Ingest(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Query(QueryError::Validation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Query(QueryError::NoData) | ApiError::Query(QueryError::RunNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Query(QueryError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Ingest(IngestError::Empty) | ApiError::Ingest(IngestError::Decode(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Ingest(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> String {
        match self {
            ApiError::Query(e) => e.to_string(),
            ApiError::Ingest(e) => e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Erreur interne: {}", self.detail());
        }
        (status, Json(json!({ "detail": self.detail() }))).into_response()
    }
}

/// Paramètres de requête ; un rejet d'axum devient une erreur de validation
fn query_params<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    params
        .map(|Query(params)| params)
        .map_err(|rejection| QueryError::Validation(rejection.body_text()).into())
}

/// Sélection optionnelle d'une ingestion (`?fileId=`)
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSelector {
    pub file_id: Option<String>,
}

impl RunSelector {
    fn run(&self) -> Option<&str> {
        self.file_id.as_deref().filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RunsQuery {
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

/// Corps de `POST /api/runs`
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub name: Option<String>,
    pub packets: Vec<DecodedPacket>,
}

pub fn create_router(service: SharedService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/summary", get(summary))
        .route("/api/packets", get(packets))
        .route("/api/ip-mac-map", get(ip_mac_map))
        .route("/api/connections", get(connections))
        .route("/api/runs", get(list_runs).post(create_run))
        .route("/api/runs/:id", get(run_info))
        .with_state(service)
}

/// Démarre le serveur et attend Ctrl+C
pub async fn serve(service: SharedService, addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API HTTP à l'écoute sur {}", listener.local_addr()?);
    axum::serve(listener, create_router(service))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Impossible d'écouter le signal d'arrêt: {}", e);
            }
            info!("Arrêt du serveur HTTP");
        })
        .await
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn summary(
    State(service): State<SharedService>,
    selector: Result<Query<RunSelector>, QueryRejection>,
) -> Result<Response, ApiError> {
    let selector = query_params(selector)?;
    let report = service.summary(selector.run()).await?;
    Ok(Json(report).into_response())
}

pub async fn packets(
    State(service): State<SharedService>,
    query: Result<Query<PacketQuery>, QueryRejection>,
) -> Response {
    let query = match query_params(query) {
        Ok(query) => query,
        Err(e) => return e.into_response(),
    };
    match service.packets(&query).await {
        Ok(page) => Json(page).into_response(),
        // Liste vide explicite quand rien n'a encore été ingéré
        Err(QueryError::NoData) => {
            let config = service.config();
            let per_page = query
                .per_page
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(config.default_per_page)
                .min(config.max_per_page);
            (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "items": [],
                    "total": 0,
                    "page": query.page.unwrap_or(1),
                    "perPage": per_page,
                    "detail": QueryError::NoData.to_string(),
                })),
            )
                .into_response()
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

pub async fn ip_mac_map(
    State(service): State<SharedService>,
    selector: Result<Query<RunSelector>, QueryRejection>,
) -> Result<Response, ApiError> {
    let selector = query_params(selector)?;
    let items = service.ip_mac_map(selector.run()).await?;
    Ok(Json(json!({ "items": items })).into_response())
}

pub async fn connections(
    State(service): State<SharedService>,
    selector: Result<Query<RunSelector>, QueryRejection>,
) -> Result<Response, ApiError> {
    let selector = query_params(selector)?;
    let items = service.connections(selector.run()).await?;
    Ok(Json(json!({ "items": items, "total": items.len() })).into_response())
}

pub async fn list_runs(
    State(service): State<SharedService>,
    query: Result<Query<RunsQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let query = query_params(query)?;
    let limit = query.limit.unwrap_or(100).clamp(1, MAX_RUNS_LIMIT);
    let runs = service.list_runs(query.skip.unwrap_or(0), limit).await?;
    Ok(Json(json!({ "items": runs, "total": runs.len() })).into_response())
}

pub async fn run_info(
    State(service): State<SharedService>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let info = service.run_info(&id).await?;
    Ok(Json(info).into_response())
}

pub async fn create_run(
    State(service): State<SharedService>,
    Json(request): Json<IngestRequest>,
) -> Result<Response, ApiError> {
    let name = request.name.unwrap_or_else(|| "upload.json".to_string());
    let info = service.ingest(&name, request.packets).await?;
    Ok((StatusCode::CREATED, Json(info)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, StorageConfig};
    use crate::enrichment::cache::SystemClock;
    use crate::enrichment::dns::NoReverseDns;
    use crate::enrichment::vendor::OuiDatabase;
    use crate::enrichment::Enricher;
    use crate::error::StorageError;
    use crate::storage::MemoryStore;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn service() -> SharedService {
        let config = Config {
            storage: StorageConfig::Memory,
            ..Config::default()
        };
        let enricher = Enricher::with_sources(
            &config.enrichment,
            Arc::new(OuiDatabase::builtin()),
            Arc::new(NoReverseDns),
            Arc::new(SystemClock),
        );
        Arc::new(NetlensService::new(config, Arc::new(MemoryStore::new()), enricher))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn upload() -> IngestRequest {
        let packets = serde_json::from_value(json!([
            {"timestamp": "2024-01-01T10:00:00Z", "length": 100, "srcIp": "10.0.0.1", "dstIp": "10.0.0.2",
             "transport": {"type": "TCP", "sport": 1234, "dport": 443, "flags": "S"}},
            {"timestamp": "2024-01-01T10:00:01Z", "length": 60, "srcIp": "10.0.0.2", "dstIp": "10.0.0.1",
             "transport": {"type": "UDP", "sport": 5353, "dport": 5353}}
        ]))
        .unwrap();
        IngestRequest {
            name: Some("test.json".into()),
            packets,
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(QueryError::Validation("page".into())).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(ApiError::from(QueryError::NoData).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(QueryError::RunNotFound("x".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(QueryError::Storage(StorageError::Unavailable("db".into()))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::from(IngestError::Empty).status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_packets_without_data() {
        let response = packets(State(service()), Ok(Query(PacketQuery::default()))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["total"], 0);
        assert_eq!(body["perPage"], 25);
        assert!(body["items"].as_array().unwrap().is_empty());
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn test_upload_then_read() {
        let service = service();
        let response = create_run(State(service.clone()), Json(upload())).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let run_id = body_json(response).await["id"].as_str().unwrap().to_string();

        let response = summary(State(service.clone()), Ok(Query(RunSelector::default()))).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body["overview"]["totalPackets"], 2);
        assert_eq!(body["sizeHistogram"].as_array().unwrap().len(), 4);

        let query = PacketQuery {
            protocol: Some("mdns".into()),
            file_id: Some(run_id),
            ..PacketQuery::default()
        };
        let body = body_json(packets(State(service.clone()), Ok(Query(query))).await).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["items"][0]["proto"], "mDNS");

        let body = body_json(connections(State(service.clone()), Ok(Query(RunSelector::default()))).await.unwrap()).await;
        assert_eq!(body["total"], 1);

        let body = body_json(list_runs(State(service), Ok(Query(RunsQuery::default()))).await.unwrap()).await;
        assert_eq!(body["items"][0]["name"], "test.json");
    }

    #[tokio::test]
    async fn test_errors_carry_detail() {
        let service = service();
        let err = summary(
            State(service.clone()),
            Ok(Query(RunSelector {
                file_id: Some("absent".into()),
            })),
        )
        .await
        .unwrap_err();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_json(response).await["detail"].as_str().unwrap().contains("absent"));

        let empty = IngestRequest {
            name: None,
            packets: Vec::new(),
        };
        let err = create_run(State(service), Json(empty)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    async fn get_json(router: &Router, uri: &str) -> (StatusCode, Value) {
        let response = router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        (status, body_json(response).await)
    }

    #[tokio::test]
    async fn test_router_serves_every_read() {
        let service = service();
        service.ingest("routeur.json", upload().packets).await.unwrap();
        let router = create_router(service);

        let (status, body) = get_json(&router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = get_json(&router, "/api/ip-mac-map").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["items"].is_array());

        let (status, body) = get_json(&router, "/api/summary").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["overview"]["totalPackets"], 2);

        let (status, body) = get_json(&router, "/api/packets?page=1&perPage=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);

        let (status, _) = get_json(&router, "/api/connections").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_malformed_parameters_are_unprocessable() {
        let router = create_router(service());

        let (status, body) = get_json(&router, "/api/packets?page=abc").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].is_string());

        let (status, body) = get_json(&router, "/api/runs?limit=-1").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].is_string());

        let (status, _) = get_json(&router, "/api/packets?page=0").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_run_metadata_route() {
        let service = service();
        let stored = service.ingest("meta.json", upload().packets).await.unwrap();
        let router = create_router(service);

        let (status, body) = get_json(&router, &format!("/api/runs/{}", stored.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "meta.json");
        assert_eq!(body["packetCount"], 2);

        let (status, body) = get_json(&router, "/api/runs/inconnu").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["detail"].as_str().unwrap().contains("inconnu"));

        let (status, body) = get_json(&router, "/api/runs/mauvais.id").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].is_string());
    }
}
