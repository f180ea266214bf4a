use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use log::info;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use voxelworld_lib::transfer::{ExportResult, ImportResult};
use voxelworld_lib::web::dto::{self, CreateLayer, ErrorBody, ExportRequest, ImportRequest};

use crate::chunk::cache::SweepResult;
use crate::err::WorldError;
use crate::ident::area::Area;
use crate::ident::hex::HexVector2;
use crate::layer::origin;
use crate::layer::store::NewLayer;
use crate::schema::service::MigrationResult;
use crate::serve::Services;

type AppState = Arc<Services>;

impl IntoResponse for WorldError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            error: self.to_string(),
            retryable: self.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

pub(crate) fn router(services: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "voxelworld" }))
        .route("/worlds/:world_id/layers", get(layers).post(create_layer))
        .route("/worlds/:world_id/layers/:layer_id/areas/:area", delete(clear_area))
        .route("/worlds/:world_id/origin/:x/:y/:z", get(block_origin))
        .route("/worlds/:world_id/chunks/:chunk_key", get(chunk))
        .route("/worlds/:world_id/areas/:area/regenerate", post(regenerate_area))
        .route("/grid/:cell", get(grid_cell))
        .route("/admin/export", post(export))
        .route("/admin/import", post(import))
        .route("/admin/storage/:storage_id/migrate", post(migrate_storage))
        .route("/admin/sweep", post(sweep))
        .with_state(services)
}

pub(crate) async fn init(services: AppState) -> Result<(), WorldError> {
    let origin = services
        .settings
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|_| WorldError::Validation(format!("invalid CORS origin '{}'", services.settings.cors_origin)))?;
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_origin(origin);
    let port = services.settings.web_port;
    let app = router(services).layer(cors);

    info!("Starting up web server on port {port}...");
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port))).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

async fn layers(
    State(services): State<AppState>,
    Path(world_id): Path<String>,
) -> Result<Json<Vec<dto::Layer>>, WorldError> {
    let layers = services.layers.find_by_world_id(&world_id).await?;
    Ok(Json(layers.iter().map(|layer| layer.to_dto()).collect()))
}

async fn create_layer(
    State(services): State<AppState>,
    Path(world_id): Path<String>,
    Json(request): Json<CreateLayer>,
) -> Result<(StatusCode, Json<dto::Layer>), WorldError> {
    let layer = services
        .layers
        .create_layer(&world_id, NewLayer::from_dto(request)?)
        .await?;
    Ok((StatusCode::CREATED, Json(layer.to_dto())))
}

async fn clear_area(
    State(services): State<AppState>,
    Path((world_id, layer_id, area)): Path<(String, String, String)>,
) -> Result<Json<dto::ClearedArea>, WorldError> {
    let area = Area::parse(&area)?;
    let cleared = services.layers.clear_area(&world_id, &layer_id, &area).await?;
    Ok(Json(dto::ClearedArea {
        layer_id,
        area: area.to_string(),
        removed_blocks: cleared.blocks,
        chunks: cleared.chunks,
    }))
}

async fn block_origin(
    State(services): State<AppState>,
    Path((world_id, x, y, z)): Path<(String, i32, i32, i32)>,
) -> Result<Json<dto::BlockOrigin>, WorldError> {
    let found = services.resolver.find_block_origin(&world_id, x, y, z).await?;
    Ok(Json(match found {
        Some(found) => found.to_dto(),
        None => origin::not_found(&world_id, x, y, z),
    }))
}

async fn chunk(
    State(services): State<AppState>,
    Path((world_id, chunk_key)): Path<(String, String)>,
) -> Result<Json<dto::Chunk>, WorldError> {
    let chunk = services.cache.get_chunk(&world_id, &chunk_key).await?;
    Ok(Json(chunk.to_dto()))
}

async fn regenerate_area(
    State(services): State<AppState>,
    Path((world_id, area)): Path<(String, String)>,
) -> Result<Json<SweepResult>, WorldError> {
    let area = Area::parse(&area)?;
    Ok(Json(services.cache.regenerate_area(&world_id, &area).await?))
}

async fn grid_cell(Path(cell): Path<String>) -> Result<Json<dto::GridCell>, WorldError> {
    let cell = HexVector2::parse(&cell)?;
    Ok(Json(dto::GridCell {
        cell: cell.to_string(),
        neighbors: cell.neighbors()?.iter().map(ToString::to_string).collect(),
        distance: cell.distance(&HexVector2::new(0, 0)),
    }))
}

async fn export(
    State(services): State<AppState>,
    Json(request): Json<ExportRequest>,
) -> Result<Json<ExportResult>, WorldError> {
    let result = services
        .transfer
        .export_collection(&request.collection, &PathBuf::from(&request.file), request.world_id.as_deref())
        .await?;
    Ok(Json(result))
}

async fn import(
    State(services): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> Result<Json<ImportResult>, WorldError> {
    let result = services
        .transfer
        .import_collection(
            &request.collection,
            &PathBuf::from(&request.file),
            request.world_id.as_deref(),
            request.mode,
        )
        .await?;
    Ok(Json(result))
}

async fn migrate_storage(
    State(services): State<AppState>,
    Path(storage_id): Path<String>,
) -> Result<Json<MigrationResult>, WorldError> {
    Ok(Json(services.migrations.migrate_storage(&storage_id).await?))
}

async fn sweep(State(services): State<AppState>) -> Json<SweepResult> {
    Json(services.cache.sweep().await)
}
