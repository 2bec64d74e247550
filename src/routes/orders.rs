use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::audit::{RequestMeta, Source};
use crate::auth::extractor::AuthUser;
use crate::db;
use crate::error::AppError;
use crate::models::{Order, Visit};
use crate::routes::visits::{self, NewVisit};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct CreateOrder {
    pub id: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub visits: Vec<NewVisit>,
}

#[derive(Debug, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub visits: Vec<Visit>,
}

pub async fn create(
    auth: AuthUser,
    meta: RequestMeta,
    State(state): State<SharedState>,
    Json(req): Json<CreateOrder>,
) -> Result<(StatusCode, Json<OrderView>), AppError> {
    let id = visits::entity_id(req.id, "id")?;

    let mut tx = state.pool.begin().await?;

    let order = db::orders::create(&mut *tx, &id, &req.data)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(format!("Order {id} already exists"))
            }
            _ => AppError::Storage(e),
        })?;

    let mut created = Vec::with_capacity(req.visits.len());
    for new in req.visits {
        let visit = visits::insert_visit(
            &mut tx,
            &order.id,
            new,
            &auth,
            &meta,
            Source::OrderCreate,
            &state.mappings,
        )
        .await?;
        created.push(visit);
    }

    tx.commit().await?;

    tracing::info!(order_id = %order.id, visits = created.len(), "Order created");

    Ok((
        StatusCode::CREATED,
        Json(OrderView {
            order,
            visits: created,
        }),
    ))
}

pub async fn get(
    _auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<OrderView>, AppError> {
    let order = db::orders::find_by_id(&state.pool, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {id} not found")))?;
    let visits = db::visits::list_by_order(&state.pool, &id).await?;
    Ok(Json(OrderView { order, visits }))
}
