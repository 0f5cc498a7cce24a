use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::models::order::Order;
use crate::models::request::{
    CancelOrderRequest, CreateOrderRequest, ErrorResponse, ListOrdersQuery, ListOrdersResponse,
    OrderStatusResponse,
};
use crate::services::order_service::ServiceError;

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Domain(_) => StatusCode::CONFLICT,
            ServiceError::Repository(e) => {
                tracing::error!(error = %e, "Order repository failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// POST /api/v1/orders: create an order and start fulfillment.
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ServiceError> {
    let order = state.orders.create_order(request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /api/v1/orders
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<ListOrdersResponse>, ServiceError> {
    let orders = state.orders.list_orders(query.customer_id.as_deref()).await?;
    Ok(Json(ListOrdersResponse {
        count: orders.len(),
        orders,
    }))
}

/// GET /api/v1/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ServiceError> {
    Ok(Json(state.orders.get_order(&id).await?))
}

/// GET /api/v1/orders/{id}/status
pub async fn get_order_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OrderStatusResponse>, ServiceError> {
    let order = state.orders.get_order(&id).await?;
    Ok(Json(OrderStatusResponse::from(&order)))
}

/// POST /api/v1/orders/{id}/cancel
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CancelOrderRequest>,
) -> Result<Json<Order>, ServiceError> {
    request.validate()?;
    Ok(Json(state.orders.cancel_order(&id, &request.reason).await?))
}
