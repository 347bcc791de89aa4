use actix::Addr;
use actix_web::http::header;
use actix_web::web::{self, Bytes};
use actix_web::HttpResponse;
use uuid::Uuid;

use super::dto::*;
use super::errors::ApiError;
use super::AppState;
use crate::actors::{JoinOrder, LeaveOrder, NotificationHub};
use crate::domain::order::Caller;

type ApiResult = Result<HttpResponse, ApiError>;

// ============================================================================
// Order endpoints
// ============================================================================

/// POST /orders
pub async fn create_order(
    state: web::Data<AppState>,
    caller: Caller,
    body: web::Json<serde_json::Value>,
) -> ApiResult {
    let command = CreateOrderRequest::parse(body.into_inner())?.into_command(caller.user_id);
    let order = state.lifecycle.place_order(command).await?;
    Ok(HttpResponse::Created().json(present(order)))
}

/// GET /orders/my-orders
pub async fn my_orders(
    state: web::Data<AppState>,
    caller: Caller,
    query: web::Query<MyOrdersQuery>,
) -> ApiResult {
    let page = state.queries.my_orders(caller.user_id, query.filter()).await?;
    Ok(HttpResponse::Ok().json(present_page(page)))
}

/// GET /orders/{id}
pub async fn get_order(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
) -> ApiResult {
    let order = state.queries.get_order(path.into_inner(), &caller).await?;
    Ok(HttpResponse::Ok().json(present(order)))
}

/// PUT /orders/{id}/status
pub async fn update_status(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
    body: web::Json<UpdateStatusRequest>,
) -> ApiResult {
    let UpdateStatusRequest { status, tracking_info } = body.into_inner();
    let order = state
        .lifecycle
        .transition_status(path.into_inner(), &caller, status, tracking_info)
        .await?;
    Ok(HttpResponse::Ok().json(present(order)))
}

/// GET /orders/{id}/track (public)
pub async fn track_order(state: web::Data<AppState>, path: web::Path<Uuid>) -> ApiResult {
    let view = state.queries.track(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(view))
}

/// POST /orders/{id}/return
pub async fn request_return(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
    body: web::Json<ReturnRequestBody>,
) -> ApiResult {
    let order = state
        .lifecycle
        .request_return(path.into_inner(), &caller, body.into_inner().reason)
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Return request submitted",
        "returnRequest": order.return_request,
    })))
}

/// PUT /orders/{id}/return (admin)
pub async fn resolve_return(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
    body: web::Json<ResolveReturnBody>,
) -> ApiResult {
    let order = state
        .lifecycle
        .resolve_return(path.into_inner(), &caller, body.status)
        .await?;
    Ok(HttpResponse::Ok().json(present(order)))
}

/// PUT /orders/{id}/payment (admin)
pub async fn record_payment(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
    body: web::Json<RecordPaymentBody>,
) -> ApiResult {
    let RecordPaymentBody { status, transaction_id } = body.into_inner();
    let order = state
        .lifecycle
        .record_payment(path.into_inner(), &caller, status, transaction_id)
        .await?;
    Ok(HttpResponse::Ok().json(present(order)))
}

// ============================================================================
// Real-time channel (join-order)
// ============================================================================

/// Leaves the order channel when the client connection goes away
struct ChannelMembership {
    hub: Addr<NotificationHub>,
    order_id: Uuid,
    subscriber_id: u64,
}

impl Drop for ChannelMembership {
    fn drop(&mut self) {
        self.hub.do_send(LeaveOrder {
            order_id: self.order_id,
            subscriber_id: self.subscriber_id,
        });
    }
}

/// GET /orders/{id}/events, as Server-Sent Events
pub async fn order_events(state: web::Data<AppState>, path: web::Path<Uuid>) -> ApiResult {
    let order_id = path.into_inner();
    state.queries.ensure_exists(order_id).await?;

    let subscription = state
        .hub
        .send(JoinOrder { order_id })
        .await
        .map_err(|e| {
            tracing::error!(order_id = %order_id, error = %e, "Notification hub unreachable");
            ApiError::HubUnavailable
        })?;

    let membership = ChannelMembership {
        hub: state.hub.clone(),
        order_id,
        subscriber_id: subscription.subscriber_id,
    };

    let stream = futures_util::stream::unfold(
        (subscription.receiver, membership),
        |(mut receiver, membership)| async move {
            let update = receiver.recv().await?;
            let frame = match serde_json::to_string(&update) {
                Ok(json) => format!("event: {}\ndata: {}\n\n", update.event, json),
                Err(e) => {
                    tracing::error!(order_id = %update.order_id, error = %e, "Failed to encode order update");
                    String::from(": dropped\n\n")
                }
            };
            Some((Ok::<_, actix_web::Error>(Bytes::from(frame)), (receiver, membership)))
        },
    );

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream))
}
