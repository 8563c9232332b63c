//! Server-sent event stream of new orders for shop operators.
//!
//! The stream opens with a `connected` event, then carries one `new_order`
//! event per order published for the shop. Events are notifications only; a
//! reconnecting client re-reads the order lists for anything it missed.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;

use super::extract::ApiQuery;
use super::orders::ShopParams;
use crate::auth::Principal;
use crate::domain::events::OrderEvent;
use crate::error::AppResult;
use crate::service::Actor;
use crate::state::AppState;

const KEEP_ALIVE_SECS: u64 = 15;

pub async fn order_events(
    State(state): State<AppState>,
    principal: Principal,
    ApiQuery(q): ApiQuery<ShopParams>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let subscription = state.orders.subscribe(Actor::from(&principal), q.shop_id).await?;
    let shop_id = subscription.shop_id();
    tracing::info!(shop_id, subscriber = subscription.id(), "event stream attached");

    let connected = Event::default().event("connected").data(json!({ "shop_id": shop_id }).to_string());
    let live = subscription.filter_map(|event| async move { to_sse(&event) });
    let events = stream::once(async move { connected }).chain(live).map(Ok);

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(KEEP_ALIVE_SECS)).text("keepalive")))
}

fn to_sse(event: &OrderEvent) -> Option<Event> {
    match event.payload() {
        Ok(data) => Some(Event::default().event(event.name()).id(event.order_id().to_string()).data(data)),
        Err(e) => {
            tracing::warn!(order_id = event.order_id(), error = %e, "event payload could not be encoded");
            None
        }
    }
}
