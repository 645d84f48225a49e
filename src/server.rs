// SPDX-License-Identifier: Apache-2.0
//! HTTP/WebSocket front door. A thin axum router exposing the one route a
//! direct (non-relayed) client needs; this just upgrades and hands off to
//! `corral_transport::handle_socket`.

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::WebSocketUpgrade,
        ConnectInfo, State,
    },
    response::Response,
    routing::get,
    Router,
};
use corral_transport::{handle_socket, AxumSocket, TransportContext};

pub async fn serve(bind: &str, ctx: TransportContext) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(ctx);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(%bind, "transport listener bound");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(ctx): State<TransportContext>,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        handle_socket(AxumSocket(socket), &peer.to_string(), ctx).await;
    })
}
