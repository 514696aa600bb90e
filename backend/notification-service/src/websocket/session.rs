//! Per-connection WebSocket session actor.
//!
//! Each accepted socket runs one `WsSession`. The actor owns the connection's
//! role state machine (unauthenticated -> backend | facilitator, terminal on
//! transport teardown), parses inbound frames, and hands the work to the
//! auth gate, router, replay dispatcher and ack tracker. Replies and
//! registry-pushed messages reach the socket through the actor's mailbox.

use actix::{Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::state::AppState;
use crate::websocket::messages::{ClientMessage, ServerMessage};
use crate::websocket::registry::ConnectionId;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Role a connection has assumed. There is no way back to
/// `Unauthenticated`; different credentials require a new connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionRole {
    Unauthenticated,
    Backend,
    Facilitator(i64),
}

#[derive(ActixMessage)]
#[rtype(result = "()")]
struct Outbound(ServerMessage);

#[derive(ActixMessage)]
#[rtype(result = "()")]
struct SetRole(ConnectionRole);

pub struct WsSession {
    conn_id: ConnectionId,
    role: ConnectionRole,
    state: AppState,
    hb: Instant,
}

impl WsSession {
    fn new(conn_id: ConnectionId, state: AppState) -> Self {
        Self {
            conn_id,
            role: ConnectionRole::Unauthenticated,
            state,
            hb: Instant::now(),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                warn!(conn = act.conn_id.as_u64(), "heartbeat failed, closing connection");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn send(&self, ctx: &mut ws::WebsocketContext<Self>, message: &ServerMessage) {
        match message.to_json() {
            Ok(json) => ctx.text(json),
            Err(e) => warn!(conn = self.conn_id.as_u64(), error = %e, "failed to encode frame"),
        }
    }

    fn dispatch(&mut self, message: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let state = self.state.clone();
        let conn = self.conn_id;
        let addr = ctx.address();

        match message {
            ClientMessage::BackendConnect { token } => {
                if self.role != ConnectionRole::Unauthenticated {
                    let err = AppError::Authentication("already authenticated".into());
                    self.send(ctx, &ServerMessage::from_error(&err));
                    return;
                }
                let (tx, mut rx) = mpsc::unbounded_channel();
                actix::spawn(async move {
                    match state
                        .auth
                        .authenticate_backend(&state.registry, conn, tx, token.as_deref())
                        .await
                    {
                        Ok(()) => {
                            addr.do_send(SetRole(ConnectionRole::Backend));
                            addr.do_send(Outbound(ServerMessage::auth_success(None)));
                            let forward = addr.clone();
                            actix::spawn(async move {
                                while let Some(msg) = rx.recv().await {
                                    forward.do_send(Outbound(msg));
                                }
                            });
                        }
                        Err(e) => addr.do_send(Outbound(ServerMessage::from_error(&e))),
                    }
                });
            }

            ClientMessage::FacilitatorConnect {
                facilitator_id,
                token,
            } => {
                if self.role != ConnectionRole::Unauthenticated {
                    let err = AppError::Authentication("already authenticated".into());
                    self.send(ctx, &ServerMessage::from_error(&err));
                    return;
                }
                let (tx, mut rx) = mpsc::unbounded_channel();
                actix::spawn(async move {
                    match state
                        .auth
                        .authenticate_facilitator(
                            &state.registry,
                            conn,
                            tx,
                            facilitator_id,
                            token.as_deref(),
                        )
                        .await
                    {
                        Ok(fid) => {
                            addr.do_send(SetRole(ConnectionRole::Facilitator(fid)));
                            addr.do_send(Outbound(ServerMessage::auth_success(Some(fid))));
                            let forward = addr.clone();
                            actix::spawn(async move {
                                while let Some(msg) = rx.recv().await {
                                    forward.do_send(Outbound(msg));
                                }
                            });

                            // Stored notifications replay immediately on
                            // reconnect; silence when nothing is pending.
                            match state.replay.replay_pending(conn, Some(fid)).await {
                                Ok(Some(batch)) => addr.do_send(Outbound(batch)),
                                Ok(None) => {}
                                Err(e) => addr.do_send(Outbound(ServerMessage::from_error(&e))),
                            }
                        }
                        Err(e) => addr.do_send(Outbound(ServerMessage::from_error(&e))),
                    }
                });
            }

            ClientMessage::BookingNotification { payload } => {
                actix::spawn(async move {
                    match state.router.route(conn, payload).await {
                        Ok(ack) => addr.do_send(Outbound(ack)),
                        Err(e) => addr.do_send(Outbound(ServerMessage::from_error(&e))),
                    }
                });
            }

            ClientMessage::GetPendingNotifications { facilitator_id } => {
                actix::spawn(async move {
                    match state.replay.replay_pending(conn, facilitator_id).await {
                        Ok(Some(batch)) => addr.do_send(Outbound(batch)),
                        Ok(None) => {}
                        Err(e) => addr.do_send(Outbound(ServerMessage::from_error(&e))),
                    }
                });
            }

            ClientMessage::MarkNotificationRead {
                facilitator_id,
                notification_id,
            } => {
                actix::spawn(async move {
                    match state
                        .acks
                        .mark_read(conn, facilitator_id, notification_id)
                        .await
                    {
                        Ok(true) => {
                            if let Some(id) = notification_id {
                                addr.do_send(Outbound(ServerMessage::marked_read(id)));
                            }
                        }
                        Ok(false) => {}
                        Err(e) => addr.do_send(Outbound(ServerMessage::from_error(&e))),
                    }
                });
            }
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        debug!(conn = self.conn_id.as_u64(), "connection opened");
        self.hb(ctx);
        self.send(ctx, &ServerMessage::connected(self.conn_id));
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        debug!(conn = self.conn_id.as_u64(), "connection closed");
        let registry = self.state.registry.clone();
        let conn = self.conn_id;
        actix::spawn(async move {
            registry.unregister(conn).await;
        });
    }
}

impl Handler<Outbound> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: Outbound, ctx: &mut Self::Context) {
        self.send(ctx, &msg.0);
    }
}

impl Handler<SetRole> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: SetRole, _ctx: &mut Self::Context) {
        if self.role == ConnectionRole::Unauthenticated {
            self.role = msg.0;
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(payload)) => {
                self.hb = Instant::now();
                ctx.pong(&payload);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => self.dispatch(message, ctx),
                Err(e) => {
                    debug!(conn = self.conn_id.as_u64(), error = %e, "unparseable frame");
                    self.send(
                        ctx,
                        &ServerMessage::Error {
                            code: "validation_error".to_string(),
                            message: format!("invalid message: {e}"),
                        },
                    );
                }
            },
            Ok(ws::Message::Binary(_)) => {
                warn!(conn = self.conn_id.as_u64(), "binary frames not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                debug!(conn = self.conn_id.as_u64(), ?reason, "close frame received");
                ctx.stop();
            }
            _ => {}
        }
    }
}

/// WebSocket upgrade endpoint. Authentication happens after the upgrade,
/// over the socket itself.
#[get("/ws")]
pub async fn ws_route(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let conn_id = state.registry.next_connection_id();
    let session = WsSession::new(conn_id, state.get_ref().clone());
    ws::start(session, &req, stream)
}
