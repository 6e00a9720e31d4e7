use super::caller_id;
use crate::feed::FeedReader;
use crate::gateway::{ConnectionHandle, DeliveryGateway};
use crate::state::AppState;
use actix::{Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Frame for the client, produced by the gateway or an inbound reply
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct Push(String);

struct FeedSession {
    handle: ConnectionHandle,
    gateway: DeliveryGateway,
    reader: FeedReader,
    hb: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl FeedSession {
    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.hb) > act.client_timeout {
                warn!(
                    subscriber_id = %act.handle.subscriber_id,
                    connection_id = %act.handle.connection_id,
                    "Feed session heartbeat timed out, disconnecting"
                );
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn refresh_registration(&self) {
        let gateway = self.gateway.clone();
        let handle = self.handle;
        actix::spawn(async move {
            gateway.heartbeat(&handle).await;
        });
    }
}

impl Actor for FeedSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(
            subscriber_id = %self.handle.subscriber_id,
            connection_id = %self.handle.connection_id,
            "Feed session started"
        );
        self.hb(ctx);

        // Warm the cache so the next feed read is served from it
        let reader = self.reader.clone();
        let subscriber_id = self.handle.subscriber_id;
        actix::spawn(async move {
            if let Err(e) = reader.prefetch(subscriber_id).await {
                warn!(subscriber_id = %subscriber_id, error = %e, "Feed prefetch failed");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(
            subscriber_id = %self.handle.subscriber_id,
            connection_id = %self.handle.connection_id,
            "Feed session stopped"
        );

        let gateway = self.gateway.clone();
        let handle = self.handle;
        actix::spawn(async move {
            gateway.detach(&handle).await;
        });
    }
}

impl Handler<Push> for FeedSession {
    type Result = ();

    fn handle(&mut self, msg: Push, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for FeedSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
                self.refresh_registration();
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
                self.refresh_registration();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                let gateway = self.gateway.clone();
                let handle = self.handle;
                let addr = ctx.address();
                let text = text.to_string();
                actix::spawn(async move {
                    if let Some(reply) = gateway.handle_inbound(&handle, &text).await {
                        addr.do_send(Push(reply));
                    }
                });
            }
            Ok(ws::Message::Binary(_)) => {
                debug!("Binary frames are not supported on feed sessions");
            }
            Ok(ws::Message::Close(reason)) => {
                debug!(?reason, "Feed session close frame received");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Feed session protocol error");
                ctx.stop();
            }
        }
    }
}

/// Open a live feed session for the caller
#[get("/feed/ws")]
pub async fn feed_ws(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let subscriber_id = caller_id(&req)?;
    let (handle, mut rx) = state.gateway.attach(subscriber_id).await;

    let session = FeedSession {
        handle,
        gateway: state.gateway.clone(),
        reader: state.reader.clone(),
        hb: Instant::now(),
        heartbeat_interval: state.gateway_settings.heartbeat_interval(),
        client_timeout: state.gateway_settings.client_timeout(),
    };

    let (addr, resp) = match ws::WsResponseBuilder::new(session, &req, stream).start_with_addr() {
        Ok(started) => started,
        Err(e) => {
            state.gateway.detach(&handle).await;
            return Err(e);
        }
    };

    // Bridge gateway frames into the session actor; ends when the gateway
    // drops the connection's sender on detach.
    actix::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if !addr.connected() {
                break;
            }
            addr.do_send(Push(frame));
        }
    });

    Ok(resp)
}
