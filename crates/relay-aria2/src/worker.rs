//! Socket worker that multiplexes RPC calls and push notifications.
//!
//! The worker owns the websocket. Calls arrive over the command channel and
//! are matched to responses by id; frames without an id are notifications and
//! go straight to the event bus. When the socket ends every pending call fails
//! with a connection error and the command channel closes, so later calls fail
//! fast as well.

#![allow(clippy::redundant_pub_crate)]

use std::collections::HashMap;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use relay_core::EngineError;
use relay_events::EventBus;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

use crate::ENGINE;
use crate::codec::{self, Frame};
use crate::command::{Reply, RpcCommand};

pub(crate) fn spawn<S>(socket: S, events: EventBus, mut commands: mpsc::Receiver<RpcCommand>)
where
    S: Stream<Item = Result<Message, tungstenite::Error>>
        + Sink<Message, Error = tungstenite::Error>
        + Unpin
        + Send
        + 'static,
{
    tokio::spawn(async move {
        let mut worker = Worker {
            socket,
            events,
            pending: HashMap::new(),
        };
        let reason = loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(RpcCommand::Call { id, frame, reply }) => worker.send(id, frame, reply).await,
                        Some(RpcCommand::Forget { id }) => {
                            worker.pending.remove(&id);
                        }
                        Some(RpcCommand::Close { done }) => {
                            if let Err(err) = worker.socket.close().await {
                                debug!(error = %err, "aria2 websocket close handshake failed");
                            }
                            let _ = done.send(());
                            break "closed by client".to_string();
                        }
                        None => break "client dropped".to_string(),
                    }
                }
                frame = worker.socket.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => worker.receive(&text),
                        Some(Ok(Message::Close(_))) | None => break "socket closed".to_string(),
                        Some(Ok(_)) => {}
                        Some(Err(err)) => break err.to_string(),
                    }
                }
            }
        };
        commands.close();
        worker.fail_pending(&reason);
        info!(reason = %reason, "aria2 websocket worker stopped");
    });
}

struct Worker<S> {
    socket: S,
    events: EventBus,
    pending: HashMap<u64, Reply>,
}

impl<S> Worker<S>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    async fn send(&mut self, id: u64, frame: String, reply: Reply) {
        match self.socket.send(Message::Text(frame)).await {
            Ok(()) => {
                self.pending.insert(id, reply);
            }
            Err(err) => {
                let _ = reply.send(Err(EngineError::Transport {
                    engine: ENGINE,
                    message: err.to_string(),
                }));
            }
        }
    }

    fn receive(&mut self, text: &str) {
        match codec::decode(text) {
            Ok(Frame::Response { id, outcome }) => {
                let Some(reply) = self.pending.remove(&id) else {
                    debug!(id, "response for an abandoned aria2 call");
                    return;
                };
                // Not-found translation needs the requested gid, so the client does it.
                let _ = reply.send(outcome.map_err(|failure| EngineError::Rpc {
                    code: failure.code,
                    message: failure.message,
                }));
            }
            Ok(Frame::Notifications(events)) => {
                for event in events {
                    debug!(gid = %event.gid(), kind = event.kind(), "aria2 notification");
                    self.events.publish(event);
                }
            }
            Ok(Frame::Ignored { method }) => {
                debug!(method = %method, "ignoring aria2 notification");
            }
            Err(err) => warn!(error = %err, "undecodable aria2 frame"),
        }
    }

    fn fail_pending(&mut self, reason: &str) {
        for (_, reply) in self.pending.drain() {
            let _ = reply.send(Err(EngineError::Connection {
                engine: ENGINE,
                message: reason.to_string(),
            }));
        }
    }
}
