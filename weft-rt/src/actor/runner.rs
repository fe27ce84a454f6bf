// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

// Layer 3: Internal module imports
use super::behavior::{Behavior, BehaviorKind};
use super::context::ActorContext;
use super::lifecycle::LifecycleState;
use crate::mailbox::Mailbox;
use crate::message::{Envelope, EnvelopeKind, ErrorCode};
use crate::router::Router;
use crate::util::ActorAddress;

/// Handle to a spawned actor task.
#[derive(Debug)]
pub struct ActorHandle {
    name: String,
    kind: BehaviorKind,
    join: JoinHandle<()>,
}

impl ActorHandle {
    /// The actor's unqualified name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The behavior kind running in this actor.
    pub fn kind(&self) -> BehaviorKind {
        self.kind
    }

    /// Await the receive loop's exit.
    pub async fn join(self) {
        let _ = self.join.await;
    }

    /// True once the receive loop has exited.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Spawn an actor's receive loop on its own task.
///
/// The mailbox must already be registered with the router under `name`.
/// The loop dispatches each envelope to the behavior, routes the returned
/// envelopes, and handles the runtime-owned kinds itself: `shutdown`
/// stops the actor, `ping` is answered with `pong`.
///
/// On handler error an `error` envelope goes to the request's `reply_to`
/// when present; a non-transient error then transitions the actor to
/// `Failed` and notifies its parent before the loop exits. Exit always
/// unregisters the name and runs the behavior's `on_stop` hook.
pub fn spawn_actor(
    name: impl Into<String>,
    parent: Option<ActorAddress>,
    public: bool,
    mut behavior: Box<dyn Behavior>,
    mut mailbox: Mailbox,
    router: Router,
) -> ActorHandle {
    let name = name.into();
    let kind = behavior.kind();
    let task_name = name.clone();

    let join = tokio::spawn(async move {
        let name = task_name;
        let mut ctx = ActorContext::new(name.clone(), parent.clone(), router.clone(), public);
        ctx.set_lifecycle(LifecycleState::Running);
        debug!(actor = %name, kind = %kind, "actor running");

        while let Some(envelope) = mailbox.recv().await {
            match envelope.kind {
                EnvelopeKind::Shutdown => {
                    ctx.set_lifecycle(LifecycleState::Stopping);
                    if let Some(ack) =
                        Envelope::reply_for(&envelope, ctx.self_address(), stopped_payload(&name))
                    {
                        router.send_or_report(ack);
                    }
                    break;
                }
                EnvelopeKind::Ping => {
                    let target = envelope.reply_to.clone().unwrap_or(envelope.from.clone());
                    let mut pong =
                        Envelope::new(EnvelopeKind::Pong, ctx.self_address(), target);
                    pong.correlation_id = envelope.correlation_id;
                    router.send_or_report(pong);
                }
                _ => {
                    let reply_to = envelope.reply_to.clone();
                    let correlation_id = envelope.correlation_id;
                    match behavior.handle(envelope, &mut ctx).await {
                        Ok(outbound) => {
                            for env in outbound {
                                router.send_or_report(env);
                            }
                        }
                        Err(err) => {
                            warn!(actor = %name, error = %err, "handler error");
                            if let Some(reply_to) = reply_to {
                                router.send_or_report(Envelope::error(
                                    ctx.self_address(),
                                    reply_to,
                                    correlation_id,
                                    ErrorCode::HandlerError,
                                    err.message(),
                                ));
                            }
                            if !err.is_transient() {
                                ctx.set_lifecycle(LifecycleState::Failed);
                                if let Some(parent) = &parent {
                                    router.send_or_report(failure_notice(
                                        &ctx, parent, &name, &err,
                                    ));
                                }
                                break;
                            }
                        }
                    }
                }
            }
        }

        if ctx.lifecycle() != LifecycleState::Failed {
            ctx.set_lifecycle(LifecycleState::Stopped);
        }
        router.unregister(&name);
        behavior.on_stop(&mut ctx).await;
        debug!(actor = %name, state = %ctx.lifecycle(), "actor exited");
    });

    ActorHandle { name, kind, join }
}

fn stopped_payload(name: &str) -> crate::message::Payload {
    let mut payload = crate::message::Payload::new();
    payload.insert("stopped".to_owned(), Value::String(name.to_owned()));
    payload
}

fn failure_notice(
    ctx: &ActorContext,
    parent: &ActorAddress,
    child: &str,
    err: &super::behavior::HandlerError,
) -> Envelope {
    let mut notice = Envelope::error(
        ctx.self_address(),
        parent.clone(),
        None,
        ErrorCode::SupervisorError,
        format!("child {child} failed: {err}"),
    );
    notice
        .payload
        .insert("child".to_owned(), Value::String(child.to_owned()));
    notice
}
