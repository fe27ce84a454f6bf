// Layer 1: Standard library imports
use std::collections::HashSet;
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::{debug, warn};

// Layer 3: Internal module imports
use super::error::SupervisorError;
use super::spawner::Spawner;
use crate::actor::{
    ActorContext, ActorHandle, Behavior, BehaviorKind, HandlerError, LifecycleState,
};
use crate::mailbox::MailboxSender;
use crate::message::{payload, Envelope, EnvelopeKind, ErrorCode, Payload};
use crate::util::{names, ActorAddress};

/// Bound on waiting for a child's receive loop to exit during shutdown.
const CHILD_STOP_WAIT: Duration = Duration::from_secs(5);

struct ChildRecord {
    name: String,
    kind: BehaviorKind,
    sender: MailboxSender,
    handle: Option<ActorHandle>,
    public: bool,
    observer: Option<ActorAddress>,
    state: LifecycleState,
}

/// The supervisor behavior.
///
/// Children are created in response to `create_child` envelopes (or `call`
/// envelopes with a `create_child` operation, which is what the external
/// gateways produce). Names are allocated from the request's hint and never
/// reused within the process lifetime. A failed child is reported to the
/// observer that created it; there is no restart.
pub struct SupervisorBehavior {
    spawner: Spawner,
    children: Vec<ChildRecord>,
    used_names: HashSet<String>,
    next_disambiguator: u64,
}

impl SupervisorBehavior {
    /// Create an empty supervisor.
    pub fn new(spawner: Spawner) -> Self {
        Self {
            spawner,
            children: Vec::new(),
            used_names: HashSet::new(),
            next_disambiguator: 0,
        }
    }

    /// Names of all children ever created and not yet stopped.
    pub fn child_names(&self) -> Vec<String> {
        self.children.iter().map(|c| c.name.clone()).collect()
    }

    fn allocate_name(&mut self, hint: &str, ctx: &ActorContext) -> String {
        let fresh = |name: &str, used: &HashSet<String>| {
            !used.contains(name) && !ctx.router().is_local(name) && !ctx.router().is_retired(name)
        };
        if fresh(hint, &self.used_names) {
            return hint.to_owned();
        }
        loop {
            self.next_disambiguator += 1;
            let candidate = format!("{hint}-{}", self.next_disambiguator);
            if fresh(&candidate, &self.used_names) {
                return candidate;
            }
        }
    }

    fn try_create_child(
        &mut self,
        envelope: &Envelope,
        ctx: &ActorContext,
    ) -> Result<Vec<Envelope>, SupervisorError> {
        let kind_name = payload::str_field(&envelope.payload, "behavior").ok_or_else(|| {
            SupervisorError::InvalidRequest {
                reason: "missing behavior field".to_owned(),
            }
        })?;
        let kind =
            BehaviorKind::parse(kind_name).ok_or_else(|| SupervisorError::UnknownBehavior {
                kind: kind_name.to_owned(),
            })?;
        let hint = payload::str_field(&envelope.payload, "name_hint").unwrap_or(kind.as_str());
        if names::is_reserved(hint) {
            return Err(SupervisorError::ReservedName {
                name: hint.to_owned(),
            });
        }
        let public = payload::bool_field(&envelope.payload, "public");
        let init = payload::object_field(&envelope.payload, "init");

        let name = self.allocate_name(hint, ctx);
        let behavior = self.spawner.create_behavior(kind, &init)?;
        let (sender, handle) =
            self.spawner
                .spawn_named(&name, Some(ctx.self_address()), public, behavior)?;

        self.used_names.insert(name.clone());
        self.children.push(ChildRecord {
            name: name.clone(),
            kind,
            sender,
            handle: Some(handle),
            public,
            observer: envelope.reply_to.clone(),
            state: LifecycleState::Running,
        });
        debug!(supervisor = ctx.name(), child = %name, kind = %kind, "child created");

        let mut out = Vec::new();
        if let Some(reply) = Envelope::reply_for(
            envelope,
            ctx.self_address(),
            payload::pairs([("name", json!(name)), ("behavior", json!(kind.as_str()))]),
        ) {
            out.push(reply);
        }
        if public {
            out.push(self.register_service(&name, ctx));
        }
        Ok(out)
    }

    async fn stop_child(
        &mut self,
        envelope: &Envelope,
        ctx: &ActorContext,
    ) -> Result<Vec<Envelope>, SupervisorError> {
        let name = payload::str_field(&envelope.payload, "name").ok_or_else(|| {
            SupervisorError::InvalidRequest {
                reason: "missing name field".to_owned(),
            }
        })?;
        let index = self
            .children
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| SupervisorError::ChildNotFound {
                name: name.to_owned(),
            })?;
        let mut record = self.children.remove(index);
        stop_record(&mut record, ctx).await;

        let mut out = Vec::new();
        if let Some(reply) = Envelope::reply_for(
            envelope,
            ctx.self_address(),
            payload::pairs([("stopped", json!(record.name))]),
        ) {
            out.push(reply);
        }
        if record.public {
            out.push(self.unregister_service(&record.name, ctx));
        }
        Ok(out)
    }

    fn list_children(&self, envelope: &Envelope, ctx: &ActorContext) -> Vec<Envelope> {
        let children: Vec<Value> = self
            .children
            .iter()
            .map(|c| {
                json!({
                    "name": c.name,
                    "behavior": c.kind.as_str(),
                    "state": c.state.to_string(),
                })
            })
            .collect();
        Envelope::reply_for(
            envelope,
            ctx.self_address(),
            payload::pairs([("children", Value::Array(children))]),
        )
        .into_iter()
        .collect()
    }

    fn child_failed(&mut self, envelope: &Envelope, ctx: &ActorContext) -> Vec<Envelope> {
        let child_name = payload::str_field(&envelope.payload, "child")
            .unwrap_or(envelope.from.name())
            .to_owned();
        let (public, observer) = {
            let Some(record) = self.children.iter_mut().find(|c| c.name == child_name) else {
                debug!(supervisor = ctx.name(), child = %child_name, "failure notice for unknown child");
                return Vec::new();
            };
            record.state = LifecycleState::Failed;
            record.handle = None;
            (record.public, record.observer.clone())
        };
        warn!(supervisor = ctx.name(), child = %child_name, "child failed");

        let mut out = Vec::new();
        if public {
            out.push(self.unregister_service(&child_name, ctx));
        }
        match observer {
            Some(observer) => {
                let mut notice =
                    Envelope::new(EnvelopeKind::Error, ctx.self_address(), observer)
                        .with_payload(envelope.payload.clone());
                notice
                    .payload
                    .entry("error_code".to_owned())
                    .or_insert_with(|| Value::String(ErrorCode::SupervisorError.as_str().to_owned()));
                out.push(notice);
            }
            None => {
                debug!(child = %child_name, "child failure has no observer; dropping notice");
            }
        }
        out
    }

    fn register_service(&self, name: &str, ctx: &ActorContext) -> Envelope {
        Envelope::new(
            EnvelopeKind::RegisterService,
            ctx.self_address(),
            ActorAddress::local(names::REGISTRY),
        )
        .with_payload(payload::pairs([
            ("name", json!(name)),
            ("node", json!(ctx.node_id().as_str())),
        ]))
    }

    fn unregister_service(&self, name: &str, ctx: &ActorContext) -> Envelope {
        Envelope::new(
            EnvelopeKind::UnregisterService,
            ctx.self_address(),
            ActorAddress::local(names::REGISTRY),
        )
        .with_payload(payload::pairs([
            ("name", json!(name)),
            ("node", json!(ctx.node_id().as_str())),
        ]))
    }

    fn report(
        &self,
        result: Result<Vec<Envelope>, SupervisorError>,
        envelope: &Envelope,
        ctx: &ActorContext,
    ) -> Vec<Envelope> {
        match result {
            Ok(out) => out,
            Err(err) => {
                warn!(supervisor = ctx.name(), error = %err, "supervisor request failed");
                Envelope::error_for(
                    envelope,
                    ctx.self_address(),
                    ErrorCode::SupervisorError,
                    err.to_string(),
                )
                .into_iter()
                .collect()
            }
        }
    }
}

async fn stop_record(record: &mut ChildRecord, ctx: &ActorContext) {
    record.state = LifecycleState::Stopping;
    let shutdown = Envelope::new(
        EnvelopeKind::Shutdown,
        ctx.self_address(),
        ActorAddress::local(&record.name),
    );
    // Best effort: a full mailbox still stops via the close signal below.
    let _ = record.sender.try_send(shutdown);
    record.sender.close();
    if let Some(handle) = record.handle.take() {
        if timeout(CHILD_STOP_WAIT, handle.join()).await.is_err() {
            warn!(child = %record.name, wait = ?CHILD_STOP_WAIT, "child did not stop in time");
        }
    }
    record.state = LifecycleState::Stopped;
}

#[async_trait]
impl Behavior for SupervisorBehavior {
    fn kind(&self) -> BehaviorKind {
        BehaviorKind::Supervisor
    }

    async fn handle(
        &mut self,
        envelope: Envelope,
        ctx: &mut ActorContext,
    ) -> Result<Vec<Envelope>, HandlerError> {
        match envelope.kind {
            EnvelopeKind::CreateChild => {
                let result = self.try_create_child(&envelope, ctx);
                Ok(self.report(result, &envelope, ctx))
            }
            EnvelopeKind::Call => match payload::str_field(&envelope.payload, "operation") {
                Some("create_child") => {
                    let result = self.try_create_child(&envelope, ctx);
                    Ok(self.report(result, &envelope, ctx))
                }
                Some("stop_child") => {
                    let result = self.stop_child(&envelope, ctx).await;
                    Ok(self.report(result, &envelope, ctx))
                }
                Some("list_children") => Ok(self.list_children(&envelope, ctx)),
                other => {
                    let err = SupervisorError::InvalidRequest {
                        reason: format!("unknown operation {other:?}"),
                    };
                    Ok(self.report(Err(err), &envelope, ctx))
                }
            },
            EnvelopeKind::Error => Ok(self.child_failed(&envelope, ctx)),
            EnvelopeKind::Reply | EnvelopeKind::Pong => Ok(Vec::new()),
            other => Err(HandlerError::transient(format!(
                "supervisor cannot process {other} envelopes"
            ))),
        }
    }

    /// Depth-first cascade: stop children in reverse creation order and
    /// wait for each loop to exit before the supervisor's own task ends.
    async fn on_stop(&mut self, ctx: &mut ActorContext) {
        let mut children = std::mem::take(&mut self.children);
        for record in children.iter_mut().rev() {
            if record.state == LifecycleState::Failed {
                continue;
            }
            stop_record(record, ctx).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::actor::spawn_actor;
    use crate::mailbox::mailbox;
    use crate::router::{NodeRole, Router};
    use crate::util::NodeId;
    use std::sync::Arc;

    /// Worker that replies to `poke` and fails on `die`.
    struct PokeBehavior;

    #[async_trait]
    impl Behavior for PokeBehavior {
        fn kind(&self) -> BehaviorKind {
            BehaviorKind::LanguageWorker
        }

        async fn handle(
            &mut self,
            envelope: Envelope,
            ctx: &mut ActorContext,
        ) -> Result<Vec<Envelope>, HandlerError> {
            match payload::str_field(&envelope.payload, "operation") {
                Some("die") => Err(HandlerError::fatal("poked to death")),
                _ => Ok(Envelope::reply_for(
                    &envelope,
                    ctx.self_address(),
                    payload::pairs([("value", json!("poked"))]),
                )
                .into_iter()
                .collect()),
            }
        }
    }

    struct TestFactory;

    impl super::super::spawner::BehaviorFactory for TestFactory {
        fn create(
            &self,
            kind: BehaviorKind,
            _init: &Payload,
            spawner: &Spawner,
        ) -> Result<Box<dyn Behavior>, SupervisorError> {
            match kind {
                BehaviorKind::Supervisor => {
                    Ok(Box::new(SupervisorBehavior::new(spawner.clone())))
                }
                BehaviorKind::LanguageWorker => Ok(Box::new(PokeBehavior)),
                other => Err(SupervisorError::UnsupportedBehavior { kind: other }),
            }
        }
    }

    struct Fixture {
        router: Router,
        inbox: crate::mailbox::Mailbox,
    }

    fn start_root() -> Fixture {
        let router = Router::new(NodeId::new("n1"), NodeRole::Main);
        let spawner = Spawner::new(router.clone(), Arc::new(TestFactory), 16);

        let (root_rx, root_tx) = mailbox(16);
        router
            .register(names::ROOT_SUPERVISOR, root_tx, false)
            .unwrap();
        spawn_actor(
            names::ROOT_SUPERVISOR,
            None,
            false,
            Box::new(SupervisorBehavior::new(spawner)),
            root_rx,
            router.clone(),
        );

        let (test_rx, test_tx) = mailbox(16);
        router.register("tester", test_tx, false).unwrap();
        Fixture {
            router,
            inbox: test_rx,
        }
    }

    fn create_child_envelope(hint: &str) -> Envelope {
        Envelope::new(
            EnvelopeKind::CreateChild,
            ActorAddress::local("tester"),
            ActorAddress::local(names::ROOT_SUPERVISOR),
        )
        .with_payload(payload::pairs([
            ("behavior", json!("language_worker")),
            ("name_hint", json!(hint)),
        ]))
        .with_reply_to(ActorAddress::local("tester"))
    }

    #[tokio::test]
    async fn test_create_child_uses_hint() {
        let mut fx = start_root();
        fx.router.send(create_child_envelope("poker")).unwrap();

        let reply = fx.inbox.recv().await.unwrap();
        assert_eq!(reply.kind, EnvelopeKind::Reply);
        assert_eq!(payload::str_field(&reply.payload, "name"), Some("poker"));
        assert!(fx.router.is_local("poker"));
    }

    #[tokio::test]
    async fn test_create_child_disambiguates_names() {
        let mut fx = start_root();
        fx.router.send(create_child_envelope("poker")).unwrap();
        let _ = fx.inbox.recv().await.unwrap();

        fx.router.send(create_child_envelope("poker")).unwrap();
        let reply = fx.inbox.recv().await.unwrap();
        let name = payload::str_field(&reply.payload, "name").unwrap();
        assert_ne!(name, "poker");
        assert!(name.starts_with("poker-"));
    }

    #[tokio::test]
    async fn test_create_child_rejects_reserved_hint() {
        let mut fx = start_root();
        fx.router.send(create_child_envelope("$sneaky")).unwrap();

        let reply = fx.inbox.recv().await.unwrap();
        assert_eq!(reply.error_code(), Some(ErrorCode::SupervisorError));
    }

    #[tokio::test]
    async fn test_create_child_unknown_behavior() {
        let mut fx = start_root();
        let mut env = create_child_envelope("x");
        env.payload
            .insert("behavior".to_owned(), json!("quantum_worker"));
        fx.router.send(env).unwrap();

        let reply = fx.inbox.recv().await.unwrap();
        assert_eq!(reply.error_code(), Some(ErrorCode::SupervisorError));
    }

    #[tokio::test]
    async fn test_created_child_is_reachable() {
        let mut fx = start_root();
        fx.router.send(create_child_envelope("poker")).unwrap();
        let _ = fx.inbox.recv().await.unwrap();

        let call = Envelope::new(
            EnvelopeKind::Call,
            ActorAddress::local("tester"),
            ActorAddress::local("poker"),
        )
        .with_payload(payload::pairs([("operation", json!("poke"))]))
        .with_reply_to(ActorAddress::local("tester"));
        fx.router.send(call).unwrap();

        let reply = fx.inbox.recv().await.unwrap();
        assert_eq!(payload::str_field(&reply.payload, "value"), Some("poked"));
    }

    #[tokio::test]
    async fn test_public_child_emits_register_service() {
        let mut fx = start_root();
        // Stand in for the registry actor.
        let (mut registry_rx, registry_tx) = mailbox(16);
        fx.router.register(names::REGISTRY, registry_tx, false).unwrap();

        let mut env = create_child_envelope("echo");
        env.payload.insert("public".to_owned(), json!(true));
        fx.router.send(env).unwrap();

        let _ = fx.inbox.recv().await.unwrap();
        let advert = registry_rx.recv().await.unwrap();
        assert_eq!(advert.kind, EnvelopeKind::RegisterService);
        assert_eq!(payload::str_field(&advert.payload, "name"), Some("echo"));
        assert_eq!(payload::str_field(&advert.payload, "node"), Some("n1"));
    }

    #[tokio::test]
    async fn test_stop_child() {
        let mut fx = start_root();
        fx.router.send(create_child_envelope("poker")).unwrap();
        let _ = fx.inbox.recv().await.unwrap();

        let stop = Envelope::new(
            EnvelopeKind::Call,
            ActorAddress::local("tester"),
            ActorAddress::local(names::ROOT_SUPERVISOR),
        )
        .with_payload(payload::pairs([
            ("operation", json!("stop_child")),
            ("name", json!("poker")),
        ]))
        .with_reply_to(ActorAddress::local("tester"));
        fx.router.send(stop).unwrap();

        let reply = fx.inbox.recv().await.unwrap();
        assert_eq!(payload::str_field(&reply.payload, "stopped"), Some("poker"));
        assert!(!fx.router.is_local("poker"));
    }

    #[tokio::test]
    async fn test_failed_child_reported_to_observer() {
        let mut fx = start_root();
        fx.router.send(create_child_envelope("poker")).unwrap();
        let _ = fx.inbox.recv().await.unwrap();

        let mut die = Envelope::new(
            EnvelopeKind::Call,
            ActorAddress::local("tester"),
            ActorAddress::local("poker"),
        )
        .with_payload(payload::pairs([("operation", json!("die"))]));
        die.reply_to = None;
        fx.router.send(die).unwrap();

        // The observer (tester, which created the child) gets the report.
        let notice = fx.inbox.recv().await.unwrap();
        assert_eq!(notice.kind, EnvelopeKind::Error);
        assert_eq!(payload::str_field(&notice.payload, "child"), Some("poker"));
    }

    #[tokio::test]
    async fn test_supervisor_cascade_stops_descendants() {
        let mut fx = start_root();

        // Child supervisor under the root.
        let mut env = create_child_envelope("mid");
        env.payload.insert("behavior".to_owned(), json!("supervisor"));
        fx.router.send(env).unwrap();
        let _ = fx.inbox.recv().await.unwrap();

        // Grandchild worker under the child supervisor.
        let mut env = create_child_envelope("leaf");
        env.to = ActorAddress::local("mid");
        fx.router.send(env).unwrap();
        let _ = fx.inbox.recv().await.unwrap();
        assert!(fx.router.is_local("leaf"));

        // Shut down the root; the whole tree must unwind.
        let shutdown = Envelope::new(
            EnvelopeKind::Shutdown,
            ActorAddress::local("tester"),
            ActorAddress::local(names::ROOT_SUPERVISOR),
        );
        fx.router.send(shutdown).unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while fx.router.is_local("leaf")
                || fx.router.is_local("mid")
                || fx.router.is_local(names::ROOT_SUPERVISOR)
            {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
