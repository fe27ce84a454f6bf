//! Language worker: the seam to the external expression evaluator.
//!
//! The runtime does not evaluate source text. A `language_worker` actor
//! owns an [`EvalHost`] (one interpreter environment per actor) and
//! translates `eval`/`call` envelopes into host invocations and replies.
//! The embedding language runtime supplies the host implementation when it
//! builds the node's behavior factory.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

// Layer 3: Internal module imports
use crate::actor::{ActorContext, Behavior, BehaviorKind, HandlerError};
use crate::message::{payload, Envelope, EnvelopeKind};

/// Failure raised by an interpreter host.
///
/// Host errors are transient by default: a bad expression does not kill
/// the worker. A host marks an error fatal when its environment is
/// unusable (the worker then transitions to `failed`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EvalError {
    message: String,
    fatal: bool,
}

impl EvalError {
    /// An error the worker survives.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: false,
        }
    }

    /// An error that poisons the interpreter environment.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: true,
        }
    }

    /// True when the worker must stop.
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }
}

impl From<EvalError> for HandlerError {
    fn from(err: EvalError) -> Self {
        if err.fatal {
            HandlerError::fatal(err.message)
        } else {
            HandlerError::transient(err.message)
        }
    }
}

/// One interpreter environment owned by a language worker.
pub trait EvalHost: Send + 'static {
    /// Evaluate source text, returning its value.
    fn eval(&mut self, source: &str) -> Result<Value, EvalError>;

    /// Invoke a named operation with JSON parameters.
    fn call(&mut self, operation: &str, params: &Value) -> Result<Value, EvalError>;
}

/// Host used when no interpreter is attached; every request errors.
pub struct NullHost;

impl EvalHost for NullHost {
    fn eval(&mut self, _source: &str) -> Result<Value, EvalError> {
        Err(EvalError::new("no interpreter attached to this node"))
    }

    fn call(&mut self, _operation: &str, _params: &Value) -> Result<Value, EvalError> {
        Err(EvalError::new("no interpreter attached to this node"))
    }
}

/// The `language_worker` behavior.
pub struct LanguageWorker {
    host: Box<dyn EvalHost>,
}

impl LanguageWorker {
    /// Wrap an interpreter environment.
    pub fn new(host: Box<dyn EvalHost>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl Behavior for LanguageWorker {
    fn kind(&self) -> BehaviorKind {
        BehaviorKind::LanguageWorker
    }

    async fn handle(
        &mut self,
        envelope: Envelope,
        ctx: &mut ActorContext,
    ) -> Result<Vec<Envelope>, HandlerError> {
        let value = match envelope.kind {
            EnvelopeKind::Eval => {
                let source = payload::str_field(&envelope.payload, "source").ok_or_else(|| {
                    HandlerError::transient("eval envelope missing source field")
                })?;
                self.host.eval(source)?
            }
            EnvelopeKind::Call => {
                let operation =
                    payload::str_field(&envelope.payload, "operation").ok_or_else(|| {
                        HandlerError::transient("call envelope missing operation field")
                    })?;
                let params = envelope
                    .payload
                    .get("params")
                    .cloned()
                    .unwrap_or(Value::Array(Vec::new()));
                self.host.call(operation, &params)?
            }
            EnvelopeKind::Reply | EnvelopeKind::Error | EnvelopeKind::Pong => {
                return Ok(Vec::new());
            }
            other => {
                return Err(HandlerError::transient(format!(
                    "language worker cannot process {other} envelopes"
                )));
            }
        };

        Ok(Envelope::reply_for(
            &envelope,
            ctx.self_address(),
            payload::pairs([("value", value)]),
        )
        .into_iter()
        .collect())
    }
}

/// Convenience host for counters and echo services, used by embedding
/// runtimes as a smoke-test environment.
pub struct ScratchHost {
    counter: i64,
    echo_prefix: String,
}

impl ScratchHost {
    /// Create a host with an optional echo prefix.
    pub fn new(echo_prefix: impl Into<String>) -> Self {
        Self {
            counter: 0,
            echo_prefix: echo_prefix.into(),
        }
    }
}

impl EvalHost for ScratchHost {
    fn eval(&mut self, source: &str) -> Result<Value, EvalError> {
        // The scratch environment has no parser; it just reports what it
        // was given.
        Ok(json!({ "echo": source }))
    }

    fn call(&mut self, operation: &str, params: &Value) -> Result<Value, EvalError> {
        match operation {
            "increment" => {
                self.counter += 1;
                Ok(json!(self.counter))
            }
            "get_count" => Ok(json!(self.counter)),
            "echo" => {
                let msg = params
                    .as_array()
                    .and_then(|a| a.first())
                    .and_then(Value::as_str)
                    .or_else(|| params.get("msg").and_then(Value::as_str))
                    .unwrap_or("");
                Ok(json!(format!("{}{}", self.echo_prefix, msg)))
            }
            other => Err(EvalError::new(format!("unknown operation: {other}"))),
        }
    }
}
