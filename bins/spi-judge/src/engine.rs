/// Predicate Engine - Loading and Calling Python Definitions
///
/// **Responsibility:**
/// Make function definitions callable by name inside an evaluation context,
/// call them with test-case arguments, and turn test-suite literals into
/// test cases.
///
/// **Contexts:**
/// An `EvalContext` is the name-to-callable table of one evaluation. It only
/// holds definitions that loaded successfully, in load order; a later
/// definition of the same name shadows an earlier one. Each candidate gets a
/// fresh context so nothing leaks from one candidate into the next.
///
/// **Execution Model (PythonEngine):**
/// Every operation starts a fresh interpreter that runs a small driver
/// program. The driver reads one JSON request on stdin, executes the
/// context's definitions into an empty namespace, performs the operation and
/// writes one JSON response line to the original stdout. Whatever the loaded
/// code prints is captured and dropped.
///
/// **Safety Guarantees:**
/// - Hard timeout: enforced via tokio::time::timeout, child killed on drop
/// - Input validation: rejects oversized definitions before spawning
/// - Error classification: raised exception, crash, timeout and spawn
///   failures are distinct errors
///
/// There is no isolation beyond the process boundary; loaded code runs with
/// the permissions of the judge.

use crate::config::EvaluatorConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use spi_common::types::{ResultValue, TestCase};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

pub const MAX_DEFINITION_BYTES: usize = 1024 * 1024;
const STDERR_TAIL_LINES: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("definition could not be loaded: {diagnostics}")]
    Definition {
        source_text: String,
        diagnostics: String,
    },

    #[error("loading timed out after {limit_ms}ms")]
    Timeout { source_text: String, limit_ms: u64 },

    #[error("test suite literal could not be parsed: {diagnostics}")]
    Suite { literal: String, diagnostics: String },

    #[error("interpreter could not be started: {0}")]
    Spawn(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("{name} raised: {message}")]
    Raised { name: String, message: String },

    #[error("{name} crashed (exit status {status:?}): {stderr}")]
    Crashed {
        name: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("{name} timed out after {limit_ms}ms")]
    Timeout { name: String, limit_ms: u64 },

    #[error("interpreter protocol error: {0}")]
    Protocol(String),

    #[error("interpreter could not be started: {0}")]
    Spawn(String),
}

/// Definitions visible to calls made in one evaluation
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    definitions: Vec<String>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn definitions(&self) -> &[String] {
        &self.definitions
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub(crate) fn push(&mut self, definition: &str) {
        self.definitions.push(definition.to_string());
    }
}

#[async_trait]
pub trait CodeEngine: Send + Sync {
    /// Evaluate a literal sequence of test cases. Elements equal to
    /// `split_token` become `TestCase::Sentinel`.
    async fn parse_suite(
        &self,
        literal: &str,
        split_token: &str,
    ) -> Result<Vec<TestCase>, LoadError>;

    /// Validate `definition` on top of the context and add it. The context is
    /// left untouched on failure.
    async fn load(&self, ctx: &mut EvalContext, definition: &str) -> Result<(), LoadError>;

    /// Call a loaded function with the test case's positional arguments
    async fn call(
        &self,
        ctx: &EvalContext,
        name: &str,
        args: &TestCase,
    ) -> Result<ResultValue, CallError>;

    /// Call `producer` with the test case's arguments, then `consumer` with
    /// the producer's result in front of the same arguments. Returns both
    /// results.
    async fn call_chained(
        &self,
        ctx: &EvalContext,
        producer: &str,
        consumer: &str,
        args: &TestCase,
    ) -> Result<(ResultValue, ResultValue), CallError>;
}

/// Expression selecting element `index` of a suite literal. Re-evaluating
/// the literal keeps argument values exact where a repr round trip would not.
pub fn suite_element(literal: &str, index: usize) -> String {
    format!("list((\n{}\n))[{}]", literal, index)
}

/// Driver executed by the interpreter for every request
const DRIVER: &str = r#"
import io, json, sys, traceback

def describe(value):
    if isinstance(value, bool):
        return {"kind": "bool", "value": value}
    if value is None:
        return {"kind": "none"}
    try:
        truthy = bool(value)
    except Exception:
        truthy = False
    equals = None
    try:
        if value == True:
            equals = True
        elif value == False:
            equals = False
    except Exception:
        pass
    return {"kind": "other", "repr": repr(value), "truthy": truthy, "equals": equals}

def main():
    request = json.load(sys.stdin)
    sys.stdout = io.StringIO()
    mode = request["mode"]
    if mode == "parse":
        cases = []
        for index, case in enumerate(eval(request["literal"], {})):
            if isinstance(case, str) and case == request["sentinel"]:
                cases.append(None)
            else:
                cases.append(index)
        return {"status": "ok", "cases": cases}
    namespace = {}
    for source in request["definitions"]:
        exec(source, namespace)
    if mode == "load":
        return {"status": "ok"}
    args = tuple(eval(request["args"], {}))
    if mode == "chain":
        output = namespace[request["producer"]](*args)
        verdict = namespace[request["consumer"]](output, *args)
        return {"status": "ok", "result": describe(verdict), "output": describe(output)}
    return {"status": "ok", "result": describe(namespace[request["name"]](*args))}

out = sys.stdout
try:
    response = main()
except BaseException as e:
    message = "".join(traceback.format_exception_only(type(e), e)).strip()
    response = {"status": "error", "error": message}
out.write(json.dumps(response) + "\n")
out.flush()
"#;

#[derive(Debug, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
enum DriverRequest<'a> {
    Parse {
        literal: &'a str,
        sentinel: &'a str,
    },
    Load {
        definitions: Vec<&'a str>,
    },
    Call {
        definitions: Vec<&'a str>,
        name: &'a str,
        args: &'a str,
    },
    Chain {
        definitions: Vec<&'a str>,
        producer: &'a str,
        consumer: &'a str,
        args: &'a str,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum DriverResponse {
    Ok {
        #[serde(default)]
        cases: Option<Vec<Option<usize>>>,
        #[serde(default)]
        result: Option<DriverValue>,
        #[serde(default)]
        output: Option<DriverValue>,
    },
    Error {
        error: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum DriverValue {
    Bool { value: bool },
    #[serde(rename = "none")]
    Nothing,
    Other {
        repr: String,
        #[serde(default)]
        truthy: bool,
        #[serde(default)]
        equals: Option<bool>,
    },
}

impl From<DriverValue> for ResultValue {
    fn from(value: DriverValue) -> Self {
        match value {
            DriverValue::Bool { value } => ResultValue::Bool(value),
            DriverValue::Nothing => ResultValue::NoAnswer,
            DriverValue::Other {
                repr,
                truthy,
                equals,
            } => ResultValue::other(repr, truthy, equals),
        }
    }
}

/// What came back from one interpreter run
#[derive(Debug)]
enum DriverOutcome {
    Response(DriverResponse),
    Crashed { status: Option<i32>, stderr: String },
    TimedOut,
    Spawn(String),
}

/// Parse the driver's response line from captured stdout
fn parse_response(stdout: &str) -> Option<DriverResponse> {
    stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .and_then(|line| serde_json::from_str(line).ok())
}

/// Keep the last few lines of stderr, which carry the interesting part of
/// a traceback
fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

pub struct PythonEngine {
    python: String,
    call_timeout: Duration,
    load_timeout: Duration,
}

impl PythonEngine {
    pub fn new(python: impl Into<String>, call_timeout: Duration, load_timeout: Duration) -> Self {
        Self {
            python: python.into(),
            call_timeout,
            load_timeout,
        }
    }

    pub fn new_with_config(config: &EvaluatorConfig) -> Self {
        Self::new(config.python.clone(), config.call_timeout(), config.load_timeout())
    }

    /// Run the driver once with a hard wall-clock limit
    async fn run_driver(&self, request: &DriverRequest<'_>, limit: Duration) -> DriverOutcome {
        let payload = match serde_json::to_vec(request) {
            Ok(payload) => payload,
            Err(e) => return DriverOutcome::Spawn(format!("request serialization failed: {}", e)),
        };

        let mut child = match Command::new(&self.python)
            .arg("-c")
            .arg(DRIVER)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return DriverOutcome::Spawn(format!("{}: {}", self.python, e)),
        };

        let Some(mut stdin) = child.stdin.take() else {
            return DriverOutcome::Spawn("interpreter stdin unavailable".to_string());
        };

        // Dropping the future on timeout drops the child, which kills it
        let execution = async move {
            stdin.write_all(&payload).await?;
            drop(stdin);
            child.wait_with_output().await
        };

        match tokio::time::timeout(limit, execution).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                match parse_response(&stdout) {
                    Some(response) => DriverOutcome::Response(response),
                    None => DriverOutcome::Crashed {
                        status: output.status.code(),
                        stderr: stderr_tail(&String::from_utf8_lossy(&output.stderr)),
                    },
                }
            }
            Ok(Err(e)) => DriverOutcome::Crashed {
                status: None,
                stderr: format!("interpreter I/O failed: {}", e),
            },
            Err(_) => DriverOutcome::TimedOut,
        }
    }
}

impl PythonEngine {
    /// Result and producer output of a call-mode run, or the classified
    /// failure
    fn call_values(
        &self,
        name: &str,
        outcome: DriverOutcome,
    ) -> Result<(Option<DriverValue>, Option<DriverValue>), CallError> {
        match outcome {
            DriverOutcome::Response(DriverResponse::Ok { result, output, .. }) => Ok((result, output)),
            DriverOutcome::Response(DriverResponse::Error { error }) => Err(CallError::Raised {
                name: name.to_string(),
                message: error,
            }),
            DriverOutcome::Crashed { status, stderr } => Err(CallError::Crashed {
                name: name.to_string(),
                status,
                stderr,
            }),
            DriverOutcome::TimedOut => Err(CallError::Timeout {
                name: name.to_string(),
                limit_ms: self.call_timeout.as_millis() as u64,
            }),
            DriverOutcome::Spawn(e) => Err(CallError::Spawn(e)),
        }
    }
}

#[async_trait]
impl CodeEngine for PythonEngine {
    async fn parse_suite(
        &self,
        literal: &str,
        split_token: &str,
    ) -> Result<Vec<TestCase>, LoadError> {
        let request = DriverRequest::Parse {
            literal,
            sentinel: split_token,
        };
        let suite_error = |diagnostics: String| LoadError::Suite {
            literal: literal.to_string(),
            diagnostics,
        };

        match self.run_driver(&request, self.load_timeout).await {
            DriverOutcome::Response(DriverResponse::Ok { cases: Some(cases), .. }) => Ok(cases
                .into_iter()
                .map(|case| match case {
                    Some(index) => TestCase::args(suite_element(literal, index)),
                    None => TestCase::Sentinel,
                })
                .collect()),
            DriverOutcome::Response(DriverResponse::Ok { cases: None, .. }) => {
                Err(suite_error("driver returned no cases".to_string()))
            }
            DriverOutcome::Response(DriverResponse::Error { error }) => Err(suite_error(error)),
            DriverOutcome::Crashed { status, stderr } => {
                Err(suite_error(format!("exit status {:?}: {}", status, stderr)))
            }
            DriverOutcome::TimedOut => Err(suite_error(format!(
                "timed out after {}ms",
                self.load_timeout.as_millis()
            ))),
            DriverOutcome::Spawn(e) => Err(LoadError::Spawn(e)),
        }
    }

    async fn load(&self, ctx: &mut EvalContext, definition: &str) -> Result<(), LoadError> {
        if definition.len() > MAX_DEFINITION_BYTES {
            return Err(LoadError::Definition {
                source_text: definition.to_string(),
                diagnostics: format!("definition exceeds maximum size of {} bytes", MAX_DEFINITION_BYTES),
            });
        }

        let mut definitions: Vec<&str> = ctx.definitions().iter().map(String::as_str).collect();
        definitions.push(definition);
        let request = DriverRequest::Load { definitions };

        debug!(definitions = ctx.definitions().len() + 1, "Loading definition");

        match self.run_driver(&request, self.load_timeout).await {
            DriverOutcome::Response(DriverResponse::Ok { .. }) => {
                ctx.push(definition);
                Ok(())
            }
            DriverOutcome::Response(DriverResponse::Error { error }) => Err(LoadError::Definition {
                source_text: definition.to_string(),
                diagnostics: error,
            }),
            DriverOutcome::Crashed { status, stderr } => Err(LoadError::Definition {
                source_text: definition.to_string(),
                diagnostics: format!("exit status {:?}: {}", status, stderr),
            }),
            DriverOutcome::TimedOut => Err(LoadError::Timeout {
                source_text: definition.to_string(),
                limit_ms: self.load_timeout.as_millis() as u64,
            }),
            DriverOutcome::Spawn(e) => Err(LoadError::Spawn(e)),
        }
    }

    async fn call(
        &self,
        ctx: &EvalContext,
        name: &str,
        args: &TestCase,
    ) -> Result<ResultValue, CallError> {
        let TestCase::Args(literal) = args else {
            return Err(CallError::Protocol("the group sentinel is not a test case".to_string()));
        };

        let request = DriverRequest::Call {
            definitions: ctx.definitions().iter().map(String::as_str).collect(),
            name,
            args: literal,
        };

        let outcome = self.run_driver(&request, self.call_timeout).await;
        match self.call_values(name, outcome)? {
            (Some(result), _) => Ok(result.into()),
            (None, _) => Err(CallError::Protocol("driver returned no result".to_string())),
        }
    }

    async fn call_chained(
        &self,
        ctx: &EvalContext,
        producer: &str,
        consumer: &str,
        args: &TestCase,
    ) -> Result<(ResultValue, ResultValue), CallError> {
        let TestCase::Args(literal) = args else {
            return Err(CallError::Protocol("the group sentinel is not a test case".to_string()));
        };

        let request = DriverRequest::Chain {
            definitions: ctx.definitions().iter().map(String::as_str).collect(),
            producer,
            consumer,
            args: literal,
        };

        let name = format!("{} -> {}", producer, consumer);
        let outcome = self.run_driver(&request, self.call_timeout).await;
        match self.call_values(&name, outcome)? {
            (Some(result), Some(output)) => Ok((output.into(), result.into())),
            _ => Err(CallError::Protocol("driver returned no result".to_string())),
        }
    }
}
