// In-memory stand-in for the Python engine used by unit tests
use crate::engine::{CallError, CodeEngine, EvalContext, LoadError};
use async_trait::async_trait;
use spi_common::types::{ResultValue, TestCase};
use std::sync::Mutex;

type Behaviour = Box<dyn Fn(&str) -> Option<ResultValue> + Send + Sync>;

/// Suites are `|`-separated argument literals. A definition fails to load
/// when it contains `SYNTAX ERROR`. A call is answered by the behaviour
/// whose marker occurs in the most recently loaded definition; a `None`
/// from the behaviour means the function raised. A chained call hands the
/// consumer `(<producer output>,) + <args>`.
pub struct FakeEngine {
    behaviours: Vec<(String, Behaviour)>,
    pub loads: Mutex<Vec<String>>,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            behaviours: Vec::new(),
            loads: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with(
        mut self,
        marker: &str,
        behaviour: impl Fn(&str) -> Option<ResultValue> + Send + Sync + 'static,
    ) -> Self {
        self.behaviours.push((marker.to_string(), Box::new(behaviour)));
        self
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(n, _)| n == name).count()
    }
}

#[async_trait]
impl CodeEngine for FakeEngine {
    async fn parse_suite(
        &self,
        literal: &str,
        split_token: &str,
    ) -> Result<Vec<TestCase>, LoadError> {
        if literal.contains("SYNTAX ERROR") {
            return Err(LoadError::Suite {
                literal: literal.to_string(),
                diagnostics: "SyntaxError".to_string(),
            });
        }
        Ok(literal
            .split('|')
            .filter(|part| !part.is_empty())
            .map(|part| {
                if part == split_token {
                    TestCase::Sentinel
                } else {
                    TestCase::args(part)
                }
            })
            .collect())
    }

    async fn load(&self, ctx: &mut EvalContext, definition: &str) -> Result<(), LoadError> {
        self.loads.lock().unwrap().push(definition.to_string());
        if definition.contains("SYNTAX ERROR") {
            return Err(LoadError::Definition {
                source_text: definition.to_string(),
                diagnostics: "SyntaxError: invalid syntax".to_string(),
            });
        }
        ctx.push(definition);
        Ok(())
    }

    async fn call(
        &self,
        ctx: &EvalContext,
        name: &str,
        args: &TestCase,
    ) -> Result<ResultValue, CallError> {
        let TestCase::Args(literal) = args else {
            return Err(CallError::Protocol("sentinel".to_string()));
        };
        self.calls.lock().unwrap().push((name.to_string(), literal.clone()));

        let raised = |message: &str| CallError::Raised {
            name: name.to_string(),
            message: message.to_string(),
        };

        let definition = ctx
            .definitions()
            .iter()
            .rev()
            .find(|d| d.contains(name))
            .ok_or_else(|| raised("NameError"))?;

        if definition.contains("dummy function invoked") {
            return Err(raised("dummy function invoked!"));
        }

        let (_, behaviour) = self
            .behaviours
            .iter()
            .find(|(marker, _)| definition.contains(marker.as_str()))
            .ok_or_else(|| raised("no behaviour"))?;

        behaviour(literal).ok_or_else(|| raised("Exception"))
    }

    async fn call_chained(
        &self,
        ctx: &EvalContext,
        producer: &str,
        consumer: &str,
        args: &TestCase,
    ) -> Result<(ResultValue, ResultValue), CallError> {
        let TestCase::Args(literal) = args else {
            return Err(CallError::Protocol("sentinel".to_string()));
        };
        let output = self.call(ctx, producer, args).await?;
        let consumer_args = TestCase::args(format!("({},) + {}", output, literal));
        let verdict = self.call(ctx, consumer, &consumer_args).await?;
        Ok((output, verdict))
    }
}
