//! The interaction loop: observe, ask the oracle, dispatch, repeat.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::action::{self, Action, Decision};
use crate::capture::Observation;
use crate::config::{AgentConfig, Task};
use crate::driver::Driver;
use crate::element::ElementRef;
use crate::executor::Executor;
use crate::oracle::{prompt, DecisionRequest, Oracle};
use crate::{Error, Result};

/// A run that ended on a fatal error. Keeps what was logged before it.
#[derive(Debug, thiserror::Error)]
#[error("{error} (after {history_len} actions, {} information entries)", .information.len())]
pub struct RunFailure {
    #[source]
    pub error: Error,
    pub information: Vec<String>,
    pub history_len: usize,
}

enum State {
    Start,
    AwaitingDecision(Observation),
    Dispatching(Observation, Decision),
    Terminated,
}

/// Drives one executor with one oracle until the oracle says `done`.
pub struct Agent<D, O> {
    executor: Executor<D>,
    oracle: O,
    config: AgentConfig,
    history: Vec<String>,
    information: Vec<String>,
    steps: usize,
}

impl<D: Driver, O: Oracle> Agent<D, O> {
    pub fn new(executor: Executor<D>, oracle: O, config: AgentConfig) -> Self {
        Self {
            executor,
            oracle,
            config,
            history: Vec::new(),
            information: Vec::new(),
            steps: 0,
        }
    }

    /// Raw action blocks of every dispatched click, type and scroll.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn information(&self) -> &[String] {
        &self.information
    }

    /// Oracle decisions taken in the current or last run.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn executor(&self) -> &Executor<D> {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut Executor<D> {
        &mut self.executor
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Run `task` to completion and return the information log.
    ///
    /// History and information start empty on every run. The browser is left
    /// open; call [`close`](Self::close) when done with it.
    pub async fn run(&mut self, task: &Task) -> std::result::Result<Vec<String>, RunFailure> {
        self.history.clear();
        self.information.clear();
        self.steps = 0;

        info!("task: {}", task.instruction);
        match self.drive(task).await {
            Ok(()) => {
                info!(
                    "done after {} decisions, {} information entries",
                    self.steps,
                    self.information.len()
                );
                Ok(self.information.clone())
            }
            Err(error) => {
                warn!("run failed: {}", error);
                Err(RunFailure {
                    error,
                    information: self.information.clone(),
                    history_len: self.history.len(),
                })
            }
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        self.executor.close().await
    }

    async fn drive(&mut self, task: &Task) -> Result<()> {
        let mut state = State::Start;
        loop {
            state = match state {
                State::Start => State::AwaitingDecision(self.executor.navigate(&task.url).await?),
                State::AwaitingDecision(observation) => {
                    let decision = self.decide(task, &observation).await?;
                    State::Dispatching(observation, decision)
                }
                State::Dispatching(observation, decision) => {
                    match self.dispatch(observation, decision).await? {
                        Some(next) => {
                            self.step_delay().await;
                            State::AwaitingDecision(next)
                        }
                        None => State::Terminated,
                    }
                }
                State::Terminated => return Ok(()),
            };
        }
    }

    /// Ask the oracle for the next action, re-prompting on unparseable
    /// answers while `parse_retries` allows.
    async fn decide(&mut self, task: &Task, observation: &Observation) -> Result<Decision> {
        if let Some(max) = self.config.max_steps {
            if self.steps >= max {
                return Err(Error::StepLimit(max));
            }
        }

        let base = prompt::build(
            &task.instruction,
            &self.history,
            &self.information,
            self.config.history_window,
        );
        let mut request = DecisionRequest::new(base.clone(), observation);
        let mut retries_left = self.config.parse_retries;

        loop {
            let text = self.oracle.decide(&request).await?;
            match action::parse_response(&text) {
                Ok(decision) => {
                    self.steps += 1;
                    info!(
                        "decision {}: {} - {}",
                        self.steps,
                        decision.action.name(),
                        decision.explanation.as_deref().unwrap_or("")
                    );
                    return Ok(decision);
                }
                Err(Error::OracleParse(msg)) if retries_left > 0 => {
                    retries_left -= 1;
                    warn!("oracle answer rejected ({}), re-prompting", msg);
                    request.prompt = format!("{}{}", base, prompt::correction(&msg));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Route a decision. Returns the observation to decide on next, or
    /// `None` once the task is done.
    async fn dispatch(&mut self, current: Observation, decision: Decision) -> Result<Option<Observation>> {
        let next = match &decision.action {
            Action::Click { element } => {
                let target = ElementRef {
                    generation: current.generation,
                    index: *element,
                };
                self.executor.click(target).await?
            }
            Action::Type { text, press } => self.executor.type_text(text, press.as_deref()).await?,
            Action::Scroll { x, y } => self.executor.scroll(*x, *y).await?,
            Action::InformationLog { text } => {
                info!("information: {}", text);
                self.information.push(text.clone());
                return Ok(Some(current));
            }
            Action::Done => return Ok(None),
        };
        self.history.push(decision.raw);
        Ok(Some(next))
    }

    async fn step_delay(&self) {
        if self.config.step_delay_ms > 0 {
            debug!("waiting {}ms before next decision", self.config.step_delay_ms);
            tokio::time::sleep(Duration::from_millis(self.config.step_delay_ms)).await;
        }
    }
}
