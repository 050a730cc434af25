//! 编排器：单次请求的主控循环
//!
//! 固定拓扑：Classifying -> Ordering -> Dispatched（并发派发 + 汇合）-> Recovering* -> Aggregating -> Done。
//! 所有节点只产出 StateDelta，由这里串行 apply；分类失败直接跳到 Done。
//! 每两个阶段之间检查取消令牌。

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::core::recovery::{ErrorRecoveryNode, RecoveryStep};
use crate::core::{
    AgentError, AgentState, StateDelta, TaskMap, TaskScheduler, KEY_AGGREGATOR, KEY_CLASSIFY,
};
use crate::handlers::{crashed, HandlerExecutor};
use crate::llm::LlmClient;
use crate::nodes::{Aggregator, Classifier, Orderer};

/// 默认每个任务最多恢复失败 2 次
pub const DEFAULT_MAX_RECOVERY_ATTEMPTS: u32 = 2;

/// 编排阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Classifying,
    Ordering,
    Dispatched,
    Recovering,
    Aggregating,
    Done,
}

/// 请求的终止方式
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    /// 正常走到聚合（可能没有任何任务）
    Aggregated,
    /// 分类失败，携带诊断信息
    ClassificationFailed(String),
}

/// 一次请求的最终输出
#[derive(Clone, Debug, Serialize)]
pub struct Reply {
    pub request_id: String,
    /// 聚合后的文本，按展示顺序
    pub response: Vec<String>,
    pub history: Vec<String>,
    pub phases: Vec<Phase>,
    pub results: TaskMap<Vec<String>>,
    pub outcome: Outcome,
    pub started_at: i64,
    pub finished_at: i64,
}

impl Reply {
    pub fn text(&self) -> String {
        self.response.join("\n\n")
    }
}

pub struct Orchestrator {
    classifier: Classifier,
    orderer: Orderer,
    executor: HandlerExecutor,
    scheduler: TaskScheduler,
    recovery: ErrorRecoveryNode,
    aggregator: Aggregator,
    max_recovery_attempts: u32,
}

impl Orchestrator {
    pub fn new(llm: Arc<dyn LlmClient>, executor: HandlerExecutor) -> Self {
        Self {
            classifier: Classifier::new(llm.clone()),
            orderer: Orderer::new(llm.clone()),
            executor,
            scheduler: TaskScheduler::default(),
            recovery: ErrorRecoveryNode::new(llm.clone()),
            aggregator: Aggregator::new(llm),
            max_recovery_attempts: DEFAULT_MAX_RECOVERY_ATTEMPTS,
        }
    }

    pub fn with_scheduler(mut self, scheduler: TaskScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_max_recovery_attempts(mut self, attempts: u32) -> Self {
        self.max_recovery_attempts = attempts.max(1);
        self
    }

    /// 驱动一次请求直到 Done；state 需已包含本轮用户消息
    pub async fn run(
        &self,
        state: &mut AgentState,
        cancel: &CancellationToken,
    ) -> Result<Reply, AgentError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("request", id = %request_id);
        self.drive(state, cancel, request_id).instrument(span).await
    }

    async fn drive(
        &self,
        state: &mut AgentState,
        cancel: &CancellationToken,
        request_id: String,
    ) -> Result<Reply, AgentError> {
        let started_at = Utc::now().timestamp_millis();
        let mut phase = Phase::Classifying;
        let mut phases = vec![phase];
        let mut outcome = Outcome::Aggregated;

        while phase != Phase::Done {
            if cancel.is_cancelled() {
                tracing::warn!(phase = ?phase, "request cancelled");
                return Err(AgentError::Cancelled);
            }

            let next = match phase {
                Phase::Classifying => {
                    let delta = self.classifier.classify(state).await;
                    state.apply(delta);
                    match state.error.get(KEY_CLASSIFY) {
                        Some(diagnostic) => {
                            outcome = Outcome::ClassificationFailed(diagnostic.clone());
                            Phase::Done
                        }
                        None => Phase::Ordering,
                    }
                }
                Phase::Ordering => {
                    let delta = self.orderer.order(state).await;
                    state.apply(delta);
                    Phase::Dispatched
                }
                Phase::Dispatched => {
                    self.dispatch(state, cancel).await?;
                    self.route(state)
                }
                Phase::Recovering => {
                    self.recover_one(state).await;
                    self.route(state)
                }
                Phase::Aggregating => {
                    let delta = self.aggregator.aggregate(state).await;
                    state.apply(delta);
                    Phase::Done
                }
                Phase::Done => Phase::Done,
            };

            tracing::debug!(from = ?phase, to = ?next, "phase transition");
            phase = next;
            phases.push(phase);
        }

        let response = match &outcome {
            Outcome::Aggregated => state.results.get(KEY_AGGREGATOR).cloned().unwrap_or_default(),
            Outcome::ClassificationFailed(diagnostic) => vec![diagnostic.clone()],
        };

        tracing::info!(history = ?state.history, "request finished");
        Ok(Reply {
            request_id,
            response,
            history: state.history.clone(),
            phases,
            results: state.results.clone(),
            outcome,
            started_at,
            finished_at: Utc::now().timestamp_millis(),
        })
    }

    /// 并发运行所有被请求的任务，按派发顺序合并结果
    async fn dispatch(
        &self,
        state: &mut AgentState,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        let requested = state.requested_tasks();
        let request = state.last_user_message().to_string();
        tracing::info!(tasks = ?requested, "dispatching tasks");

        let jobs: Vec<_> = requested
            .iter()
            .map(|kind| (*kind, self.executor.job(*kind, request.clone())))
            .collect();

        for (kind, result) in self.scheduler.run_all(jobs, cancel).await? {
            let delta = match result {
                Ok(delta) => delta,
                Err(e) => crashed(kind, &e),
            };
            state.apply(delta);
        }

        // 每个被请求的任务必须有完成标记，否则路由永远等不到
        for kind in state.pending_tasks() {
            tracing::error!(task = %kind, "task did not report completion");
            state.apply(StateDelta::task_failure(
                kind,
                format!("The {kind} task finished without reporting a result."),
            ));
        }
        Ok(())
    }

    /// 有错误先逐条恢复，全部完成且无错误才聚合
    fn route(&self, state: &mut AgentState) -> Phase {
        state.ready_to_aggregate = state.all_requested_completed() && state.error.is_empty();
        if state.ready_to_aggregate {
            Phase::Aggregating
        } else {
            tracing::debug!(errors = state.error.len(), "routing to error recovery");
            Phase::Recovering
        }
    }

    async fn recover_one(&self, state: &mut AgentState) {
        match self.recovery.recover(state).await {
            None => {}
            Some(RecoveryStep::Resolved { delta, .. }) => state.apply(delta),
            Some(RecoveryStep::Failed {
                task,
                raw_error,
                delta,
                ..
            }) => {
                state.apply(delta);
                let attempts = state.recovery_attempts.get(&task).copied().unwrap_or(0) + 1;
                state.recovery_attempts.insert(task.as_str(), attempts);
                if attempts >= self.max_recovery_attempts {
                    tracing::warn!(
                        task = %task,
                        attempts,
                        error = %raw_error,
                        "recovery attempts exhausted, using fallback explanation"
                    );
                    state.apply(ErrorRecoveryNode::force_resolve(&task));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::core::TaskKind;
    use crate::handlers::{HandlerRegistry, TaskHandler};
    use crate::llm::{LlmError, MockLlmClient};
    use crate::memory::{ConversationMemory, Message};
    use async_trait::async_trait;

    struct Echo(TaskKind);

    #[async_trait]
    impl TaskHandler for Echo {
        fn kind(&self) -> TaskKind {
            self.0
        }

        async fn handle(&self, _request: &str) -> Result<String, AgentError> {
            Ok(format!("{} ok", self.0))
        }
    }

    struct Broken(TaskKind);

    #[async_trait]
    impl TaskHandler for Broken {
        fn kind(&self) -> TaskKind {
            self.0
        }

        async fn handle(&self, _request: &str) -> Result<String, AgentError> {
            Err(AgentError::Provider(format!("{} provider down", self.0)))
        }
    }

    fn state(text: &str) -> AgentState {
        let mut conv = ConversationMemory::new(10);
        conv.push(Message::user(text));
        AgentState::new(conv)
    }

    fn executor(handlers: Vec<Arc<dyn TaskHandler>>) -> HandlerExecutor {
        let mut registry = HandlerRegistry::new();
        for h in handlers {
            registry.register_arc(h);
        }
        HandlerExecutor::new(registry, 5)
    }

    #[tokio::test]
    async fn test_happy_path_phases() {
        let llm = MockLlmClient::new()
            .on("You classify requests", r#"{"weather": true, "exchange": true, "news": false}"#)
            .on("Decide the order", r#"{"exchange": 1, "weather": 2}"#)
            .fail_on("Rewrite the following message", LlmError::Transport("offline".into()));
        let orchestrator = Orchestrator::new(
            Arc::new(llm),
            executor(vec![Arc::new(Echo(TaskKind::Weather)), Arc::new(Echo(TaskKind::Exchange))]),
        );

        let mut s = state("dollar to euro and weather in Rome");
        let reply = orchestrator.run(&mut s, &CancellationToken::new()).await.unwrap();

        assert_eq!(reply.outcome, Outcome::Aggregated);
        assert_eq!(reply.response, vec!["Exchange: exchange ok", "Weather: weather ok"]);
        assert_eq!(
            reply.phases,
            vec![
                Phase::Classifying,
                Phase::Ordering,
                Phase::Dispatched,
                Phase::Aggregating,
                Phase::Done
            ]
        );
        assert_eq!(reply.history.first().map(String::as_str), Some("classify_tasks"));
        assert_eq!(reply.history.last().map(String::as_str), Some("task_aggregator"));
        assert!(s.ready_to_aggregate);
        assert!(reply.finished_at >= reply.started_at);
    }

    #[tokio::test]
    async fn test_recovery_gives_up_after_cap() {
        let llm = Arc::new(
            MockLlmClient::new()
                .on(
                    "You classify requests",
                    r#"{"weather": false, "exchange": false, "news": true}"#,
                )
                .on("Decide the order", r#"{"news": 1}"#)
                .fail_on("interpreting errors", LlmError::Timeout(Duration::from_secs(1)))
                .fail_on("Rewrite the following message", LlmError::Transport("offline".into())),
        );
        let broken = executor(vec![Arc::new(Broken(TaskKind::News))]);
        let orchestrator = Orchestrator::new(llm.clone(), broken).with_max_recovery_attempts(3);

        let mut s = state("news for UK");
        let reply = orchestrator.run(&mut s, &CancellationToken::new()).await.unwrap();

        assert_eq!(llm.calls_containing("interpreting errors"), 3);
        assert!(s.error.is_empty());
        assert_eq!(reply.response.len(), 1);
        assert!(reply.response[0].starts_with("News: Sorry, I couldn't get the latest news"));
        assert!(!reply.response[0].contains("news provider down"));
        assert_eq!(
            reply.phases.iter().filter(|p| **p == Phase::Recovering).count(),
            3
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let orchestrator = Orchestrator::new(Arc::new(MockLlmClient::new()), executor(vec![]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = orchestrator.run(&mut state("weather"), &cancel).await.unwrap_err();
        assert_eq!(err, AgentError::Cancelled);
    }
}
