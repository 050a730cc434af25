//! 共享状态：AgentState 与 StateDelta
//!
//! 每个节点只返回 StateDelta，由编排器串行 apply；各字段的合并规则：
//! - messages / history：追加
//! - tasks_to_do / order_task：整体替换
//! - results / error / task_completed：逐键覆盖（TaskMap::merge）
//! - resolved_errors：合并之后再从 error 中删除

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::TaskMap;
use crate::memory::{ConversationMemory, Message};

/// history 中记录的节点名
pub const NODE_CLASSIFY: &str = "classify_tasks";
pub const NODE_ORDER: &str = "task_order";
pub const NODE_RECOVERY: &str = "task_error";
pub const NODE_AGGREGATOR: &str = "task_aggregator";

/// 非任务节点在 results / error / task_completed 中使用的键
pub const KEY_CLASSIFY: &str = "classify";
pub const KEY_ORDER: &str = "order";
pub const KEY_AGGREGATOR: &str = "aggregator";
pub const KEY_ERROR: &str = "error";

/// 固定的任务集合
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Weather,
    Exchange,
    News,
}

impl TaskKind {
    pub const ALL: [TaskKind; 3] = [TaskKind::Weather, TaskKind::Exchange, TaskKind::News];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Weather => "weather",
            TaskKind::Exchange => "exchange",
            TaskKind::News => "news",
        }
    }

    /// 写入 history 的节点名
    pub fn node_name(&self) -> &'static str {
        match self {
            TaskKind::Weather => "task_weather",
            TaskKind::Exchange => "task_exchange",
            TaskKind::News => "task_news",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weather" => Ok(TaskKind::Weather),
            "exchange" => Ok(TaskKind::Exchange),
            "news" => Ok(TaskKind::News),
            other => Err(format!("unknown task '{other}'")),
        }
    }
}

/// 单次请求内贯穿所有节点的状态
#[derive(Clone, Debug, Default, Serialize)]
pub struct AgentState {
    pub messages: ConversationMemory,
    pub tasks_to_do: TaskMap<bool>,
    pub order_task: TaskMap<i64>,
    pub results: TaskMap<Vec<String>>,
    pub error: TaskMap<String>,
    pub task_completed: TaskMap<bool>,
    pub history: Vec<String>,
    pub ready_to_aggregate: bool,
    /// 每个任务恢复失败的次数，仅用于重试上限
    pub recovery_attempts: TaskMap<u32>,
}

impl AgentState {
    /// 以调用方的对话窗口为起点创建新状态
    pub fn new(conversation: ConversationMemory) -> Self {
        Self {
            messages: conversation,
            ..Self::default()
        }
    }

    pub fn last_user_message(&self) -> &str {
        self.messages.last_user().unwrap_or("")
    }

    /// tasks_to_do 中值为 true 的任务（保持分类结果的顺序）
    pub fn requested_tasks(&self) -> Vec<TaskKind> {
        self.tasks_to_do
            .iter()
            .filter(|(_, wanted)| **wanted)
            .filter_map(|(name, _)| name.parse().ok())
            .collect()
    }

    /// 尚未出现在 task_completed 中的已请求任务
    pub fn pending_tasks(&self) -> Vec<TaskKind> {
        self.requested_tasks()
            .into_iter()
            .filter(|t| !self.task_completed.contains_key(t.as_str()))
            .collect()
    }

    pub fn all_requested_completed(&self) -> bool {
        self.pending_tasks().is_empty()
    }

    pub fn apply(&mut self, delta: StateDelta) {
        if delta.reset {
            self.reset();
        }
        self.messages.extend(delta.messages);
        if let Some(tasks) = delta.tasks_to_do {
            self.tasks_to_do = tasks;
        }
        if let Some(order) = delta.order_task {
            self.order_task = order;
        }
        self.results.merge(delta.results);
        self.error.merge(delta.error);
        for key in &delta.resolved_errors {
            self.error.remove(key);
        }
        self.task_completed.merge(delta.task_completed);
        self.history.extend(delta.history);
    }

    /// 重新分类时的完整重置（messages / history 保留）
    fn reset(&mut self) {
        self.tasks_to_do.clear();
        self.order_task.clear();
        self.results.clear();
        self.error.clear();
        self.task_completed.clear();
        self.recovery_attempts.clear();
        self.ready_to_aggregate = false;
    }
}

/// 节点产出的部分更新
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateDelta {
    pub reset: bool,
    pub messages: Vec<Message>,
    pub tasks_to_do: Option<TaskMap<bool>>,
    pub order_task: Option<TaskMap<i64>>,
    pub results: TaskMap<Vec<String>>,
    pub error: TaskMap<String>,
    pub task_completed: TaskMap<bool>,
    pub resolved_errors: Vec<String>,
    pub history: Vec<String>,
}

impl StateDelta {
    /// 只记录访问过的节点
    pub fn visited(node: &str) -> Self {
        Self {
            history: vec![node.to_string()],
            ..Self::default()
        }
    }

    /// 任务成功：只写 results，不带 error
    pub fn task_success(task: TaskKind, message: impl Into<String>) -> Self {
        Self::visited(task.node_name())
            .with_result(task.as_str(), vec![message.into()])
            .completed(task.as_str(), true)
    }

    /// 任务终止性失败：只写 error，同样标记完成
    pub fn task_failure(task: TaskKind, error: impl Into<String>) -> Self {
        Self::visited(task.node_name())
            .with_error(task.as_str(), error)
            .completed(task.as_str(), true)
    }

    pub fn with_result(mut self, key: &str, values: Vec<String>) -> Self {
        self.results.insert(key, values);
        self
    }

    pub fn with_error(mut self, key: &str, error: impl Into<String>) -> Self {
        self.error.insert(key, error.into());
        self
    }

    pub fn completed(mut self, key: &str, done: bool) -> Self {
        self.task_completed.insert(key, done);
        self
    }

    pub fn resolve_error(mut self, key: &str) -> Self {
        self.resolved_errors.push(key.to_string());
        self
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }
}
