//! 按插入顺序保存的「任务名 -> 值」映射，以及 results / error / task_completed 共用的 reducer
//!
//! 合并规则是浅层的逐键覆盖：右侧的键替换左侧同名键（位置不变），右侧没有的键保留。
//! 覆盖不满足交换律，调用方按派发顺序合并。

use serde::de::DeserializeOwned;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::core::StateError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for TaskMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> TaskMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 单键映射，delta 中最常见的形状
    pub fn single(key: impl Into<String>, value: V) -> Self {
        let mut map = Self::new();
        map.insert(key, value);
        map
    }

    /// 插入或原位覆盖，返回旧值
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    /// 最早插入的条目
    pub fn first(&self) -> Option<(&str, &V)> {
        self.entries.first().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// reducer：逐键覆盖合并
    pub fn merge(&mut self, update: TaskMap<V>) {
        for (k, v) in update.entries {
            self.insert(k, v);
        }
    }

    /// reducer 的纯函数形式
    pub fn merged(mut self, update: TaskMap<V>) -> Self {
        self.merge(update);
        self
    }
}

impl<V: DeserializeOwned> TaskMap<V> {
    /// 把推理服务给出的 JSON 转成映射；非对象或值类型不符时返回 MalformedUpdate
    pub fn from_json(field: &str, value: &Value) -> Result<Self, StateError> {
        let obj = value.as_object().ok_or_else(|| {
            StateError::malformed(field, format!("expected a mapping, got {}", json_kind(value)))
        })?;

        let mut map = Self::new();
        for (k, v) in obj {
            let parsed: V = serde_json::from_value(v.clone())
                .map_err(|e| StateError::malformed(field, format!("key '{}': {}", k, e)))?;
            map.insert(k.clone(), parsed);
        }
        Ok(map)
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for TaskMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<V> IntoIterator for TaskMap<V> {
    type Item = (String, V);
    type IntoIter = std::vec::IntoIter<(String, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<V: Serialize> Serialize for TaskMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "mapping",
    }
}
