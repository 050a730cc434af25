//! 从 LLM 文本中提取 JSON 对象
//!
//! 模型经常把 JSON 包在 ```json ... ``` 里或在前后加说明文字：先找代码块，再退化为首个 `{` 到最后一个 `}`。

use serde_json::Value;

/// 提取并解析 JSON；找不到或解析失败时返回带原文的错误描述
pub fn extract_json(output: &str) -> Result<Value, String> {
    let trimmed = output.trim();

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim())
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start <= end {
            &trimmed[start..=end]
        } else {
            trimmed
        }
    } else {
        trimmed
    };

    serde_json::from_str(json_str).map_err(|e| format!("{}: {}", e, json_str))
}
