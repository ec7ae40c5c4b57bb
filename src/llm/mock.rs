//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序返回预置回复；用完后重复最后一条。记录收到的每组消息。

use std::sync::Mutex;

use async_trait::async_trait;

use super::traits::{LlmClient, LlmError};
use super::Message;

#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<Vec<String>>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut replies: Vec<String> = replies.into_iter().map(Into::into).collect();
        replies.reverse();
        Self {
            replies: Mutex::new(replies),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// 最近一次调用的最后一条 User 消息
    pub fn last_prompt(&self) -> Option<String> {
        let seen = self.seen.lock().ok()?;
        seen.last()?
            .iter()
            .rev()
            .find(|m| m.role == super::Role::User)
            .map(|m| m.content.clone())
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(messages.to_vec());
        }
        let mut replies = self
            .replies
            .lock()
            .map_err(|_| LlmError::Request("mock poisoned".to_string()))?;
        match replies.len() {
            0 => Err(LlmError::EmptyResponse),
            1 => Ok(replies[0].clone()),
            _ => replies.pop().ok_or(LlmError::EmptyResponse),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replies_in_order_then_repeat_last() {
        let llm = ScriptedLlmClient::new(["first", "second"]);
        let history = vec![
            Message::system("You are a travel planner."),
            Message::user("Plan a week in Lisbon"),
            Message::assistant("Here is a draft"),
        ];
        assert_eq!(llm.complete(&history).await.unwrap(), "first");
        assert_eq!(llm.complete(&history).await.unwrap(), "second");
        assert_eq!(llm.complete(&history).await.unwrap(), "second");
        assert_eq!(llm.calls(), 3);
        // 跳过末尾的 Assistant 消息
        assert_eq!(llm.last_prompt().as_deref(), Some("Plan a week in Lisbon"));
    }

    #[tokio::test]
    async fn test_empty_script_fails() {
        let llm = ScriptedLlmClient::new(Vec::<String>::new());
        let err = llm.complete(&[Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse));
        assert_eq!(llm.calls(), 1);
    }
}
