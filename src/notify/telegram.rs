// src/notify/telegram.rs
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Serialize;

use super::AlertDispatcher;

#[derive(Clone)]
pub struct TelegramDispatcher {
    api_base: String,
    bot_token: String,
    chat_id: String,
    topic_id: Option<i64>,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl TelegramDispatcher {
    pub fn new(bot_token: String, chat_id: String, topic_id: Option<i64>) -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            bot_token,
            chat_id,
            topic_id,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
    parse_mode: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_thread_id: Option<i64>,
}

#[async_trait::async_trait]
impl AlertDispatcher for TelegramDispatcher {
    async fn send(&self, text: &str) -> Result<bool> {
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text: escape_markdown_v2(text),
            parse_mode: "MarkdownV2",
            message_thread_id: self.topic_id,
        };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(self.method_url("sendMessage"))
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    if rsp.status().is_success() {
                        return Ok(true);
                    }
                    if rsp.status().is_client_error() {
                        // 4xx won't get better on retry
                        tracing::warn!(status = %rsp.status(), "telegram refused message");
                        return Ok(false);
                    }
                    if attempt >= self.max_retries {
                        return Err(anyhow!("telegram HTTP error: {}", rsp.status()));
                    }
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(anyhow!("telegram request failed: {e}"));
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
        }
    }

    async fn probe(&self) -> Result<()> {
        let rsp = self
            .client
            .get(self.method_url("getMe"))
            .timeout(self.timeout)
            .send()
            .await
            .context("telegram getMe request failed")?;
        rsp.error_for_status()
            .context("telegram getMe returned error status")?;
        Ok(())
    }
}

/// Escape the MarkdownV2 reserved set so arbitrary item text can't break
/// the message markup.
pub fn escape_markdown_v2(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(
            ch,
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '>' | '#' | '+' | '-' | '='
                | '|' | '{' | '}' | '.' | '!'
        ) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
