use crate::application::session::render::render_menu;
use crate::application::session::{SessionEvent, SessionManager};
use crate::domain::market::symbol::base_asset;
use crate::domain::ports::ChatTransport;
use crate::infrastructure::core::http_client_factory::{
    HttpClientConfig, HttpClientFactory, build_url_with_query,
};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Bot API client: `sendMessage` outbound, `getUpdates` long polling inbound.
pub struct TelegramTransport {
    client: ClientWithMiddleware,
    bot_url: String,
    poll_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    data: Option<String>,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
    callback_query: Option<CallbackQuery>,
}

/// One inbound chat action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub update_id: i64,
    pub chat_id: i64,
    pub text: String,
    /// Set for button presses, which must be acknowledged.
    pub callback_id: Option<String>,
}

impl Update {
    fn into_inbound(self) -> Option<Inbound> {
        let (chat_id, text, callback_id) = match (self.message, self.callback_query) {
            (Some(msg), _) => (msg.chat.id, msg.text?, None),
            (None, Some(cb)) => (cb.message?.chat.id, cb.data?, Some(cb.id)),
            (None, None) => return None,
        };
        Some(Inbound {
            update_id: self.update_id,
            chat_id,
            text,
            callback_id,
        })
    }
}

/// Inline keyboard: one `signal_<symbol>` button per tracked symbol, then Clear.
fn menu_markup(tracked: &[String]) -> Value {
    let mut rows: Vec<Value> = tracked
        .iter()
        .map(|s| json!([{ "text": base_asset(s), "callback_data": format!("signal_{}", s) }]))
        .collect();
    rows.push(json!([{ "text": "Clear", "callback_data": "clear" }]));
    json!({ "inline_keyboard": rows })
}

impl TelegramTransport {
    pub fn new(api_url: &str, token: &str, poll_timeout_secs: u64, http: &HttpClientConfig) -> Self {
        // Long polling holds the request open for `poll_timeout_secs`.
        let http = HttpClientConfig {
            timeout: http.timeout.max(Duration::from_secs(poll_timeout_secs + 10)),
            ..http.clone()
        };
        Self {
            client: HttpClientFactory::create_client(&http),
            bot_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
            poll_timeout_secs,
        }
    }

    /// Pending updates from `offset` on. Updates without text are skipped.
    pub async fn get_updates(&self, offset: i64) -> Result<(Vec<Inbound>, i64)> {
        let offset_s = offset.to_string();
        let timeout_s = self.poll_timeout_secs.to_string();
        let url = build_url_with_query(
            &format!("{}/getUpdates", self.bot_url),
            &[("offset", offset_s.as_str()), ("timeout", timeout_s.as_str())],
        )
        .context("build getUpdates url")?;

        let response: ApiResponse<Vec<Update>> = self
            .client
            .get(url)
            .send()
            .await
            .context("getUpdates request failed")?
            .json()
            .await
            .context("failed to parse getUpdates")?;

        if !response.ok {
            bail!(
                "getUpdates rejected: {}",
                response.description.unwrap_or_default()
            );
        }

        let updates = response.result.unwrap_or_default();
        let next_offset = updates
            .iter()
            .map(|u| u.update_id + 1)
            .max()
            .unwrap_or(offset);
        Ok((
            updates.into_iter().filter_map(Update::into_inbound).collect(),
            next_offset,
        ))
    }

    async fn post(&self, method: &str, body: Value) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/{}", self.bot_url, method))
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .with_context(|| format!("{} request failed", method))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("{} returned {}: {}", method, status, text);
        }
        Ok(())
    }

    /// Stops the client's loading indicator on a pressed button.
    pub async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        self.post(
            "answerCallbackQuery",
            json!({ "callback_query_id": callback_id }),
        )
        .await
    }

    /// Feeds inbound updates to the session manager until `shutdown` flips.
    pub async fn run_polling(
        self: Arc<Self>,
        manager: Arc<SessionManager>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Telegram polling started");
        let mut offset = 0;
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Telegram polling stopped");
                    return;
                }
                result = self.get_updates(offset) => match result {
                    Ok((inbound, next)) => {
                        offset = next;
                        for update in inbound {
                            debug!("Update {} from chat {}", update.update_id, update.chat_id);
                            if let Some(id) = &update.callback_id
                                && let Err(e) = self.answer_callback(id).await
                            {
                                warn!("answerCallbackQuery failed: {:#}", e);
                            }
                            manager
                                .dispatch(update.chat_id, SessionEvent::parse(&update.text))
                                .await;
                        }
                    }
                    Err(e) => {
                        error!("Telegram polling failed: {:#}. Retrying in 5s...", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        self.post("sendMessage", json!({ "chat_id": chat_id, "text": text }))
            .await
    }

    async fn send_menu(&self, chat_id: i64, tracked: &[String]) -> Result<()> {
        if tracked.is_empty() {
            return self.send_text(chat_id, &render_menu(tracked)).await;
        }
        self.post(
            "sendMessage",
            json!({
                "chat_id": chat_id,
                "text": "Choose a token:",
                "reply_markup": menu_markup(tracked),
            }),
        )
        .await
    }
}
