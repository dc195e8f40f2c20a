use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hk3_config::RemotePlannerConfig;
use hk3_state::{normalize_plan, GameState, Plan};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::Cooldown;

const SYSTEM_PROMPT: &str = "You control a game through mouse and keyboard. \
You receive the current game state as JSON and optionally a screenshot of the game's client area. \
Reply with a single JSON object and nothing else: \
{\"intent\": string, \"actions\": [...], \"requires_confirmation\": bool}. \
Each action is one of {\"type\": \"click\", \"x\": int, \"y\": int}, \
{\"type\": \"keypress\", \"key\": string, \"duration_ms\": int}, {\"type\": \"wait\", \"ms\": int}, \
optionally with \"risky\": true for anything irreversible. \
Coordinates are pixels in the client area. Return an empty action list when unsure.";

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Asks an OpenAI-compatible chat completion endpoint for a plan.
pub struct RemotePlanner {
    config: RemotePlannerConfig,
    client: Option<Client>,
    api_key: Option<String>,
    cooldown: Cooldown,
}

impl RemotePlanner {
    /// Reads the API key from the configured environment variable.
    pub fn new(config: RemotePlannerConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!(
                "{} is not set; remote planner will only return no-op plans",
                config.api_key_env
            );
        }
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: RemotePlannerConfig, api_key: Option<String>) -> Self {
        let client = match Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
        {
            Ok(c) => Some(c),
            Err(e) => {
                warn!("Failed to build HTTP client: {}", e);
                None
            }
        };
        let cooldown = Cooldown::new(Duration::from_millis(config.min_interval_ms));
        Self {
            config,
            client,
            api_key,
            cooldown,
        }
    }

    pub fn config(&self) -> &RemotePlannerConfig {
        &self.config
    }

    pub fn wants_image(&self) -> bool {
        self.config.send_image
    }

    pub async fn plan(&mut self, state: &GameState, image: Option<&[u8]>) -> Plan {
        let (Some(client), Some(api_key)) = (self.client.as_ref(), self.api_key.as_deref()) else {
            return Plan::noop("unavailable");
        };
        if !self.cooldown.try_acquire(Instant::now()) {
            debug!("Remote planner on cooldown");
            return Plan::noop("cooldown");
        }

        let body = match request_body(&self.config, state, image) {
            Ok(b) => b,
            Err(e) => {
                warn!("Failed to build planner request: {:#}", e);
                return Plan::noop("error");
            }
        };

        let content = match send(client, &self.config.api_url, api_key, &body).await {
            Ok(c) => c,
            Err(e) => {
                warn!("Remote planner request failed: {:#}", e);
                return Plan::noop("error");
            }
        };

        let Some(value) = extract_json(&content) else {
            warn!("Remote planner returned no JSON object: {:?}", content);
            return Plan::noop("invalid_response");
        };
        let plan = normalize_plan(&value);
        info!(
            "Remote plan '{}': {} actions, confirmation={}",
            plan.intent,
            plan.actions.len(),
            plan.requires_confirmation
        );
        plan
    }
}

fn request_body(config: &RemotePlannerConfig, state: &GameState, image: Option<&[u8]>) -> Result<Value> {
    let state_json = state.to_json().context("failed to serialize state")?;
    let user_content = match image {
        Some(png) if config.send_image => json!([
            { "type": "text", "text": state_json },
            {
                "type": "image_url",
                "image_url": { "url": format!("data:image/png;base64,{}", BASE64.encode(png)) }
            }
        ]),
        _ => Value::String(state_json),
    };

    Ok(json!({
        "model": config.model,
        "temperature": config.temperature,
        "messages": [
            { "role": "system", "content": SYSTEM_PROMPT },
            { "role": "user", "content": user_content }
        ]
    }))
}

async fn send(client: &Client, url: &str, api_key: &str, body: &Value) -> Result<String> {
    let response = client
        .post(url)
        .bearer_auth(api_key)
        .json(body)
        .send()
        .await
        .context("HTTP request failed")?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        bail!("API error {}: {}", status, text);
    }

    let parsed: ChatCompletionResponse = response
        .json()
        .await
        .context("failed to parse completion response")?;
    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .context("completion has no message content")?;
    Ok(content)
}

/// Parse the outermost `{ ... }` span of a model reply, ignoring any prose or
/// code fences around it.
fn extract_json(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hk3_state::Action;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config(api_url: String) -> RemotePlannerConfig {
        RemotePlannerConfig {
            api_url,
            min_interval_ms: 60_000,
            timeout_secs: 5,
            ..RemotePlannerConfig::default()
        }
    }

    /// Serve one HTTP response and hand back the request body it answered.
    async fn serve_once(status: &'static str, body: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/v1/chat/completions", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let request_body = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let length = text[..split]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower.strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if buf.len() >= split + 4 + length {
                        break text[split + 4..].to_string();
                    }
                }
                if n == 0 {
                    break String::new();
                }
            };
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            request_body
        });
        (url, handle)
    }

    fn completion(content: &str) -> String {
        json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] }).to_string()
    }

    #[test]
    fn test_extract_json() {
        assert_eq!(
            extract_json("Sure!\n```json\n{\"intent\": \"x\", \"actions\": []}\n```"),
            Some(json!({"intent": "x", "actions": []}))
        );
        assert_eq!(extract_json("no braces here"), None);
        assert_eq!(extract_json("} backwards {"), None);
        assert_eq!(extract_json("{broken"), None);
    }

    #[test]
    fn test_request_body_with_image() {
        let state = GameState::new(true, true, None);
        let body = request_body(&RemotePlannerConfig::default(), &state, Some(&[1, 2, 3])).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        let parts = body["messages"][1]["content"].as_array().unwrap();
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/png;base64,AQID");

        let text_only = request_body(&RemotePlannerConfig::default(), &state, None).unwrap();
        assert!(text_only["messages"][1]["content"].is_string());
    }

    #[test]
    fn test_overrides_shape_request_and_cooldown() {
        let config = RemotePlannerConfig::gemini().with_overrides(&hk3_config::RemoteOverrides {
            model: Some("gemini-2.0-flash".into()),
            min_interval: Some(Duration::from_millis(4000)),
            no_vision: true,
        });
        let state = GameState::new(true, true, None);

        let body = request_body(&config, &state, Some(&[1, 2, 3])).unwrap();
        assert_eq!(body["model"], "gemini-2.0-flash");
        assert!(body["messages"][1]["content"].is_string());

        let mut planner = RemotePlanner::with_api_key(config, Some("k".into()));
        assert!(!planner.wants_image());
        let start = Instant::now();
        assert!(planner.cooldown.try_acquire(start));
        assert!(!planner.cooldown.try_acquire(start + Duration::from_millis(3999)));
        assert!(planner.cooldown.try_acquire(start + Duration::from_millis(4000)));
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let mut planner = RemotePlanner::with_api_key(config("http://127.0.0.1:1".into()), None);
        let plan = planner.plan(&GameState::new(true, true, None), None).await;
        assert_eq!(plan, Plan::noop("unavailable"));
    }

    #[tokio::test]
    async fn test_plan_round_trip_then_cooldown() {
        let reply = completion(
            "Here you go: {\"intent\": \"close\", \"actions\": [{\"type\": \"click\", \"x\": 5, \"y\": 6, \"risky\": true}, {\"type\": \"jump\"}]}",
        );
        let (url, server) = serve_once("200 OK", reply).await;
        let mut planner = RemotePlanner::with_api_key(config(url), Some("test-key".into()));
        let state = GameState::new(true, true, None);

        let plan = planner.plan(&state, Some(&[0u8; 4])).await;
        assert_eq!(plan.intent, "close");
        assert_eq!(plan.actions, vec![Action::click(5, 6).with_risky(true)]);
        assert!(plan.requires_confirmation);

        let sent: Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(sent["messages"][1]["content"][1]["type"], "image_url");

        let again = planner.plan(&state, None).await;
        assert_eq!(again, Plan::noop("cooldown"));
    }

    #[tokio::test]
    async fn test_http_error_is_noop() {
        let (url, server) = serve_once("500 Internal Server Error", "{}".to_string()).await;
        let mut planner = RemotePlanner::with_api_key(config(url), Some("k".into()));
        let plan = planner.plan(&GameState::new(true, true, None), None).await;
        assert_eq!(plan, Plan::noop("error"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_reply_without_json_is_invalid() {
        let (url, server) = serve_once("200 OK", completion("I cannot help with that.")).await;
        let mut planner = RemotePlanner::with_api_key(config(url), Some("k".into()));
        let plan = planner.plan(&GameState::new(true, true, None), None).await;
        assert_eq!(plan, Plan::noop("invalid_response"));
        server.await.unwrap();
    }
}
