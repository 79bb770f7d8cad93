use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use quorum_types::api::{
    CastBallotRequest, CastBallotResponse, CloseSessionResponse, ErrorBody, ReceiptView,
    SendChatRequest, SessionView,
};
use quorum_types::models::{ChatMessage, Minutes, Tally, VotingUnit};

use crate::error::ClientError;

/// REST client for one authenticated participant.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Websocket endpoint derived from the REST base URL.
    pub fn gateway_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };
        format!("{}/gateway", ws_base)
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let resp = check(builder.send().await?).await?;
        Ok(resp.json().await?)
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.send(self.request(method, path).json(body)).await
    }

    pub async fn my_units(&self) -> Result<Vec<VotingUnit>, ClientError> {
        self.send(self.request(Method::GET, "/me/units")).await
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionView>, ClientError> {
        self.send(self.request(Method::GET, "/sessions")).await
    }

    pub async fn get_session(&self, session_id: Uuid) -> Result<SessionView, ClientError> {
        self.send(self.request(Method::GET, &format!("/sessions/{}", session_id))).await
    }

    pub async fn cast_ballots(
        &self,
        session_id: Uuid,
        req: &CastBallotRequest,
    ) -> Result<CastBallotResponse, ClientError> {
        self.send_json(Method::POST, &format!("/sessions/{}/ballots", session_id), req)
            .await
    }

    pub async fn tally(&self, session_id: Uuid) -> Result<Tally, ClientError> {
        self.send(self.request(Method::GET, &format!("/sessions/{}/tally", session_id)))
            .await
    }

    pub async fn close_session(&self, session_id: Uuid) -> Result<CloseSessionResponse, ClientError> {
        self.send(self.request(Method::POST, &format!("/sessions/{}/close", session_id)))
            .await
    }

    pub async fn minutes(&self, session_id: Uuid) -> Result<Minutes, ClientError> {
        self.send(self.request(Method::GET, &format!("/sessions/{}/minutes", session_id)))
            .await
    }

    /// Oldest-first page of chat; `before` is the id of the oldest message
    /// already shown.
    pub async fn chat_history(
        &self,
        session_id: Uuid,
        limit: u32,
        before: Option<Uuid>,
    ) -> Result<Vec<ChatMessage>, ClientError> {
        let mut builder = self
            .request(Method::GET, &format!("/sessions/{}/chat", session_id))
            .query(&[("limit", limit.to_string())]);
        if let Some(before) = before {
            builder = builder.query(&[("before", before.to_string())]);
        }
        self.send(builder).await
    }

    pub async fn send_chat(&self, session_id: Uuid, content: &str) -> Result<ChatMessage, ClientError> {
        let body = SendChatRequest { content: content.to_string() };
        self.send_json(Method::POST, &format!("/sessions/{}/chat", session_id), &body)
            .await
    }

    pub async fn receipt(&self, receipt_id: &str) -> Result<ReceiptView, ClientError> {
        self.send(self.request(Method::GET, &format!("/receipts/{}", receipt_id)))
            .await
    }
}

/// Turn a non-success response into `ClientError::Api`.
async fn check(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => (body.error, body.message),
        Err(_) => (status.as_str().to_string(), text),
    };
    Err(ClientError::Api { status, code, message })
}
