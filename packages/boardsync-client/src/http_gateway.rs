/// HTTP implementation of the persistence gateway.
///
/// Endpoints, relative to the configured base URL:
///   POST /boards/{board}/lists/reorder   reorder lists
///   POST /boards/{board}/cards/move      move one card
///   GET  /boards/{board}                 full snapshot for a resync
///   POST /boards/{board}/flush           best-effort unload flush
use std::time::Duration;

use async_trait::async_trait;
use boardsync_core::gateway::{
    MoveCardRequest, PersistResponse, ReorderListsRequest, UnloadFlushRequest,
};
use boardsync_core::{
    BoardSnapshot, ErrorCode, PersistFailure, PersistResult, PersistenceGateway,
};
use reqwest::header::RETRY_AFTER;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Serialize;

use crate::config::ClientConfig;
use crate::error::ClientError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Default error code for a non-success status without a usable body.
pub fn code_for_status(status: StatusCode) -> ErrorCode {
    match status {
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => ErrorCode::Conflict,
        StatusCode::TOO_MANY_REQUESTS => ErrorCode::RateLimited,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ErrorCode::Invalid,
        StatusCode::NOT_FOUND | StatusCode::GONE => ErrorCode::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorCode::Forbidden,
        _ => ErrorCode::Internal,
    }
}

/// Build a failure from a non-success response. Fields present in the body
/// win over what the status implies.
pub fn failure_from_response(
    status: StatusCode,
    retry_after_secs: Option<u64>,
    body: Option<PersistResponse>,
) -> PersistFailure {
    let body = body.unwrap_or_default();
    let code = body.code.unwrap_or_else(|| code_for_status(status));
    PersistFailure {
        code,
        message: body
            .message
            .unwrap_or_else(|| format!("Request failed with status {}", status)),
        latest_board_version: body.latest_board_version,
        retry_after_secs: if code == ErrorCode::RateLimited {
            retry_after_secs
        } else {
            None
        },
    }
}

fn transport_failure(context: &str, err: reqwest::Error) -> PersistFailure {
    log::error!(target: "boardsync.gateway", "{} failed: {}", context, err);
    PersistFailure::new(ErrorCode::Internal, format!("{} failed: {}", context, err))
}

fn retry_after(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpGateway {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        Self::new(config.base_url(), config.token.clone())
    }

    pub(crate) fn board_url(&self, board_id: &str, suffix: &str) -> String {
        format!("{}/boards/{}{}", self.base_url, board_id, suffix)
    }

    pub(crate) fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn post_persist<T: Serialize>(&self, url: String, body: &T) -> PersistResult {
        let response = self
            .authorized(self.client.post(&url))
            .json(body)
            .send()
            .await
            .map_err(|e| transport_failure(&format!("POST {}", url), e))?;

        let status = response.status();
        let retry_after_secs = retry_after(&response);
        let text = response
            .text()
            .await
            .map_err(|e| transport_failure(&format!("Reading {}", url), e))?;
        let parsed = serde_json::from_str::<PersistResponse>(&text).ok();

        if status.is_success() {
            return match parsed {
                Some(body) => body.into_result(),
                None => Err(PersistFailure::new(
                    ErrorCode::Internal,
                    format!("Unparsable response from {}", url),
                )),
            };
        }

        let failure = failure_from_response(status, retry_after_secs, parsed);
        log::warn!(
            target: "boardsync.gateway",
            "POST {} -> {} ({})",
            url,
            status,
            failure
        );
        Err(failure)
    }

    /// Deliver an unload flush and wait for the response.
    pub async fn flush(&self, request: &UnloadFlushRequest) -> Result<(), ClientError> {
        let url = self.board_url(&request.board_id, "/flush");
        self.authorized(self.client.post(&url))
            .json(request)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for HttpGateway {
    async fn reorder_lists(&self, request: ReorderListsRequest) -> PersistResult {
        let url = self.board_url(&request.board_id, "/lists/reorder");
        self.post_persist(url, &request).await
    }

    async fn move_card(&self, request: MoveCardRequest) -> PersistResult {
        let url = self.board_url(&request.board_id, "/cards/move");
        self.post_persist(url, &request).await
    }

    async fn fetch_board(&self, board_id: &str) -> Result<BoardSnapshot, PersistFailure> {
        let url = self.board_url(board_id, "");
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| transport_failure(&format!("GET {}", url), e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_secs = retry_after(&response);
            let body = response.json::<PersistResponse>().await.ok();
            return Err(failure_from_response(status, retry_after_secs, body));
        }
        response
            .json::<BoardSnapshot>()
            .await
            .map_err(|e| transport_failure(&format!("Decoding {}", url), e))
    }
}
