//! Miro REST v2 客户端（blocking）

use std::time::Duration;

use log::{debug, info};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Url;

use super::error::BoardError;
use crate::models::board::{BoardItem, BoardSummary, ImagePlacement, ListResponse, Position};

pub const MIRO_API: &str = "https://api.miro.com/v2";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// 上传器依赖的画布操作
pub trait CanvasApi {
    fn get_item(&self, board_id: &str, item_id: &str) -> Result<BoardItem, BoardError>;

    /// 以 `position` 为中心在画布上创建图片
    fn upload_image(
        &self,
        board_id: &str,
        file_name: &str,
        jpeg: Vec<u8>,
        position: Position,
    ) -> Result<BoardItem, BoardError>;
}

pub struct MiroClient {
    client: Client,
    token: String,
    base_url: Url,
}

impl MiroClient {
    pub fn new(token: impl Into<String>) -> Result<Self, BoardError> {
        Self::with_base_url(token, MIRO_API)
    }

    pub fn with_base_url(token: impl Into<String>, base_url: &str) -> Result<Self, BoardError> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(BoardError::MissingToken);
        }
        let base_url = Url::parse(base_url)
            .map_err(|e| BoardError::Api {
                status: 0,
                message: format!("invalid base url {}: {}", base_url, e),
            })?;
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            token,
            base_url,
        })
    }

    /// 从环境变量（支持 `.env`）读取 `MIRO_TOKEN`
    pub fn from_env() -> Result<Self, BoardError> {
        dotenvy::dotenv().ok();
        let token = std::env::var("MIRO_TOKEN").map_err(|_| BoardError::MissingToken)?;
        Self::new(token)
    }

    /// `.env` 中配置的默认画布
    pub fn default_board_id() -> Option<String> {
        dotenvy::dotenv().ok();
        std::env::var("MIRO_BOARD_ID")
            .ok()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
    }

    /// 拼接路径，每一段都会被编码
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, BoardError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BoardError::InvalidBoardId(segments.join("/")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.token)
            .header("accept", "application/json")
    }

    fn check(resp: Response) -> Result<String, BoardError> {
        let status = resp.status();
        let body = resp.text()?;
        if status.is_success() {
            return Ok(body);
        }
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or(body);
        debug!("Miro API {} -> {}", status, message);
        Err(BoardError::from_status(status.as_u16(), message))
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, BoardError> {
        let resp = self.authorized(self.client.get(url)).send()?;
        let body = Self::check(resp)?;
        Ok(serde_json::from_str(&body)?)
    }

    pub fn list_boards(&self) -> Result<Vec<BoardSummary>, BoardError> {
        let url = self.endpoint(&["boards"])?;
        let list: ListResponse<BoardSummary> = self.get_json(url)?;
        info!("📋 Found {} boards", list.data.len());
        Ok(list.data)
    }

    pub fn get_board(&self, board_id: &str) -> Result<BoardSummary, BoardError> {
        let url = self.endpoint(&["boards", board_id])?;
        self.get_json(url)
    }

    pub fn list_frames(&self, board_id: &str) -> Result<Vec<BoardItem>, BoardError> {
        let mut url = self.endpoint(&["boards", board_id, "items"])?;
        url.query_pairs_mut().append_pair("type", "frame");
        let list: ListResponse<BoardItem> = self.get_json(url)?;
        info!("📋 Found {} frames in board {}", list.data.len(), board_id);
        Ok(list.data)
    }
}

impl CanvasApi for MiroClient {
    fn get_item(&self, board_id: &str, item_id: &str) -> Result<BoardItem, BoardError> {
        let url = self.endpoint(&["boards", board_id, "items", item_id])?;
        self.get_json(url)
    }

    fn upload_image(
        &self,
        board_id: &str,
        file_name: &str,
        jpeg: Vec<u8>,
        position: Position,
    ) -> Result<BoardItem, BoardError> {
        let url = self.endpoint(&["boards", board_id, "images"])?;
        let placement = serde_json::to_string(&ImagePlacement { position })?;

        let form = Form::new()
            .part("data", Part::text(placement).mime_str("application/json")?)
            .part(
                "resource",
                Part::bytes(jpeg)
                    .file_name(file_name.to_string())
                    .mime_str("image/jpeg")?,
            );

        let resp = self
            .authorized(self.client.post(url))
            .timeout(UPLOAD_TIMEOUT)
            .multipart(form)
            .send()?;
        let body = Self::check(resp)?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_token_rejected() {
        assert!(matches!(MiroClient::new("  "), Err(BoardError::MissingToken)));
    }

    #[test]
    fn test_endpoint_encodes_board_id() {
        let client = MiroClient::new("token").unwrap();
        let url = client.endpoint(&["boards", "uXjV/abc", "items"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.miro.com/v2/boards/uXjV%2Fabc/items"
        );
    }

    #[test]
    fn test_endpoint_with_trailing_slash_base() {
        let client = MiroClient::with_base_url("token", "http://localhost:8080/v2/").unwrap();
        let url = client.endpoint(&["boards"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/v2/boards");
    }
}
