use super::{RemoteObject, Storage, IO_TIMEOUT_SECS, OP_TIMEOUT_SECS};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// 默认存储 API 地址（德国主区域）
pub const DEFAULT_ENDPOINT: &str = "https://storage.bunnycdn.com";

/// Bunny 存储 API 返回的对象
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BunnyObject {
    #[serde(default)]
    path: String,
    #[serde(default)]
    object_name: String,
    #[serde(default)]
    length: u64,
    #[serde(default)]
    is_directory: bool,
    #[serde(default)]
    checksum: Option<String>,
}

impl From<BunnyObject> for RemoteObject {
    fn from(obj: BunnyObject) -> Self {
        // Path 形如 "/zone/dir/"，拼接后由 fetcher 去掉存储区前缀
        let path = format!("{}{}", obj.path, obj.object_name);
        if obj.is_directory {
            RemoteObject::directory(path)
        } else {
            RemoteObject::file(path, obj.length, obj.checksum.as_deref().unwrap_or(""))
        }
    }
}

pub struct BunnyStorage {
    client: Client,
    endpoint: String,
    zone: String,
    api_key: String,
    name: String,
}

impl BunnyStorage {
    pub fn new(zone: &str, api_key: &str, endpoint: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
            .timeout(Duration::from_secs(IO_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        let name = format!("bunny://{}", zone);

        Ok(Self {
            client,
            endpoint,
            zone: zone.to_string(),
            api_key: api_key.to_string(),
            name,
        })
    }

    /// 拼接对象 URL，路径逐段编码
    fn object_url(&self, path: &str) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();
        if encoded.is_empty() {
            format!("{}/{}/", self.endpoint, urlencoding::encode(&self.zone))
        } else {
            format!(
                "{}/{}/{}",
                self.endpoint,
                urlencoding::encode(&self.zone),
                encoded.join("/")
            )
        }
    }

    /// 目录 URL 必须以 / 结尾，否则 API 会按文件处理
    fn directory_url(&self, prefix: &str) -> String {
        let url = self.object_url(prefix);
        if url.ends_with('/') {
            url
        } else {
            format!("{}/", url)
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("AccessKey", &self.api_key)
    }

    /// 非 2xx 响应转换为带状态码和响应体的错误
    async fn check_status(response: Response, action: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(anyhow::anyhow!(
            "{} failed with status {}: {}",
            action,
            status.as_u16(),
            body
        ))
    }
}

#[async_trait]
impl Storage for BunnyStorage {
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        let url = self.directory_url(prefix);
        debug!("[API] 列举目录: {}", url);

        let response = self
            .authorized(self.client.get(&url))
            .header("Accept", "application/json")
            .send()
            .await
            .context("list request failed")?;
        let response = Self::check_status(response, "list").await?;

        let objects: Vec<BunnyObject> = response
            .json()
            .await
            .context("failed to parse list response")?;

        Ok(objects.into_iter().map(RemoteObject::from).collect())
    }

    async fn get(&self, path: &str) -> Result<Bytes> {
        let url = self.object_url(path);
        debug!("[API] 下载: {}", url);

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .context("get request failed")?;
        let response = Self::check_status(response, "get").await?;

        response.bytes().await.context("failed to read response")
    }

    async fn upload(
        &self,
        path: &str,
        content: Bytes,
        checksum: &str,
        content_type: &str,
    ) -> Result<()> {
        let url = self.object_url(path);
        debug!("[API] 上传: {} ({}, {} 字节)", url, content_type, content.len());

        let mut request = self
            .authorized(self.client.put(&url))
            .header("Accept", "*/*")
            .header("Content-Type", content_type);
        if !checksum.is_empty() {
            // API 要求大写十六进制
            request = request.header("Checksum", checksum.to_ascii_uppercase());
        }

        let response = request
            .body(content)
            .send()
            .await
            .context("upload request failed")?;
        Self::check_status(response, "upload").await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let url = self.object_url(path);
        debug!("[API] 删除: {}", url);

        let response = self
            .authorized(self.client.delete(&url))
            .send()
            .await
            .context("delete request failed")?;
        Self::check_status(response, "delete").await?;
        Ok(())
    }

    fn zone_name(&self) -> Option<&str> {
        Some(&self.zone)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
