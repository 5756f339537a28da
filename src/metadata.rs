use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{GalleryError, Result};

const BASE64_JSON_PREFIX: &str = "data:application/json;base64,";
const UTF8_JSON_PREFIXES: [&str; 2] = ["data:application/json;utf8,", "data:application/json,"];

// tokenURI 指向的元数据文档
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub attributes: Vec<Attribute>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trait_type: Option<String>,
    pub value: Value,
}

impl TokenMetadata {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    // 第一个属性的值就是颜色
    pub fn color(&self) -> Option<String> {
        self.attributes.first().map(|attribute| match &attribute.value {
            Value::String(value) => value.clone(),
            other => other.to_string(),
        })
    }
}

// 内联的 data: URI 可以直接解码，其它返回 None
pub fn decode_data_uri(uri: &str) -> Option<Result<TokenMetadata>> {
    // 合约自己生成的 tokenURI 都是 base64 编码的 JSON
    if let Some(payload) = uri.strip_prefix(BASE64_JSON_PREFIX) {
        return Some(
            STANDARD
                .decode(payload.trim())
                .map_err(GalleryError::from)
                .and_then(|bytes| TokenMetadata::from_slice(&bytes)),
        );
    }
    // 未编码的 JSON 原样跟在前缀后面
    UTF8_JSON_PREFIXES
        .iter()
        .find_map(|prefix| uri.strip_prefix(prefix))
        .map(|payload| TokenMetadata::from_slice(payload.as_bytes()))
}

// 按 tokenURI 取元数据，测试里可以换成内存实现
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self, uri: &str) -> Result<TokenMetadata>;
}

// 支持 data:、http(s):// 和 ipfs:// 三种 URI
#[derive(Clone, Debug)]
pub struct UriMetadataSource {
    client: reqwest::Client,
    ipfs_gateway: String,
}

impl UriMetadataSource {
    pub fn new(ipfs_gateway: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), ipfs_gateway)
    }

    pub fn with_client(client: reqwest::Client, ipfs_gateway: impl Into<String>) -> Self {
        Self {
            client,
            ipfs_gateway: ipfs_gateway.into(),
        }
    }

    // 把 tokenURI 换成可以直接请求的 http 地址
    pub fn resolve_url(&self, uri: &str) -> Result<String> {
        if uri.starts_with("https://") || uri.starts_with("http://") {
            return Ok(uri.to_owned());
        }
        if let Some(path) = uri.strip_prefix("ipfs://") {
            // ipfs://ipfs/<cid> 这种写法多了一层 ipfs/
            let path = path.strip_prefix("ipfs/").unwrap_or(path);
            return Ok(format!(
                "{}/{}",
                self.ipfs_gateway.trim_end_matches('/'),
                path
            ));
        }
        Err(GalleryError::UnsupportedUri(uri.to_owned()))
    }
}

#[async_trait]
impl MetadataSource for UriMetadataSource {
    async fn fetch(&self, uri: &str) -> Result<TokenMetadata> {
        // data: URI 不走网络
        if let Some(decoded) = decode_data_uri(uri) {
            return decoded;
        }
        let url = self.resolve_url(uri)?;
        debug!(%url, "fetching token metadata");
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        // 网关的 404 页面不是 JSON，先按状态码报错
        if !status.is_success() {
            return Err(GalleryError::MetadataStatus {
                uri: url,
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await?;
        TokenMetadata::from_slice(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r##"{"name":"Monad Logo #7","image":"data:image/svg+xml;base64,PHN2Zz48L3N2Zz4=","attributes":[{"trait_type":"Color","value":"#836EF9"}]}"##;

    #[test]
    fn decodes_base64_token_uri() {
        let uri = format!("{BASE64_JSON_PREFIX}{}", STANDARD.encode(DOCUMENT));
        let metadata = decode_data_uri(&uri).unwrap().unwrap();
        assert_eq!(metadata.name, "Monad Logo #7");
        assert_eq!(metadata.color().as_deref(), Some("#836EF9"));
    }

    #[test]
    fn decodes_plain_json_token_uri() {
        let uri = format!("data:application/json,{DOCUMENT}");
        let metadata = decode_data_uri(&uri).unwrap().unwrap();
        assert_eq!(metadata.image, "data:image/svg+xml;base64,PHN2Zz48L3N2Zz4=");
    }

    #[test]
    fn numeric_attribute_is_rendered_as_text() {
        let metadata = TokenMetadata::from_slice(
            br#"{"name":"n","image":"i","attributes":[{"value":42}]}"#,
        )
        .unwrap();
        assert_eq!(metadata.color().as_deref(), Some("42"));
    }

    #[test]
    fn missing_fields_are_malformed() {
        let uri = format!("{BASE64_JSON_PREFIX}{}", STANDARD.encode(r#"{"name":"x"}"#));
        assert!(decode_data_uri(&uri).unwrap().is_err());

        let garbage = format!("{BASE64_JSON_PREFIX}not base64!!");
        assert!(matches!(
            decode_data_uri(&garbage),
            Some(Err(GalleryError::Base64(_)))
        ));
    }

    #[test]
    fn remote_uris_are_not_inline() {
        assert!(decode_data_uri("https://example.com/1.json").is_none());
        assert!(decode_data_uri("ipfs://bafy/1.json").is_none());
    }

    #[test]
    fn ipfs_uris_go_through_gateway() {
        let source = UriMetadataSource::new("https://ipfs.io/ipfs/");
        assert_eq!(
            source.resolve_url("ipfs://QmHash/7.json").unwrap(),
            "https://ipfs.io/ipfs/QmHash/7.json"
        );
        assert_eq!(
            source.resolve_url("ipfs://ipfs/QmHash").unwrap(),
            "https://ipfs.io/ipfs/QmHash"
        );
        assert!(matches!(
            source.resolve_url("ar://tx"),
            Err(GalleryError::UnsupportedUri(_))
        ));
    }

    #[tokio::test]
    async fn fetch_handles_inline_documents_without_network() {
        let source = UriMetadataSource::new("https://ipfs.io/ipfs/");
        let uri = format!("{BASE64_JSON_PREFIX}{}", STANDARD.encode(DOCUMENT));
        let metadata = source.fetch(&uri).await.unwrap();
        assert_eq!(metadata.attributes.len(), 1);
    }
}
