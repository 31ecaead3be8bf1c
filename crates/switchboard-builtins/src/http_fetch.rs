use async_trait::async_trait;
use std::time::Duration;
use switchboard_core::{SwitchboardError, SwitchboardResult};
use switchboard_tools::{ParamSpec, ParamType, Tool, ToolArgs, ToolContext, ToolDescriptor, ToolOutput};
use tracing::{info, warn};

const DEFAULT_MAX_BYTES: usize = 16 * 1024;
const HARD_MAX_BYTES: usize = 1024 * 1024;

/// Fetches a URL with GET and returns its body, truncated to `max_bytes`.
pub struct HttpFetchTool {
    descriptor: ToolDescriptor,
    client: reqwest::Client,
    allow_private: bool,
}

impl HttpFetchTool {
    /// Tool refusing private and loopback hosts.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to a default HTTP client");
                reqwest::Client::new()
            });

        Self {
            descriptor: ToolDescriptor::new("http_fetch", "Fetch the content of a web page via HTTP GET.")
                .param(ParamSpec::required("url", ParamType::String, "The http or https URL to fetch"))
                .param(ParamSpec::optional(
                    "max_bytes",
                    ParamType::Integer.nullable(),
                    "Maximum number of body bytes to return",
                )),
            client,
            allow_private: false,
        }
    }

    /// Allow loopback and private-network hosts, e.g. for local services.
    pub fn allowing_private_hosts(mut self) -> Self {
        self.allow_private = true;
        self
    }

    fn check_url(&self, url: &str) -> SwitchboardResult<reqwest::Url> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| SwitchboardError::Tool(format!("Invalid URL '{url}': {e}")))?;
        match parsed.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(SwitchboardError::Tool(format!(
                    "Unsupported scheme '{scheme}'. Only http/https allowed."
                )))
            }
        }
        if let Some(host) = parsed.host_str() {
            if !self.allow_private && is_private_host(host) {
                return Err(SwitchboardError::Tool(format!(
                    "Access denied: '{host}' is a private/internal address"
                )));
            }
        }
        Ok(parsed)
    }
}

impl Default for HttpFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for HttpFetchTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, args: ToolArgs, _ctx: &ToolContext) -> SwitchboardResult<ToolOutput> {
        let url = self.check_url(args.get_str("url")?)?;
        let max_bytes = match args.opt_i64("max_bytes") {
            Some(n) if n > 0 => (n as usize).min(HARD_MAX_BYTES),
            _ => DEFAULT_MAX_BYTES,
        };

        info!(url = %url, max_bytes, "HTTP fetch");
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SwitchboardError::Tool(format!("HTTP request failed: {e}")))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let mut body = Vec::new();
        let mut truncated = false;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| SwitchboardError::Tool(format!("Failed to read response body: {e}")))?
        {
            body.extend_from_slice(&chunk);
            if body.len() > max_bytes {
                body.truncate(max_bytes);
                truncated = true;
                break;
            }
        }

        Ok(ToolOutput::Json(serde_json::json!({
            "status": status,
            "content_type": content_type,
            "body": String::from_utf8_lossy(&body),
            "truncated": truncated,
        })))
    }
}

/// Whether `host` names a loopback, private or cloud-metadata address.
fn is_private_host(host: &str) -> bool {
    const PRIVATE_PREFIXES: &[&str] = &[
        "localhost",
        "127.",
        "10.",
        "192.168.",
        "169.254.",
        "0.0.0.0",
        "[::1]",
        "metadata.google",
        "metadata.aws",
    ];

    let host = host.to_lowercase();
    if PRIVATE_PREFIXES.iter().any(|p| host.starts_with(p)) {
        return true;
    }
    // 172.16.0.0/12
    host.strip_prefix("172.")
        .and_then(|rest| rest.split('.').next())
        .and_then(|octet| octet.parse::<u8>().ok())
        .is_some_and(|octet| (16..=31).contains(&octet))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_private_host_detection() {
        assert!(is_private_host("localhost"));
        assert!(is_private_host("127.0.0.1"));
        assert!(is_private_host("192.168.1.1"));
        assert!(is_private_host("10.0.0.1"));
        assert!(is_private_host("172.20.3.4"));
        assert!(!is_private_host("172.32.0.1"));
        assert!(is_private_host("169.254.169.254"));
        assert!(is_private_host("metadata.google.internal"));
        assert!(!is_private_host("example.com"));
    }

    #[test]
    fn test_check_url() {
        let tool = HttpFetchTool::new();
        assert!(tool.check_url("not a url").is_err());
        assert!(tool.check_url("file:///etc/passwd").is_err());
        let err = tool.check_url("http://localhost:8080/admin").unwrap_err();
        assert!(err.to_string().contains("private"));
        assert!(tool.check_url("https://example.com/page").is_ok());

        let open = HttpFetchTool::new().allowing_private_hosts();
        assert!(open.check_url("http://127.0.0.1:9000/").is_ok());
    }
}
