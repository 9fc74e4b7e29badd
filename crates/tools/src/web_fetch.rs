//! Web fetch tool — HTTP GET a page and return its readable text.
//!
//! Hosts on the blocked-domain list are refused before any request is
//! made. A 401/403/451 answer is reported as `access_denied` so the
//! evaluator can score whatever the rest of the plan obtained.

use async_trait::async_trait;
use regex_lite::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tasksmith_config::ToolsConfig;
use tasksmith_core::error::ToolError;
use tasksmith_core::task::TaskCategory;
use tasksmith_core::tool::{ParamType, Tool, ToolInputs, ToolOutput, ToolParam};
use tracing::{debug, warn};
use crate::{required_text, truncate_chars, usize_input};

const NAME: &str = "web_fetch";
const USER_AGENT: &str = "Mozilla/5.0 (compatible; Tasksmith/0.1)";

pub struct WebFetchTool {
    client: reqwest::Client,
    blocked_domains: Vec<String>,
    max_chars: usize,
    timeout_secs: u64,
}

impl WebFetchTool {
    pub fn new(blocked_domains: Vec<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            blocked_domains: blocked_domains
                .into_iter()
                .map(|d| d.trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
            max_chars: 3000,
            timeout_secs: 15,
        }
    }

    pub fn from_config(config: &ToolsConfig) -> Self {
        let mut tool = Self::new(config.blocked_domains.clone());
        tool.max_chars = config.fetch_max_chars;
        tool.timeout_secs = config.http_timeout_secs;
        tool
    }

    /// Exact host or any subdomain of a blocked entry.
    fn is_blocked(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_lowercase();
        self.blocked_domains
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")))
    }
}

fn noise_blocks() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?is)<script\b.*?</script>|<style\b.*?</style>|<noscript\b.*?</noscript>|<nav\b.*?</nav>|<header\b.*?</header>|<footer\b.*?</footer>|<aside\b.*?</aside>|<!--.*?-->",
        )
        .ok()
    })
    .as_ref()
}

fn tags() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").ok()).as_ref()
}

/// Wide enough that html2text never wraps a sentence.
const TEXT_WIDTH: usize = 400;

/// Reduce an HTML document to its visible text, one non-blank line per
/// block of content. Entities are decoded by html2text; if it fails the
/// tags are stripped by pattern instead.
pub fn html_to_text(html: &str) -> String {
    let cleaned = match noise_blocks() {
        Some(re) => re.replace_all(html, "\n").into_owned(),
        None => html.to_string(),
    };
    let text = match html2text::from_read(cleaned.as_bytes(), TEXT_WIDTH) {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => strip_tags(&cleaned),
        Err(e) => {
            debug!(error = %e, "html2text failed, stripping tags");
            strip_tags(&cleaned)
        }
    };
    squeeze_lines(&text)
}

/// Pattern-based fallback: drop tags and decode the common entities.
fn strip_tags(html: &str) -> String {
    let text = match tags() {
        Some(re) => re.replace_all(html, "\n").into_owned(),
        None => html.to_string(),
    };
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn squeeze_lines(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Fetch a specific URL and return the cleaned text content of the page. \
         Use when you already have a direct URL."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::required("url", ParamType::String, "URL to fetch (http or https)"),
            ToolParam::optional("max_chars", ParamType::Integer, "Maximum characters to return (default 3000)"),
        ]
    }

    fn outputs(&self) -> Vec<String> {
        vec!["content".into(), "url".into()]
    }

    fn categories(&self) -> Vec<TaskCategory> {
        vec![TaskCategory::Research, TaskCategory::Data, TaskCategory::Mixed]
    }

    async fn invoke(&self, inputs: ToolInputs) -> Result<ToolOutput, ToolError> {
        let raw_url = required_text(NAME, &inputs, "url")?;
        let max_chars = usize_input(&inputs, "max_chars").unwrap_or(self.max_chars);

        let url = reqwest::Url::parse(raw_url.trim())
            .map_err(|e| ToolError::invalid_arguments(NAME, format!("Invalid URL '{raw_url}': {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ToolError::invalid_arguments(
                NAME,
                "URL must start with http:// or https://",
            ));
        }
        let host = url.host_str().unwrap_or_default();
        if self.is_blocked(host) {
            warn!(host, "Blocked fetch to restricted host");
            return Err(ToolError::access_denied(NAME, format!("Host '{host}' is blocked")));
        }

        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(Duration::from_secs(self.timeout_secs))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::timeout(NAME, self.timeout_secs)
                } else {
                    ToolError::execution_failed(NAME, format!("Request failed: {e}"))
                }
            })?;

        let status = response.status().as_u16();
        match status {
            200..=299 => {}
            401 | 403 | 451 => {
                return Err(ToolError::access_denied(
                    NAME,
                    format!("{url} refused access (HTTP {status})"),
                ));
            }
            _ => {
                return Err(ToolError::execution_failed(
                    NAME,
                    format!("{url} returned HTTP {status}"),
                ));
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| ToolError::execution_failed(NAME, format!("Failed to read body: {e}")))?;
        let text = truncate_chars(&html_to_text(&body), max_chars);
        debug!(url = %url, chars = text.chars().count(), "Page fetched");

        Ok(ToolOutput::new()
            .with("content", text)
            .with("url", url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasksmith_core::error::ToolErrorKind;

    fn url(u: &str) -> ToolInputs {
        let mut inputs = ToolInputs::new();
        inputs.insert("url".into(), u.into());
        inputs
    }

    fn tool() -> WebFetchTool {
        WebFetchTool::from_config(&ToolsConfig::default())
    }

    #[tokio::test]
    async fn blocked_hosts_are_access_denied() {
        for target in [
            "http://localhost:8080/admin",
            "http://169.254.169.254/latest/meta-data",
            "http://api.metadata.google.internal/",
        ] {
            let err = tool().invoke(url(target)).await.unwrap_err();
            assert_eq!(err.kind, ToolErrorKind::AccessDenied, "{target}");
            assert!(!err.kind.is_plan_fatal());
        }
    }

    #[tokio::test]
    async fn non_http_scheme_rejected() {
        let err = tool().invoke(url("file:///etc/passwd")).await.unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::InvalidArguments);
        let err = tool().invoke(url("not a url")).await.unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::InvalidArguments);
    }

    #[test]
    fn subdomain_matching_is_exact_on_labels() {
        let tool = WebFetchTool::new(vec!["example.com".into()]);
        assert!(tool.is_blocked("example.com"));
        assert!(tool.is_blocked("www.Example.com"));
        assert!(!tool.is_blocked("notexample.com"));
    }

    #[test]
    fn strips_markup_and_noise() {
        let html = r#"<html><head><style>body{color:red}</style><script>var x = "<p>";</script></head>
            <body><nav>Home | About</nav><h1>Gold &amp; Silver</h1>
            <p>Prices   rose
            today.</p><!-- tracking --><footer>(c) 2024</footer></body></html>"#;
        let text = html_to_text(html);
        assert!(text.contains("Gold & Silver"), "{text}");
        assert!(text.contains("Prices rose today."), "{text}");
        for noise in ["color:red", "var x", "Home | About", "tracking", "(c) 2024", "<"] {
            assert!(!text.contains(noise), "{noise} leaked into {text}");
        }
        assert!(text.lines().all(|line| !line.trim().is_empty()));
    }

    #[test]
    fn named_and_numeric_entities_are_decoded() {
        let html = "<p>Gold &mdash; $2,400 &#8212; it&#x27;s up &euro;5</p><p>Silver&nbsp;flat</p>";
        let text = html_to_text(html);
        assert!(text.contains("Gold \u{2014} $2,400 \u{2014} it's up \u{20ac}5"), "{text}");
        assert!(text.contains("Silver"), "{text}");
        assert!(!text.contains('&'), "{text}");
    }

    #[test]
    fn pattern_fallback_strips_tags() {
        let text = squeeze_lines(&strip_tags("<div><b>Rates</b> &amp; <i>fees</i></div>"));
        assert_eq!(text, "Rates\n&\nfees");
    }
}
