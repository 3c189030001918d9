//! Implements the `SheetWriter` trait against the Google Sheets REST API.

use crate::api::{Rejection, SheetWriter, SHEETS_API};
use crate::Result;
use anyhow::Context;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

/// Writes spreadsheet values with `values.update` and empties them with `values.clear`, both
/// authenticated by a bearer token.
pub struct GoogleSheet {
    http: reqwest::Client,
    base: Url,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRange<'a> {
    range: &'a str,
    major_dimension: &'static str,
    values: &'a [Vec<String>],
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl GoogleSheet {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(SHEETS_API, timeout)
    }

    /// Talks to `base_url` instead of Google.
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url)
            .with_context(|| format!("Invalid Sheets API base URL '{base_url}'"))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("Invalid Sheets API base URL '{base_url}'");
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Unable to create the Sheets HTTP client")?;
        Ok(Self { http, base })
    }

    /// `values/{range}` for updates, `values/{range}:clear` when `method` is given.
    fn values_url(&self, spreadsheet_id: &str, range: &str, method: Option<&str>) -> Url {
        let last = match method {
            Some(method) => format!("{range}:{method}"),
            None => range.to_string(),
        };
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v4", "spreadsheets", spreadsheet_id, "values", &last]);
        }
        url
    }
}

/// Maps a non-success response to a `Rejection`, keeping Google's error message when there is one.
async fn rejection(response: reqwest::Response) -> Rejection {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let detail = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => format!("{status}: {}", body.error.message),
        Err(_) if text.trim().is_empty() => status.to_string(),
        Err(_) => format!("{status}: {}", text.trim()),
    };
    debug!("Sheets rejected the call with {detail}");

    if status == StatusCode::UNAUTHORIZED {
        Rejection::Unauthorized(detail)
    } else {
        Rejection::Failed(detail)
    }
}

#[async_trait::async_trait]
impl SheetWriter for GoogleSheet {
    async fn replace_range(
        &self,
        access_token: String,
        spreadsheet_id: &str,
        range: &str,
        rows: &[Vec<String>],
    ) -> std::result::Result<(), Rejection> {
        let mut url = self.values_url(spreadsheet_id, range, None);
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        trace!("PUT {url}");
        let body = ValueRange {
            range,
            major_dimension: "ROWS",
            values: rows,
        };

        let response = self
            .http
            .put(url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status().is_success() {
            debug!("Sheets accepted {} rows", rows.len());
            Ok(())
        } else {
            Err(rejection(response).await)
        }
    }

    async fn clear_range(
        &self,
        access_token: String,
        spreadsheet_id: &str,
        range: &str,
    ) -> std::result::Result<(), Rejection> {
        let url = self.values_url(spreadsheet_id, range, Some("clear"));
        trace!("POST {url}");

        let response = self
            .http
            .post(url)
            .bearer_auth(access_token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(transport_error)?;

        if response.status().is_success() {
            debug!("Sheets cleared {range}");
            Ok(())
        } else {
            Err(rejection(response).await)
        }
    }
}

fn transport_error(e: reqwest::Error) -> Rejection {
    if e.is_timeout() {
        Rejection::Failed("the request to Google Sheets timed out".to_string())
    } else {
        Rejection::Failed(format!("unable to reach Google Sheets: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[derive(Debug, Clone)]
    struct Captured {
        request_line: String,
        authorization: Option<String>,
        body: String,
    }

    struct Reply {
        status: u16,
        body: &'static str,
        delay: Duration,
    }

    fn reply(status: u16, body: &'static str) -> Reply {
        Reply {
            status,
            body,
            delay: Duration::ZERO,
        }
    }

    fn header_end(buffer: &[u8]) -> Option<usize> {
        buffer.windows(4).position(|w| w == b"\r\n\r\n")
    }

    async fn read_request(stream: &mut TcpStream) -> Option<Captured> {
        let mut buffer = Vec::new();
        let mut chunk = [0_u8; 4096];
        let end = loop {
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                return None;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if let Some(end) = header_end(&buffer) {
                break end;
            }
        };

        let head = String::from_utf8_lossy(&buffer[..end]).to_string();
        let mut lines = head.lines();
        let request_line = lines.next()?.to_string();
        let mut authorization = None;
        let mut content_length = 0;
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                match name.trim().to_ascii_lowercase().as_str() {
                    "authorization" => authorization = Some(value.trim().to_string()),
                    "content-length" => content_length = value.trim().parse().unwrap_or(0),
                    _ => {}
                }
            }
        }

        let mut body = buffer[end + 4..].to_vec();
        while body.len() < content_length {
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..read]);
        }

        Some(Captured {
            request_line,
            authorization,
            body: String::from_utf8_lossy(&body).to_string(),
        })
    }

    async fn mock_sheets(replies: Vec<Reply>) -> (String, Arc<Mutex<Vec<Captured>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let captured = Arc::new(Mutex::new(Vec::new()));
        let replies = Arc::new(Mutex::new(VecDeque::from(replies)));
        let captured_clone = Arc::clone(&captured);

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let captured = Arc::clone(&captured_clone);
                let replies = Arc::clone(&replies);
                tokio::spawn(async move {
                    let Some(request) = read_request(&mut stream).await else {
                        return;
                    };
                    captured.lock().unwrap().push(request);
                    let Some(reply) = replies.lock().unwrap().pop_front() else {
                        return;
                    };
                    tokio::time::sleep(reply.delay).await;
                    let response = format!(
                        "HTTP/1.1 {} Mock\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        reply.status,
                        reply.body.len(),
                        reply.body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        (format!("http://{addr}"), captured)
    }

    fn rows() -> Vec<Vec<String>> {
        vec![
            vec!["Date".to_string(), "Amount".to_string()],
            vec!["05/03/2024".to_string(), "23.10".to_string()],
        ]
    }

    #[test]
    fn values_url_encodes_the_range() {
        let sheet = GoogleSheet::with_base_url("https://sheets.example.com", Duration::from_secs(1))
            .unwrap();
        let url = sheet.values_url("abc123", "My Sheet!A1", None);
        assert_eq!(
            url.as_str(),
            "https://sheets.example.com/v4/spreadsheets/abc123/values/My%20Sheet!A1"
        );
        let url = sheet.values_url("abc123", "My Sheet!A3:F", Some("clear"));
        assert_eq!(
            url.as_str(),
            "https://sheets.example.com/v4/spreadsheets/abc123/values/My%20Sheet!A3:F:clear"
        );
    }

    #[tokio::test]
    async fn successful_put_sends_rows_and_token() {
        let (base, captured) = mock_sheets(vec![reply(200, "{}")]).await;
        let sheet = GoogleSheet::with_base_url(&base, Duration::from_secs(5)).unwrap();

        sheet
            .replace_range("tok".into(), "abc", "Transactions!A1", &rows())
            .await
            .unwrap();

        let captured = captured.lock().unwrap().clone();
        assert_eq!(captured.len(), 1);
        assert_eq!(
            captured[0].request_line,
            "PUT /v4/spreadsheets/abc/values/Transactions!A1?valueInputOption=RAW HTTP/1.1"
        );
        assert_eq!(captured[0].authorization.as_deref(), Some("Bearer tok"));
        let body: serde_json::Value = serde_json::from_str(&captured[0].body).unwrap();
        assert_eq!(body["majorDimension"], "ROWS");
        assert_eq!(body["range"], "Transactions!A1");
        assert_eq!(body["values"][1][1], "23.10");
    }

    #[tokio::test]
    async fn clear_posts_to_the_range() {
        let (base, captured) =
            mock_sheets(vec![reply(200, r#"{"clearedRange":"Transactions!A3:F9"}"#)]).await;
        let sheet = GoogleSheet::with_base_url(&base, Duration::from_secs(5)).unwrap();

        sheet
            .clear_range("tok".into(), "abc", "Transactions!A3:F")
            .await
            .unwrap();

        let captured = captured.lock().unwrap().clone();
        assert_eq!(captured.len(), 1);
        assert_eq!(
            captured[0].request_line,
            "POST /v4/spreadsheets/abc/values/Transactions!A3:F:clear HTTP/1.1"
        );
        assert_eq!(captured[0].authorization.as_deref(), Some("Bearer tok"));
        assert_eq!(captured[0].body, "{}");
    }

    #[tokio::test]
    async fn unauthorized_clear_is_reported_as_such() {
        let (base, _) = mock_sheets(vec![reply(
            401,
            r#"{"error":{"code":401,"message":"Request had invalid authentication credentials.","status":"UNAUTHENTICATED"}}"#,
        )])
        .await;
        let sheet = GoogleSheet::with_base_url(&base, Duration::from_secs(5)).unwrap();
        let result = sheet.clear_range("tok".into(), "abc", "A3:F").await;
        assert!(matches!(result, Err(Rejection::Unauthorized(_))));
    }

    #[tokio::test]
    async fn unauthorized_is_reported_as_such() {
        let (base, _) = mock_sheets(vec![reply(
            401,
            r#"{"error":{"code":401,"message":"Request had invalid authentication credentials.","status":"UNAUTHENTICATED"}}"#,
        )])
        .await;
        let sheet = GoogleSheet::with_base_url(&base, Duration::from_secs(5)).unwrap();
        match sheet.replace_range("tok".into(), "abc", "A1", &rows()).await {
            Err(Rejection::Unauthorized(detail)) => {
                assert!(detail.contains("invalid authentication credentials"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn forbidden_is_a_failure() {
        let (base, _) = mock_sheets(vec![reply(
            403,
            r#"{"error":{"code":403,"message":"The caller does not have permission","status":"PERMISSION_DENIED"}}"#,
        )])
        .await;
        let sheet = GoogleSheet::with_base_url(&base, Duration::from_secs(5)).unwrap();
        match sheet.replace_range("tok".into(), "abc", "A1", &rows()).await {
            Err(Rejection::Failed(detail)) => {
                assert!(detail.starts_with("403"));
                assert!(detail.contains("The caller does not have permission"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_error_keeps_the_body() {
        let (base, _) = mock_sheets(vec![reply(502, "upstream unavailable")]).await;
        let sheet = GoogleSheet::with_base_url(&base, Duration::from_secs(5)).unwrap();
        let result = sheet.replace_range("tok".into(), "abc", "A1", &rows()).await;
        assert_eq!(
            result,
            Err(Rejection::Failed("502 Bad Gateway: upstream unavailable".into()))
        );
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let (base, _) = mock_sheets(vec![Reply {
            status: 200,
            body: "{}",
            delay: Duration::from_secs(3),
        }])
        .await;
        let sheet = GoogleSheet::with_base_url(&base, Duration::from_millis(200)).unwrap();
        let result = sheet.replace_range("tok".into(), "abc", "A1", &rows()).await;
        assert!(matches!(result, Err(Rejection::Failed(detail)) if detail.contains("timed out")));
    }
}
