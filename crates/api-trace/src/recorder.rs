//! Turns completed responses into trace records and console lines.

use crate::classify::{Classifier, UrlClass};
use crate::config::TraceConfig;
use crate::format::{display_url, pad_method, pretty_json};
use crate::trace_log::{TraceLog, TraceRecord};
use crate::types::{ObservedResponse, TraceError};

/// Records responses into a [`TraceLog`].
#[derive(Debug, Clone)]
pub struct ResponseRecorder {
    classifier: Classifier,
    long_url_patterns: Vec<String>,
    max_url_len: usize,
    only_api: bool,
}

impl ResponseRecorder {
    pub fn new(config: &TraceConfig) -> Self {
        Self {
            classifier: Classifier::from_config(config),
            long_url_patterns: config.long_url_patterns.clone(),
            max_url_len: config.max_url_len,
            only_api: config.only_api,
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Whether the response body should be read at all.
    pub fn wants(&self, response: &ObservedResponse) -> bool {
        matches!(
            self.classifier.classify(&response.url),
            UrlClass::Api | UrlClass::Ordinary
        )
    }

    /// Append the record for `response` to `log` and return the console line.
    ///
    /// A failed body read logs nothing and yields a failure notice instead.
    pub fn record(
        &self,
        response: &ObservedResponse,
        body: Result<String, TraceError>,
        log: &mut TraceLog,
    ) -> Option<String> {
        let class = self.classifier.classify(&response.url);
        if !matches!(class, UrlClass::Api | UrlClass::Ordinary) {
            return None;
        }

        let body = match body {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(url = %response.url, error = %e, "body read failed");
                return Some(self.failure_line(response, &e));
            }
        };

        let method = pad_method(&response.method);
        let url = display_url(&response.url, &self.long_url_patterns, self.max_url_len);
        let status = response.status;

        let console = format!("{method} {url} {status} size: {}", body.len());
        let summary = format!("{method} {status} {url}");
        let is_api = class == UrlClass::Api;

        if is_api {
            log.push(TraceRecord::Api {
                summary,
                request: pretty_json(response.request_body.as_deref().unwrap_or("")),
                response: pretty_json(&body),
            });
        } else {
            log.push(TraceRecord::Summary(summary));
        }

        if self.only_api && !is_api {
            None
        } else {
            Some(console)
        }
    }

    /// Console notice for a redirect hop. Redirects have no body and are
    /// never logged.
    pub fn redirect(&self, response: &ObservedResponse) -> Option<String> {
        if !self.wants(response) {
            return None;
        }
        Some(self.failure_line(response, &"redirect response has no body"))
    }

    fn failure_line(&self, response: &ObservedResponse, error: &dyn std::fmt::Display) -> String {
        let method = pad_method(&response.method);
        let url = display_url(&response.url, &self.long_url_patterns, self.max_url_len);
        format!("{method} {url} {} ex: {error} FAIL !!!", response.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RequestId;

    fn response(method: &str, url: &str, request_body: Option<&str>) -> ObservedResponse {
        ObservedResponse {
            id: RequestId::new("1"),
            method: method.to_string(),
            url: url.to_string(),
            status: 200,
            request_body: request_body.map(str::to_string),
            request_body_omitted: false,
        }
    }

    #[test]
    fn test_api_record() {
        let recorder = ResponseRecorder::new(&TraceConfig::default());
        let mut log = TraceLog::new();
        let resp = response(
            "POST",
            "https://www.notion.so/api/v3/loadPageChunk",
            Some(r#"{"pageId":"4c6a"}"#),
        );

        let line = recorder.record(&resp, Ok(r#"{"recordMap":{}}"#.to_string()), &mut log);

        assert_eq!(
            line.as_deref(),
            Some("POST https://www.notion.so/api/v3/loadPageChunk 200 size: 16")
        );
        assert_eq!(
            log.records(),
            &[TraceRecord::Api {
                summary: "POST 200 https://www.notion.so/api/v3/loadPageChunk".to_string(),
                request: "{\n  \"pageId\": \"4c6a\"\n}".to_string(),
                response: "{\n  \"recordMap\": {}\n}".to_string(),
            }]
        );
    }

    #[test]
    fn test_api_record_without_request_body() {
        let recorder = ResponseRecorder::new(&TraceConfig::default());
        let mut log = TraceLog::new();
        let resp = response("GET", "https://www.notion.so/api/v3/getSpaces", None);

        recorder.record(&resp, Ok("[]".to_string()), &mut log);

        let lines = log.records()[0].lines();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "GET  200 https://www.notion.so/api/v3/getSpaces");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "[]");
    }

    #[test]
    fn test_ordinary_record_is_one_line() {
        let recorder = ResponseRecorder::new(&TraceConfig::default());
        let mut log = TraceLog::new();
        let resp = response("GET", "https://www.notion.so/app.js", None);

        let line = recorder.record(&resp, Ok("var a;".to_string()), &mut log);

        assert_eq!(
            line.as_deref(),
            Some("GET  https://www.notion.so/app.js 200 size: 6")
        );
        assert_eq!(
            log.records(),
            &[TraceRecord::Summary(
                "GET  200 https://www.notion.so/app.js".to_string()
            )]
        );
    }

    #[test]
    fn test_silenced_and_blacklisted_not_recorded() {
        let recorder = ResponseRecorder::new(&TraceConfig::default());
        let mut log = TraceLog::new();
        for url in [
            "https://www.notion.so/api/v3/ping",
            "https://api.amplitude.com/2/httpapi",
        ] {
            let resp = response("POST", url, None);
            assert!(!recorder.wants(&resp));
            assert!(recorder.record(&resp, Ok("{}".into()), &mut log).is_none());
        }
        assert!(log.is_empty());
    }

    #[test]
    fn test_body_failure_is_console_only() {
        let recorder = ResponseRecorder::new(&TraceConfig::default());
        let mut log = TraceLog::new();
        let resp = response("GET", "https://www.notion.so/image.png", None);

        let line = recorder.record(
            &resp,
            Err(TraceError::Browser("No resource with given identifier".into())),
            &mut log,
        );

        let line = line.unwrap();
        assert!(line.starts_with("GET  https://www.notion.so/image.png 200 ex: "));
        assert!(line.ends_with("FAIL !!!"));
        assert!(log.is_empty());
    }

    #[test]
    fn test_data_url_truncated_for_display_only() {
        let recorder = ResponseRecorder::new(&TraceConfig::default());
        let mut log = TraceLog::new();
        let url = format!("data:image/svg+xml;base64,{}", "Q".repeat(300));
        let resp = response("GET", &url, None);

        recorder.record(&resp, Ok("<svg/>".into()), &mut log);

        match &log.records()[0] {
            TraceRecord::Summary(line) => {
                assert!(line.ends_with("..."));
                assert!(line.len() < 100);
            }
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn test_only_api_hides_ordinary_console_lines() {
        let config = TraceConfig {
            only_api: true,
            ..TraceConfig::default()
        };
        let recorder = ResponseRecorder::new(&config);
        let mut log = TraceLog::new();

        let asset = response("GET", "https://www.notion.so/app.js", None);
        assert!(recorder.record(&asset, Ok(String::new()), &mut log).is_none());

        let api = response("POST", "https://www.notion.so/api/v3/syncRecordValues", None);
        assert!(recorder.record(&api, Ok("{}".into()), &mut log).is_some());

        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_redirect_is_console_only() {
        let recorder = ResponseRecorder::new(&TraceConfig::default());
        let mut resp = response("GET", "https://notion.so/login", None);
        resp.status = 302;

        assert_eq!(
            recorder.redirect(&resp).as_deref(),
            Some("GET  https://notion.so/login 302 ex: redirect response has no body FAIL !!!")
        );

        let tracker = response("GET", "https://api.segment.io/v1/p", None);
        assert!(recorder.redirect(&tracker).is_none());
    }
}
