//! Identity of a study run and the coordinator URLs derived from it.

use serde::{Deserialize, Serialize};

use crate::channel::ChannelKind;

/// Identifies one study run on the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    /// Coordinator base URL (e.g., "https://study.example.org" or "localhost:9000")
    pub server_url: String,
    pub study_id: u64,
    /// Study result ID; doubles as this run's group member ID
    pub study_result_id: u64,
    /// Currently running component
    pub component_id: u64,
}

impl RunContext {
    pub fn new(
        server_url: impl Into<String>,
        study_id: u64,
        study_result_id: u64,
        component_id: u64,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            study_id,
            study_result_id,
            component_id,
        }
    }

    /// The member ID this run uses inside a group.
    pub fn member_id(&self) -> String {
        self.study_result_id.to_string()
    }

    /// Builds the duplex channel URL for the given channel kind.
    pub fn channel_url(&self, kind: ChannelKind) -> String {
        let path = match kind {
            ChannelKind::Batch => "batch/open",
            ChannelKind::Group => "group/join",
        };
        format!(
            "{}/publix/{}/{}?srid={}",
            self.ws_base(),
            self.study_id,
            path,
            self.study_result_id
        )
    }

    /// URL for submitting (PUT) or appending (POST) result data.
    pub fn result_data_url(&self) -> String {
        self.component_url("resultData")
    }

    pub fn study_session_data_url(&self) -> String {
        self.study_url("studySessionData")
    }

    pub fn log_url(&self) -> String {
        self.component_url("log")
    }

    pub fn upload_file_url(&self, filename: &str) -> String {
        self.component_url(&format!("files/{}", urlencoding::encode(filename)))
    }

    /// URL of the run's liveness request.
    pub fn heartbeat_url(&self) -> String {
        self.study_url("heartbeat")
    }

    pub fn reassign_url(&self) -> String {
        self.study_url("group/reassign")
    }

    pub fn leave_url(&self) -> String {
        self.study_url("group/leave")
    }

    /// URL that starts the given component, optionally logging a message.
    pub fn start_component_url(&self, component_id: u64, message: Option<&str>) -> String {
        let mut url = self.study_url(&format!("{}/start", component_id));
        if let Some(message) = message {
            url.push_str(&format!("&message={}", urlencoding::encode(message)));
        }
        url
    }

    pub fn end_url(&self, successful: Option<bool>, message: Option<&str>) -> String {
        let mut url = self.study_url("end");
        if let Some(successful) = successful {
            url.push_str(&format!("&successful={}", successful));
        }
        if let Some(message) = message {
            url.push_str(&format!("&message={}", urlencoding::encode(message)));
        }
        url
    }

    pub fn abort_url(&self, message: Option<&str>) -> String {
        let mut url = self.study_url("abort");
        if let Some(message) = message {
            url.push_str(&format!("&message={}", urlencoding::encode(message)));
        }
        url
    }

    fn study_url(&self, path: &str) -> String {
        format!(
            "{}/publix/{}/{}?srid={}",
            self.http_base(),
            self.study_id,
            path,
            self.study_result_id
        )
    }

    fn component_url(&self, path: &str) -> String {
        self.study_url(&format!("{}/{}", self.component_id, path))
    }

    fn ws_base(&self) -> String {
        // Convert http(s) to ws(s) if needed
        let base_url = if self.server_url.starts_with("http://") {
            self.server_url.replacen("http://", "ws://", 1)
        } else if self.server_url.starts_with("https://") {
            self.server_url.replacen("https://", "wss://", 1)
        } else if !self.server_url.starts_with("ws://") && !self.server_url.starts_with("wss://") {
            format!("ws://{}", self.server_url)
        } else {
            self.server_url.clone()
        };
        base_url.trim_end_matches('/').to_string()
    }

    fn http_base(&self) -> String {
        // Convert ws(s) to http(s) if needed
        let base_url = if self.server_url.starts_with("ws://") {
            self.server_url.replacen("ws://", "http://", 1)
        } else if self.server_url.starts_with("wss://") {
            self.server_url.replacen("wss://", "https://", 1)
        } else if !self.server_url.starts_with("http://")
            && !self.server_url.starts_with("https://")
        {
            format!("http://{}", self.server_url)
        } else {
            self.server_url.clone()
        };
        base_url.trim_end_matches('/').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(server_url: &str) -> RunContext {
        RunContext::new(server_url, 7, 42, 3)
    }

    #[test]
    fn test_channel_url_scheme() {
        assert_eq!(
            run("http://localhost:9000").channel_url(ChannelKind::Batch),
            "ws://localhost:9000/publix/7/batch/open?srid=42"
        );
        assert_eq!(
            run("https://study.example.org/").channel_url(ChannelKind::Group),
            "wss://study.example.org/publix/7/group/join?srid=42"
        );
        assert_eq!(
            run("localhost:9000").channel_url(ChannelKind::Batch),
            "ws://localhost:9000/publix/7/batch/open?srid=42"
        );
        assert_eq!(
            run("wss://study.example.org").channel_url(ChannelKind::Batch),
            "wss://study.example.org/publix/7/batch/open?srid=42"
        );
    }

    #[test]
    fn test_http_urls() {
        let run = run("wss://study.example.org");
        assert_eq!(
            run.result_data_url(),
            "https://study.example.org/publix/7/3/resultData?srid=42"
        );
        assert_eq!(
            run.study_session_data_url(),
            "https://study.example.org/publix/7/studySessionData?srid=42"
        );
        assert_eq!(
            run.heartbeat_url(),
            "https://study.example.org/publix/7/heartbeat?srid=42"
        );
        assert_eq!(
            run.leave_url(),
            "https://study.example.org/publix/7/group/leave?srid=42"
        );
        assert_eq!(
            run.upload_file_url("my data.json"),
            "https://study.example.org/publix/7/3/files/my%20data.json?srid=42"
        );
    }

    #[test]
    fn test_end_and_abort_urls() {
        let run = run("http://localhost:9000");
        assert_eq!(
            run.end_url(Some(true), Some("all done")),
            "http://localhost:9000/publix/7/end?srid=42&successful=true&message=all%20done"
        );
        assert_eq!(run.end_url(None, None), "http://localhost:9000/publix/7/end?srid=42");
        assert_eq!(
            run.abort_url(Some("bye")),
            "http://localhost:9000/publix/7/abort?srid=42&message=bye"
        );
        assert_eq!(
            run.start_component_url(5, None),
            "http://localhost:9000/publix/7/5/start?srid=42"
        );
    }

    #[test]
    fn test_member_id() {
        assert_eq!(run("localhost").member_id(), "42");
    }
}
