//! Indico provider configuration.

use std::time::Duration;

use url::Url;

/// Where and how to reach an Indico instance.
#[derive(Debug, Clone)]
pub struct IndicoConfig {
    /// Base URL of the instance, always ending with `/`.
    pub base_url: Url,

    /// Request timeout.
    pub timeout: Duration,

    /// User agent string.
    pub user_agent: String,
}

impl IndicoConfig {
    /// Instance hosting the event the kiosk was built for.
    pub const DEFAULT_HOST: &'static str = "indico.in2p3.fr";

    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Creates a configuration from a bare host (`indico.in2p3.fr`, served
    /// over HTTPS) or a full base URL (`http://127.0.0.1:8000/indico`).
    ///
    /// # Errors
    ///
    /// Returns an error if the result is not a valid URL.
    pub fn new(host: impl AsRef<str>) -> Result<Self, url::ParseError> {
        let host = host.as_ref().trim();
        let mut base = if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        if !base.ends_with('/') {
            base.push('/');
        }

        Ok(Self {
            base_url: Url::parse(&base)?,
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("agendawall/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// `{base}export/timetable/{event_id}.json?pretty=yes`
    pub fn timetable_url(&self, event_id: u64) -> Url {
        let file = format!("{event_id}.json");
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["export", "timetable", file.as_str()]);
        }
        url.set_query(Some("pretty=yes"));
        url
    }
}
