use url::Url;
use uuid::Uuid;

/// Convenience wrapper for URL generation.
#[derive(Clone)]
pub struct Urls {
    /// Externally reachable base address, including trailing slash.
    base: Url,
}

impl Urls {
    pub fn new(base: impl AsRef<str>) -> Self {
        let base =
            Url::parse(base.as_ref()).unwrap_or_else(|_| panic!("parse {} as URL", base.as_ref()));

        Urls { base }
    }

    /// The address attendees reach by scanning a session's QR code.
    pub fn scan(&self, session_id: &Uuid) -> Url {
        let path = format!("scan/{}", session_id);
        self.base
            .join(&path)
            .unwrap_or_else(|_| panic!("get scan URL for session {}", session_id))
    }
}
