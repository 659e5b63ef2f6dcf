use crate::session::Session;

/// The self-service attendance page for an active session.
pub fn scan(session: &Session) -> String {
    include_str!("pages/scan.html")
        .replace("{{session_name}}", &escape(session.name()))
        .replace("{{session_id}}", &session.id().to_string())
}

/// Shown when the scanned session does not exist or has ended.
pub fn expired() -> &'static str {
    include_str!("pages/expired.html")
}

/// The organizer dashboard. All data is fetched from the JSON API.
pub fn dashboard() -> &'static str {
    include_str!("pages/dashboard.html")
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use crate::session::{CreationForm, Session};
    use crate::urls::Urls;

    #[test]
    fn scan_page_embeds_the_session() {
        let session = Session::create(
            CreationForm {
                name: Some("Sunday <Service>".to_owned()),
                date: None,
            },
            &Urls::new("http://attendance.test/"),
        )
        .unwrap();

        let page = super::scan(&session);

        assert!(page.contains("Sunday &lt;Service&gt;"));
        assert!(page.contains(&session.id().to_string()));
    }
}
