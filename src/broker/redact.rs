//! Keeps client secrets and full client IDs out of logs, pages and reports.

/// Number of trailing client ID characters that may be shown to an operator.
pub const CLIENT_ID_TAIL_LEN: usize = 12;

/// Last [`CLIENT_ID_TAIL_LEN`] characters of a client ID.
pub fn client_id_tail(client_id: &str) -> String {
    let count = client_id.chars().count();
    client_id
        .chars()
        .skip(count.saturating_sub(CLIENT_ID_TAIL_LEN))
        .collect()
}

/// Scrubs known sensitive values out of free-form error text.
#[derive(Debug, Default, Clone)]
pub struct Redactor {
    secrets: Vec<String>,
    client_id: Option<String>,
}

impl Redactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values that must never be shown in any form.
    pub fn secret(mut self, value: Option<&str>) -> Self {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.secrets.push(value.to_string());
        }
        self
    }

    /// A client ID that may only appear as its tail.
    pub fn client_id(mut self, value: Option<&str>) -> Self {
        self.client_id = value
            .filter(|v| v.chars().count() > CLIENT_ID_TAIL_LEN)
            .map(str::to_string);
        self
    }

    pub fn apply(&self, text: &str) -> String {
        let mut scrubbed = text.to_string();
        for secret in &self.secrets {
            scrubbed = scrubbed.replace(secret.as_str(), "[REDACTED]");
        }
        if let Some(client_id) = &self.client_id {
            scrubbed = scrubbed.replace(
                client_id.as_str(),
                &format!("...{}", client_id_tail(client_id)),
            );
        }
        scrubbed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_tail() {
        assert_eq!(
            client_id_tail("1234567890-abcdefgh.apps.googleusercontent.com"),
            "rcontent.com"
        );
        assert_eq!(client_id_tail("short"), "short");
        assert_eq!(client_id_tail(""), "");
        assert_eq!(client_id_tail("ééééééééééééé"), "éééééééééééé");
    }

    #[test]
    fn test_redactor_scrubs_secret_and_client_id() {
        let redactor = Redactor::new()
            .secret(Some("GOCSPX-topsecret"))
            .client_id(Some("1234567890-abcdefgh.apps.googleusercontent.com"));

        let text = redactor.apply(
            "client 1234567890-abcdefgh.apps.googleusercontent.com used GOCSPX-topsecret",
        );

        assert_eq!(text, "client ...rcontent.com used [REDACTED]");
    }

    #[test]
    fn test_redactor_ignores_empty_values() {
        let redactor = Redactor::new().secret(Some("")).client_id(None);
        assert_eq!(redactor.apply("unchanged"), "unchanged");
    }
}
