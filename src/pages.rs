//! Minimal HTML pages for the browser-facing OAuth routes.

/// Escapes text for safe interpolation into HTML element content and attributes.
pub fn html_escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn document(title: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        html_escape(title),
        body
    )
}

pub fn error_page(title: &str, detail: &str, trace_id: Option<&str>) -> String {
    let mut body = format!(
        "<h2>{}</h2>\n<p>{}</p>",
        html_escape(title),
        html_escape(detail)
    );
    if let Some(trace_id) = trace_id {
        body.push_str(&format!(
            "\n<p><small>Trace ID: {}</small></p>",
            html_escape(trace_id)
        ));
    }
    document(title, &body)
}

/// Shows the refresh token for the operator to copy into their own storage.
pub fn connected_page(refresh_token: &str) -> String {
    let body = format!(
        "<h2>Google Calendar connected</h2>\n<p>Refresh token (store it in your env or DB):</p>\n<pre>{}</pre>",
        html_escape(refresh_token)
    );
    document("Google Calendar connected", &body)
}

pub fn missing_refresh_token_page(start_path: &str) -> String {
    let body = format!(
        "<h2>Google Calendar connected</h2>\n<p>No refresh token returned. Make sure you used prompt=consent and access_type=offline, then try again.</p>\n<p><a href=\"{}\">Reconnect with forced consent</a></p>",
        html_escape(start_path)
    );
    document("Google Calendar connected", &body)
}
