//! HTML pages shown to the user in the browser.

use axum::response::Html;

fn layout(title: &str, body: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
        body {{ font-family: system-ui, sans-serif; max-width: 32rem; margin: 4rem auto; padding: 0 1rem; color: #222; }}
        input[name=code] {{ font-family: monospace; font-size: 1.5rem; letter-spacing: 0.3rem; width: 12rem; }}
        button {{ font-size: 1rem; padding: 0.4rem 1rem; }}
        .error {{ color: #b00020; }}
    </style>
</head>
<body>
    <h1>{title}</h1>
{body}
</body>
</html>"#
    ))
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// The code entry form, optionally with an error from the previous attempt.
pub fn link_form(error: Option<&str>) -> Html<String> {
    let error = error
        .map(|message| format!("    <p class=\"error\">{}</p>\n", escape(message)))
        .unwrap_or_default();

    layout(
        "Link your account",
        &format!(
            r#"{error}    <p>Enter the code you received in chat.</p>
    <form method="post" action="/link">
        <input name="code" autocomplete="off" autocapitalize="characters" spellcheck="false" autofocus required>
        <button type="submit">Continue</button>
    </form>"#
        ),
    )
}

pub fn link_success() -> Html<String> {
    layout(
        "Account linked",
        "    <p>Your account is linked. You can close this window and return to chat.</p>",
    )
}

pub fn link_failure(message: &str) -> Html<String> {
    layout(
        "Linking failed",
        &format!(
            "    <p class=\"error\">{}</p>\n    <p>Ask for a new code in chat to try again.</p>",
            escape(message)
        ),
    )
}
