//! Minimal page layout for the server-rendered routes.

use axum::http::StatusCode;

use crate::store::User;

pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

/// Wraps `content` (already escaped) in the site layout. The header shows
/// the account link when a user is logged in.
pub fn page(title: &str, user: Option<&User>, content: &str) -> String {
    let nav = match user {
        Some(user) => format!(
            r#"<a class="nav__el" href="/api/v1/users/logout">Log out</a><a class="nav__el" href="/me">{}</a>"#,
            escape(&user.name)
        ),
        None => r#"<a class="nav__el" href="/login">Log in</a>"#.to_string(),
    };
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Natours | {title}</title>
</head>
<body>
<header class="header"><a class="nav__el" href="/">All tours</a><nav class="nav nav--user">{nav}</nav></header>
<main class="main">
{content}
</main>
</body>
</html>
"#,
        title = escape(title),
    )
}

pub fn error_page(status: StatusCode, message: &str) -> String {
    let content = format!(
        r#"<div class="error"><div class="error__title"><h2 class="heading-secondary">Uh oh! Something went wrong!</h2><h2 class="error__emoji">{}</h2></div><div class="error__msg">{}</div></div>"#,
        status.as_u16(),
        escape(message)
    );
    page("Something went wrong!", None, &content)
}
