//! The login form.

use axum::response::Html;

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
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

pub(crate) fn login_page(redirect_url: &str, error: Option<&str>) -> Html<String> {
    let error = error.map_or_else(String::new, |message| {
        format!(r#"<p class="error" role="alert">{}</p>"#, escape(message))
    });

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Sign in</title>
<style>
body {{ font-family: sans-serif; display: flex; justify-content: center; margin-top: 10vh; }}
form {{ display: flex; flex-direction: column; gap: .75rem; min-width: 18rem; }}
.error {{ color: #b00020; }}
</style>
</head>
<body>
<form method="post" action="/login">
<h1>Sign in</h1>
{error}
<label>Username <input name="username" autocomplete="username" required autofocus></label>
<label>One-time code <input name="totp" inputmode="numeric" autocomplete="one-time-code" pattern="[0-9]{{6}}" required></label>
<input type="hidden" name="redirectUrl" value="{redirect_url}">
<button type="submit">Sign in</button>
</form>
</body>
</html>
"#,
        redirect_url = escape(redirect_url),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_user_input() {
        let Html(body) = login_page(r#""><script>x</script>"#, Some("<b>"));
        assert!(!body.contains("<script>"));
        assert!(body.contains("&quot;&gt;&lt;script&gt;"));
        assert!(body.contains("&lt;b&gt;"));
    }

    #[test]
    fn error_is_optional() {
        let Html(body) = login_page("https://app.lan/", None);
        assert!(!body.contains("class=\"error\""));
        assert!(body.contains(r#"value="https://app.lan/""#));
    }
}
