use axum::http::{header, HeaderMap, HeaderValue};
use uuid::Uuid;

/// Name of the opaque cart-session cookie.
pub const SESSION_COOKIE: &str = "sf_session";

/// Cookie lifetime matches the cart TTL.
const SESSION_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;

/// Extracts the session token from the request's Cookie header.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;

    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
    })
}

pub fn new_session_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Set-Cookie value issuing a session.
pub fn session_cookie(token: &str) -> HeaderValue {
    let value = format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, token, SESSION_MAX_AGE_SECS
    );
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// Set-Cookie value clearing the session, used after a successful checkout.
pub fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("sf_session=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax")
}

/// Returns the request's session token, minting one (plus the cookie to set
/// on the response) when the request carries none.
pub fn ensure_session(headers: &HeaderMap) -> (String, Option<HeaderValue>) {
    match session_token(headers) {
        Some(token) => (token, None),
        None => {
            let token = new_session_token();
            let cookie = session_cookie(&token);
            (token, Some(cookie))
        }
    }
}
