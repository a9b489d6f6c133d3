pub mod health;
pub use self::health::health;

pub mod verify;
pub use self::verify::verify;

pub mod firstfactor;
pub use self::firstfactor::firstfactor;

pub mod logout;
pub use self::logout::logout;

// common functions for the handlers
use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};
use std::net::IpAddr;

/// Extract the client IP from common proxy headers.
pub(crate) fn extract_client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .and_then(|value| value.parse().ok());
    if forwarded.is_some() {
        return forwarded;
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .and_then(|value| value.parse().ok())
}

/// Pull the session token out of the request cookies.
pub(crate) fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == cookie_name {
            return Some(val.to_string());
        }
    }
    None
}

/// Build a `HttpOnly` cookie carrying the session token.
pub(crate) fn session_cookie(
    cookie_name: &str,
    token: &str,
    secure: bool,
    max_age_seconds: u64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{cookie_name}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn clear_session_cookie(
    cookie_name: &str,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{cookie_name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_client_ip_prefers_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 5.6.7.8"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(
            extract_client_ip(&headers),
            Some("1.2.3.4".parse().unwrap())
        );
    }

    #[test]
    fn extract_client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(
            extract_client_ip(&headers),
            Some("9.9.9.9".parse().unwrap())
        );
    }

    #[test]
    fn extract_client_ip_none_when_missing_or_garbled() {
        assert_eq!(extract_client_ip(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("not-an-ip"));
        assert_eq!(extract_client_ip(&headers), None);
    }

    #[test]
    fn extract_session_token_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("other=1; gardisto_session=abc123; theme=dark"),
        );
        assert_eq!(
            extract_session_token(&headers, "gardisto_session"),
            Some("abc123".to_string())
        );
        assert_eq!(extract_session_token(&headers, "missing"), None);
    }

    #[test]
    fn session_cookie_attributes() {
        let cookie = session_cookie("gardisto_session", "token", false, 3600).unwrap();
        let value = cookie.to_str().unwrap();
        assert!(value.starts_with("gardisto_session=token"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("Max-Age=3600"));
        assert!(!value.contains("Secure"));

        let secure = session_cookie("gardisto_session", "token", true, 3600).unwrap();
        assert!(secure.to_str().unwrap().contains("Secure"));
    }

    #[test]
    fn clear_session_cookie_zeroes_max_age() {
        let cookie = clear_session_cookie("gardisto_session", false).unwrap();
        assert!(cookie.to_str().unwrap().contains("Max-Age=0"));
    }
}
