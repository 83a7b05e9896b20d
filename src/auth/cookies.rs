// Set-Cookie parsing
// Recovers refresh tokens delivered through cookies instead of the JSON body

use std::collections::HashSet;

/// Cookie names the token endpoint has been seen to use for refresh tokens
const REFRESH_COOKIE_ALIASES: [&str; 5] = [
    "refresh",
    "refresh_token",
    "jwt_refresh_token",
    "ll_refresh",
    "token_refresh",
];

/// Reserved Set-Cookie attribute names (lowercase)
const COOKIE_ATTRIBUTES: [&str; 10] = [
    "expires",
    "path",
    "comment",
    "domain",
    "max-age",
    "secure",
    "httponly",
    "version",
    "samesite",
    "partitioned",
];

/// Attributes that may appear without a value
const FLAG_ATTRIBUTES: [&str; 3] = ["secure", "httponly", "partitioned"];

/// A single name/value pair from a Set-Cookie header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookiePair {
    pub name: String,
    pub value: String,
}

/// Structured parse of a Set-Cookie header.
///
/// Attributes attach to the preceding cookie and are dropped. Returns `None`
/// when the header does not follow cookie syntax: an attribute before any
/// cookie, a valued attribute without a value, a bare unknown segment, or a
/// cookie name with non-token characters.
pub fn parse_strict(raw: &str) -> Option<Vec<CookiePair>> {
    let mut pairs = Vec::new();

    for segment in raw.split(';') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        let (key, value) = match segment.split_once('=') {
            Some((key, value)) => (key.trim(), Some(value.trim())),
            None => (segment, None),
        };

        let lowered = key.to_ascii_lowercase();
        if COOKIE_ATTRIBUTES.contains(&lowered.as_str()) {
            if pairs.is_empty() {
                return None;
            }
            if value.is_none() && !FLAG_ATTRIBUTES.contains(&lowered.as_str()) {
                return None;
            }
            continue;
        }

        let value = value?;
        if !is_token(key) {
            return None;
        }

        pairs.push(CookiePair {
            name: key.to_string(),
            value: unquote(value).to_string(),
        });
    }

    Some(pairs)
}

/// Permissive parse: text before the first `;`, split on the first `=`
pub fn parse_lenient(raw: &str) -> Option<CookiePair> {
    let head = raw.split_once(';').map_or(raw, |(head, _)| head);
    let (name, value) = head.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    Some(CookiePair {
        name: name.to_string(),
        value: value.trim().to_string(),
    })
}

/// Cookies in one header: strict parse first, lenient fallback when it fails
pub fn parse_header(raw: &str) -> Vec<CookiePair> {
    match parse_strict(raw) {
        Some(pairs) => pairs,
        None => {
            tracing::debug!("Set-Cookie header failed strict parsing, using lenient split");
            parse_lenient(raw).into_iter().collect()
        }
    }
}

/// Whether a cookie name looks like it carries a refresh token
pub fn is_refresh_cookie_name(name: &str) -> bool {
    let lowered = name.to_ascii_lowercase();
    REFRESH_COOKIE_ALIASES.contains(&lowered.as_str()) || lowered.contains("refresh")
}

fn refresh_value(pair: &CookiePair) -> Option<String> {
    let value = pair.value.trim();
    if value.is_empty() || !is_refresh_cookie_name(&pair.name) {
        return None;
    }
    Some(value.to_string())
}

/// First refresh token found across the ordered headers, or an empty string
pub fn extract_refresh_token<S: AsRef<str>>(set_cookies: &[S]) -> String {
    set_cookies
        .iter()
        .flat_map(|raw| parse_header(raw.as_ref()))
        .find_map(|pair| refresh_value(&pair))
        .unwrap_or_default()
}

/// Every cookie name seen, de-duplicated in first-seen order
pub fn cookie_names_seen<S: AsRef<str>>(set_cookies: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();

    for pair in set_cookies.iter().flat_map(|raw| parse_header(raw.as_ref())) {
        if seen.insert(pair.name.clone()) {
            names.push(pair.name);
        }
    }

    names
}

/// RFC 7230 token characters
fn is_token(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'!' | b'#'
                        | b'$'
                        | b'%'
                        | b'&'
                        | b'\''
                        | b'*'
                        | b'+'
                        | b'-'
                        | b'.'
                        | b'^'
                        | b'_'
                        | b'`'
                        | b'|'
                        | b'~'
                )
        })
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}
