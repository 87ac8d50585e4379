//! Request canonicalization and fingerprinting.
//!
//! A fingerprint is the SHA-256 digest of a request's filtered, sorted headers
//! followed by its canonical key:
//!
//! ```text
//! VERB_scheme://host[:port][path][?sorted-form-encoded-query]
//! ```
//!
//! Query parameters are ordered by value (ties broken by name), headers by
//! name. Everything in this module is pure; the registry supplies the
//! ignore-lists through [`Canonicalizer`].

use crate::error::{MockPlugError, Result};
use regex::Regex;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::OnceLock;

/// Fixed-width request fingerprint.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Digest arbitrary canonical bytes.
    pub fn digest(bytes: &[u8]) -> Self {
        let mut out = [0u8; 32];
        out.copy_from_slice(&Sha256::digest(bytes));
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..12])
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Components of an absolute request URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriParts {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    pub path: Option<String>,
    pub query: Option<String>,
}

fn uri_regex() -> &'static Regex {
    static URI: OnceLock<Regex> = OnceLock::new();
    URI.get_or_init(|| {
        Regex::new(
            r"^(?P<scheme>[A-Za-z][A-Za-z0-9+.\-]*)://(?:[^@/?#]*@)?(?P<host>\[[^\]/?#]+\]|[^/?#:@\[\]]+)(?::(?P<port>\d+))?(?P<path>/[^?#]*)?(?:\?(?P<query>[^#]*))?(?:#.*)?$",
        )
        .expect("URI pattern is valid")
    })
}

impl UriParts {
    /// Decompose an absolute URI. Userinfo and fragment are accepted and dropped.
    pub fn parse(uri: &str) -> Result<Self> {
        if uri.trim().is_empty() {
            return Err(MockPlugError::invalid_uri(uri, "empty uri"));
        }
        let caps = uri_regex().captures(uri).ok_or_else(|| {
            MockPlugError::invalid_uri(uri, "expected scheme://host[:port][/path][?query]")
        })?;

        let port = match caps.name("port") {
            Some(p) => Some(
                p.as_str()
                    .parse::<u16>()
                    .map_err(|_| MockPlugError::invalid_uri(uri, "port out of range"))?,
            ),
            None => None,
        };

        Ok(Self {
            scheme: caps["scheme"].to_ascii_lowercase(),
            host: caps["host"].to_ascii_lowercase(),
            port,
            path: caps.name("path").map(|m| m.as_str().to_string()),
            query: caps
                .name("query")
                .map(|m| m.as_str().to_string())
                .filter(|q| !q.is_empty()),
        })
    }
}

/// Parse a query string into name/value pairs. Later duplicates win.
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        let (key, value) = match part.split_once('=') {
            Some((key, value)) => (form_decode(key), form_decode(value)),
            None => (form_decode(part), String::new()),
        };
        if key.is_empty() {
            continue;
        }
        params.insert(key, value);
    }

    params
}

/// Decode `application/x-www-form-urlencoded` text (`+` is a space).
fn form_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                        continue;
                    }
                    _ => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Encode text the way HTML forms do: alphanumerics and `-_.` pass through,
/// spaces become `+`, everything else is percent-encoded.
pub fn form_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' => out.push(b as char),
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

/// The canonical form of a request, before hashing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest {
    /// Filtered headers, ordered by name.
    pub headers: BTreeMap<String, String>,
    /// `VERB_scheme://host[:port][path][?query]`
    pub key: String,
}

impl CanonicalRequest {
    /// Headers serialized as a JSON object in name order; `{}` when empty.
    pub fn serialized_headers(&self) -> String {
        serde_json::to_string(&self.headers).unwrap_or_else(|_| String::from("{}"))
    }

    pub fn fingerprint(&self) -> Fingerprint {
        let mut material = self.serialized_headers();
        material.push_str(&self.key);
        Fingerprint::digest(material.as_bytes())
    }
}

/// Canonicalizes requests under a fixed set of ignore-lists.
#[derive(Debug, Clone, Copy)]
pub struct Canonicalizer<'a> {
    pub ignored_query_params: &'a HashSet<String>,
    pub ignored_headers: &'a HashSet<String>,
    /// Lower-case header names and match the header ignore-list case-insensitively.
    pub case_insensitive_headers: bool,
}

impl<'a> Canonicalizer<'a> {
    pub fn canonicalize(
        &self,
        verb: &str,
        uri: &str,
        headers: &HashMap<String, String>,
    ) -> Result<CanonicalRequest> {
        let parts = UriParts::parse(uri)?;

        let mut params: Vec<(String, String)> = parts
            .query
            .as_deref()
            .map(parse_query_string)
            .unwrap_or_default()
            .into_iter()
            .filter(|(name, _)| !self.ignored_query_params.contains(name))
            .collect();

        let mut key = format!(
            "{}_{}://{}",
            verb.trim().to_ascii_uppercase(),
            parts.scheme,
            parts.host
        );
        if let Some(port) = parts.port {
            key.push_str(&format!(":{}", port));
        }
        if let Some(path) = &parts.path {
            key.push_str(path);
        }

        // Ordered by value first; the name only breaks ties.
        params.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        if !params.is_empty() {
            key.push('?');
            key.push_str(&build_query(&params));
        }

        Ok(CanonicalRequest {
            headers: self.filter_headers(headers),
            key,
        })
    }

    pub fn fingerprint(
        &self,
        verb: &str,
        uri: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Fingerprint> {
        Ok(self.canonicalize(verb, uri, headers)?.fingerprint())
    }

    fn filter_headers(&self, headers: &HashMap<String, String>) -> BTreeMap<String, String> {
        if !self.case_insensitive_headers {
            return headers
                .iter()
                .filter(|(name, _)| !self.ignored_headers.contains(*name))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
        }

        let ignored: HashSet<String> = self
            .ignored_headers
            .iter()
            .map(|h| h.to_ascii_lowercase())
            .collect();

        // Names differing only in case collapse into one entry.
        let mut grouped: BTreeMap<String, Vec<&str>> = BTreeMap::new();
        for (name, value) in headers {
            let name = name.to_ascii_lowercase();
            if ignored.contains(&name) {
                continue;
            }
            grouped.entry(name).or_default().push(value.as_str());
        }

        grouped
            .into_iter()
            .map(|(name, mut values)| {
                values.sort_unstable();
                (name, values.join(", "))
            })
            .collect()
    }
}

fn build_query(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", form_encode(k), form_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn key_of(c: &Canonicalizer<'_>, verb: &str, uri: &str) -> String {
        c.canonicalize(verb, uri, &HashMap::new()).unwrap().key
    }

    #[test]
    fn test_parse_full_uri() {
        let parts = UriParts::parse("https://user:pw@Api.Example.com:8443/a/b?x=1#frag").unwrap();
        assert_eq!(parts.scheme, "https");
        assert_eq!(parts.host, "api.example.com");
        assert_eq!(parts.port, Some(8443));
        assert_eq!(parts.path.as_deref(), Some("/a/b"));
        assert_eq!(parts.query.as_deref(), Some("x=1"));
    }

    #[test]
    fn test_parse_minimal_uri() {
        let parts = UriParts::parse("http://localhost").unwrap();
        assert_eq!(parts.port, None);
        assert_eq!(parts.path, None);
        assert_eq!(parts.query, None);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for uri in ["", "/relative/path", "example.com/x", "http://", "http://host:99999/", "http://host:/x"] {
            let err = UriParts::parse(uri).unwrap_err();
            assert!(
                matches!(err, MockPlugError::InvalidRequestDescriptor { .. }),
                "{uri:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_query_string() {
        let params = parse_query_string("foo=bar&baz=qux&foo=last&flag&=orphan");
        assert_eq!(params.get("foo"), Some(&"last".to_string()));
        assert_eq!(params.get("baz"), Some(&"qux".to_string()));
        assert_eq!(params.get("flag"), Some(&String::new()));
        assert_eq!(params.len(), 3);

        let params = parse_query_string("name=John%20Doe&city=New+York&utf=%C3%A9");
        assert_eq!(params.get("name"), Some(&"John Doe".to_string()));
        assert_eq!(params.get("city"), Some(&"New York".to_string()));
        assert_eq!(params.get("utf"), Some(&"é".to_string()));
    }

    #[test]
    fn test_form_decode_keeps_bad_escapes() {
        assert_eq!(form_decode("100%"), "100%");
        assert_eq!(form_decode("%zz"), "%zz");
        assert_eq!(form_decode("a%2"), "a%2");
    }

    #[test]
    fn test_form_encode() {
        assert_eq!(form_encode("a b&c=d"), "a+b%26c%3Dd");
        assert_eq!(form_encode("safe-_.Az09"), "safe-_.Az09");
        assert_eq!(form_encode("é"), "%C3%A9");
    }

    #[test]
    fn test_key_layout() {
        let empty = HashSet::new();
        let c = Canonicalizer {
            ignored_query_params: &empty,
            ignored_headers: &empty,
            case_insensitive_headers: true,
        };

        assert_eq!(key_of(&c, "get", "http://example.com"), "GET_http://example.com");
        assert_eq!(
            key_of(&c, "POST", "http://example.com:8080/p"),
            "POST_http://example.com:8080/p"
        );
        assert_eq!(
            key_of(&c, "GET", "http://example.com/p?"),
            "GET_http://example.com/p"
        );
    }

    #[test]
    fn test_query_sorted_by_value() {
        let empty = HashSet::new();
        let c = Canonicalizer {
            ignored_query_params: &empty,
            ignored_headers: &empty,
            case_insensitive_headers: true,
        };

        // "apple" < "zebra", so b comes before a despite the names.
        assert_eq!(
            key_of(&c, "GET", "http://h/p?a=zebra&b=apple"),
            "GET_http://h/p?b=apple&a=zebra"
        );
        // Equal values fall back to name order.
        assert_eq!(
            key_of(&c, "GET", "http://h/p?y=1&x=1"),
            "GET_http://h/p?x=1&y=1"
        );
        assert_eq!(
            key_of(&c, "GET", "http://h/p?q=a b"),
            "GET_http://h/p?q=a+b"
        );
    }

    #[test]
    fn test_ignored_query_params_dropped() {
        let ignored: HashSet<String> = ["token".to_string()].into();
        let empty = HashSet::new();
        let c = Canonicalizer {
            ignored_query_params: &ignored,
            ignored_headers: &empty,
            case_insensitive_headers: true,
        };

        assert_eq!(key_of(&c, "GET", "http://h/p?token=abc"), "GET_http://h/p");
        assert_eq!(
            c.fingerprint("GET", "http://h/p?id=1&token=a", &HashMap::new())
                .unwrap(),
            c.fingerprint("GET", "http://h/p?token=b&id=1", &HashMap::new())
                .unwrap()
        );
    }

    #[test]
    fn test_headers_filtered_and_sorted() {
        let ignored: HashSet<String> = ["X-Request-Id".to_string()].into();
        let empty = HashSet::new();
        let c = Canonicalizer {
            ignored_query_params: &empty,
            ignored_headers: &ignored,
            case_insensitive_headers: true,
        };

        let canonical = c
            .canonicalize(
                "GET",
                "http://h/",
                &headers(&[("X-Auth", "t"), ("x-request-id", "42"), ("Accept", "*/*")]),
            )
            .unwrap();
        assert_eq!(
            canonical.serialized_headers(),
            r#"{"accept":"*/*","x-auth":"t"}"#
        );
    }

    #[test]
    fn test_case_sensitive_headers() {
        let ignored: HashSet<String> = ["X-Skip".to_string()].into();
        let empty = HashSet::new();
        let c = Canonicalizer {
            ignored_query_params: &empty,
            ignored_headers: &ignored,
            case_insensitive_headers: false,
        };

        let canonical = c
            .canonicalize(
                "GET",
                "http://h/",
                &headers(&[("X-Skip", "1"), ("x-skip", "2"), ("B", "b")]),
            )
            .unwrap();
        assert_eq!(canonical.serialized_headers(), r#"{"B":"b","x-skip":"2"}"#);
    }

    #[test]
    fn test_case_colliding_headers_are_deterministic() {
        let empty = HashSet::new();
        let c = Canonicalizer {
            ignored_query_params: &empty,
            ignored_headers: &empty,
            case_insensitive_headers: true,
        };

        let canonical = c
            .canonicalize("GET", "http://h/", &headers(&[("Accept", "b"), ("ACCEPT", "a")]))
            .unwrap();
        assert_eq!(canonical.serialized_headers(), r#"{"accept":"a, b"}"#);
    }

    #[test]
    fn test_empty_headers_still_hashed() {
        let empty = HashSet::new();
        let c = Canonicalizer {
            ignored_query_params: &empty,
            ignored_headers: &empty,
            case_insensitive_headers: true,
        };

        let canonical = c.canonicalize("GET", "http://h/", &HashMap::new()).unwrap();
        assert_eq!(canonical.serialized_headers(), "{}");
        assert_eq!(
            canonical.fingerprint(),
            Fingerprint::digest(b"{}GET_http://h/")
        );
    }

    #[test]
    fn test_fingerprint_display() {
        let fp = Fingerprint::digest(b"abc");
        assert_eq!(
            fp.to_string(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            serde_json::to_string(&fp).unwrap(),
            format!("\"{}\"", fp)
        );
    }
}
