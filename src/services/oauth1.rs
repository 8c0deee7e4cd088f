// SPDX-License-Identifier: MIT

//! OAuth 1.0 request signing (HMAC-SHA1), used by the diary provider's
//! three-legged flow and its per-user API calls.

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha1::Sha1;

use crate::error::AppError;

type HmacSha1 = Hmac<Sha1>;

/// Percent-encode per RFC 3986: everything except ALPHA / DIGIT / "-" / "."
/// / "_" / "~" is escaped, including spaces.
pub fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Build the `Authorization: OAuth ...` header value from the protocol
/// parameters: `k="v"` pairs, both sides percent-encoded, sorted by key.
/// Non-protocol parameters are excluded; they travel in the query string.
pub fn build_header(params: &[(String, String)]) -> String {
    let mut pairs: Vec<(String, String)> = params
        .iter()
        .filter(|(k, _)| k.starts_with("oauth_"))
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    pairs.sort();
    let joined = pairs
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, v))
        .collect::<Vec<_>>()
        .join(", ");
    format!("OAuth {}", joined)
}

/// Random nonce for one signed request.
pub fn nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

fn timestamp() -> String {
    chrono::Utc::now().timestamp().to_string()
}

/// Signs requests with the consumer secret and, for per-user calls, the
/// user's token secret.
#[derive(Clone)]
pub struct OAuth1Signer {
    consumer_key: String,
    consumer_secret: String,
}

impl OAuth1Signer {
    pub fn new(consumer_key: &str, consumer_secret: &str) -> Self {
        Self {
            consumer_key: consumer_key.to_string(),
            consumer_secret: consumer_secret.to_string(),
        }
    }

    /// Compute the HMAC-SHA1 signature over the canonical base string.
    ///
    /// `params` must hold every query parameter of the request, protocol and
    /// application alike, excluding `oauth_signature` itself.
    pub fn sign(
        &self,
        method: &str,
        url: &str,
        params: &[(String, String)],
        token_secret: Option<&str>,
    ) -> Result<String, AppError> {
        // Canonical parameter string: encode keys and values first, then
        // sort the encoded pairs.
        let mut encoded: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (percent_encode(k), percent_encode(v)))
            .collect();
        encoded.sort();
        let param_string = encoded
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let base_string = format!(
            "{}&{}&{}",
            method.to_uppercase(),
            percent_encode(url),
            percent_encode(&param_string)
        );

        // Signing key always carries the separator, even with no token
        // secret (the request-token step).
        let key = format!(
            "{}&{}",
            percent_encode(&self.consumer_secret),
            percent_encode(token_secret.unwrap_or(""))
        );

        let mut mac = HmacSha1::new_from_slice(key.as_bytes())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC key error: {}", e)))?;
        mac.update(base_string.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Build the full signed parameter list for one request: protocol
    /// parameters, the caller's application parameters, and the computed
    /// `oauth_signature`.
    pub fn signed_params(
        &self,
        method: &str,
        url: &str,
        extra: &[(String, String)],
        token: Option<(&str, &str)>,
    ) -> Result<Vec<(String, String)>, AppError> {
        let mut params: Vec<(String, String)> = vec![
            ("oauth_consumer_key".into(), self.consumer_key.clone()),
            ("oauth_nonce".into(), nonce()),
            ("oauth_signature_method".into(), "HMAC-SHA1".into()),
            ("oauth_timestamp".into(), timestamp()),
            ("oauth_version".into(), "1.0".into()),
        ];
        if let Some((token_key, _)) = token {
            params.push(("oauth_token".into(), token_key.to_string()));
        }
        params.extend_from_slice(extra);

        let signature = self.sign(method, url, &params, token.map(|(_, s)| s))?;
        params.push(("oauth_signature".into(), signature));
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> OAuth1Signer {
        OAuth1Signer::new("consumer_key", "consumer_secret")
    }

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn percent_encoding_is_rfc3986() {
        assert_eq!(percent_encode("hello world"), "hello%20world");
        assert_eq!(percent_encode("a-b._~c"), "a-b._~c");
        assert_eq!(percent_encode("q=1&r=2"), "q%3D1%26r%3D2");
    }

    #[test]
    fn signing_is_deterministic() {
        let p = params(&[
            ("oauth_consumer_key", "consumer_key"),
            ("oauth_nonce", "fixed_nonce"),
            ("oauth_timestamp", "1700000000"),
            ("method", "foods.search"),
        ]);
        let a = signer()
            .sign("GET", "https://platform.example/rest", &p, None)
            .unwrap();
        let b = signer()
            .sign("GET", "https://platform.example/rest", &p, None)
            .unwrap();
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn parameter_order_does_not_matter() {
        let forward = params(&[("a", "1"), ("b", "2"), ("oauth_nonce", "n")]);
        let reversed = params(&[("oauth_nonce", "n"), ("b", "2"), ("a", "1")]);
        let s = signer();
        assert_eq!(
            s.sign("GET", "https://platform.example/rest", &forward, None)
                .unwrap(),
            s.sign("GET", "https://platform.example/rest", &reversed, None)
                .unwrap()
        );
    }

    #[test]
    fn token_secret_changes_signature() {
        let p = params(&[("oauth_nonce", "n"), ("oauth_timestamp", "1700000000")]);
        let s = signer();
        let without = s
            .sign("GET", "https://platform.example/rest", &p, None)
            .unwrap();
        let with = s
            .sign("GET", "https://platform.example/rest", &p, Some("tsecret"))
            .unwrap();
        assert_ne!(without, with);
    }

    #[test]
    fn signed_params_include_protocol_fields() {
        let out = signer()
            .signed_params(
                "GET",
                "https://platform.example/rest",
                &params(&[("method", "foods.search")]),
                Some(("user_token", "user_secret")),
            )
            .unwrap();
        let keys: Vec<&str> = out.iter().map(|(k, _)| k.as_str()).collect();
        assert!(keys.contains(&"oauth_consumer_key"));
        assert!(keys.contains(&"oauth_token"));
        assert!(keys.contains(&"oauth_signature"));
        assert!(keys.contains(&"method"));
        // Signature comes last, computed over everything else.
        assert_eq!(out.last().unwrap().0, "oauth_signature");
    }

    #[test]
    fn header_holds_sorted_protocol_params_only() {
        let header = build_header(&params(&[
            ("oauth_token", "tok en"),
            ("oauth_consumer_key", "ck"),
            ("method", "foods.search"),
        ]));
        assert_eq!(
            header,
            "OAuth oauth_consumer_key=\"ck\", oauth_token=\"tok%20en\""
        );
    }

    #[test]
    fn nonces_are_unique() {
        assert_ne!(nonce(), nonce());
        assert_eq!(nonce().len(), 16);
    }
}
