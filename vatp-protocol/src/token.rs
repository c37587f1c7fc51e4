//! Session token discovery in AUTH responses.
//!
//! The server does not return the token in a fixed place: the reference
//! server embeds it in free text (`"... Token: TOKEN_1712_42"`), others send an
//! `Auth-Token` header. The default policy therefore scans every line for the
//! `TOKEN_` marker; the header policy only trusts a parsed header.

use crate::message::{headers, Response};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Literal prefix every session token carries.
pub const TOKEN_MARKER: &str = "TOKEN_";

/// How a token is located in an AUTH response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPolicy {
    /// First line containing `TOKEN_`, from the marker to end of line.
    #[default]
    Substring,
    /// Value of an `Auth-Token` response header starting with `TOKEN_`.
    Header,
}

impl TokenPolicy {
    /// Extracts the token from a response according to this policy.
    pub fn extract(&self, response: &Response) -> Option<String> {
        match self {
            TokenPolicy::Substring => extract_token(response.raw()),
            TokenPolicy::Header => response
                .header(headers::AUTH_TOKEN)
                .map(str::trim)
                .filter(|value| value.starts_with(TOKEN_MARKER))
                .map(str::to_string),
        }
    }
}

impl fmt::Display for TokenPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenPolicy::Substring => f.write_str("substring"),
            TokenPolicy::Header => f.write_str("header"),
        }
    }
}

impl FromStr for TokenPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "substring" => Ok(TokenPolicy::Substring),
            "header" => Ok(TokenPolicy::Header),
            other => Err(format!("unknown token policy: {other}")),
        }
    }
}

/// Scans text line by line and returns the token from the first line that
/// contains [`TOKEN_MARKER`], trimmed of surrounding whitespace.
pub fn extract_token(text: &str) -> Option<String> {
    text.lines().find_map(|line| {
        line.find(TOKEN_MARKER)
            .map(|start| line[start..].trim().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_from_header_line() {
        let text = "VATP/1.0 200 OK\r\nUsername: admin\r\nAuth-Token: TOKEN_xyz\r\n\r\n";
        assert_eq!(extract_token(text).as_deref(), Some("TOKEN_xyz"));
    }

    #[test]
    fn test_extract_from_free_text() {
        let text = "VATP/1.0 RESPONSE_OK 52\r\n\r\nAutenticación exitosa. Token: TOKEN_1712_4242   ";
        assert_eq!(extract_token(text).as_deref(), Some("TOKEN_1712_4242"));
    }

    #[test]
    fn test_marker_runs_to_end_of_line() {
        let text = "prefix TOKEN_abc123 trailing words\nnext";
        assert_eq!(
            extract_token(text).as_deref(),
            Some("TOKEN_abc123 trailing words")
        );
    }

    #[test]
    fn test_first_matching_line_wins() {
        let text = "line one\r\nToken: TOKEN_first\r\nToken: TOKEN_second\r\n";
        assert_eq!(extract_token(text).as_deref(), Some("TOKEN_first"));
    }

    #[test]
    fn test_no_marker() {
        assert_eq!(extract_token("VATP/1.0 RESPONSE_ERROR 10\r\n\r\nbad creds"), None);
        assert_eq!(extract_token(""), None);
        // Case matters
        assert_eq!(extract_token("token_abc"), None);
    }

    #[test]
    fn test_header_policy_requires_header() {
        let body_only = Response::parse("VATP/1.0 RESPONSE_OK 20\r\n\r\nToken: TOKEN_in_body");
        assert_eq!(
            TokenPolicy::Substring.extract(&body_only).as_deref(),
            Some("TOKEN_in_body")
        );
        assert_eq!(TokenPolicy::Header.extract(&body_only), None);

        let with_header =
            Response::parse("VATP/1.0 200 OK\r\nNote: TOKEN_decoy\r\nAuth-Token: TOKEN_real\r\n\r\n");
        assert_eq!(
            TokenPolicy::Header.extract(&with_header).as_deref(),
            Some("TOKEN_real")
        );
        // The substring scan picks up the earlier decoy line
        assert_eq!(
            TokenPolicy::Substring.extract(&with_header).as_deref(),
            Some("TOKEN_decoy")
        );
    }

    #[test]
    fn test_header_policy_rejects_unmarked_value() {
        let response = Response::parse("VATP/1.0 200 OK\r\nAuth-Token: abc\r\n\r\n");
        assert_eq!(TokenPolicy::Header.extract(&response), None);
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("Header".parse::<TokenPolicy>(), Ok(TokenPolicy::Header));
        assert_eq!("substring".parse::<TokenPolicy>(), Ok(TokenPolicy::Substring));
        assert!("regex".parse::<TokenPolicy>().is_err());
        assert_eq!(TokenPolicy::default(), TokenPolicy::Substring);
    }
}
