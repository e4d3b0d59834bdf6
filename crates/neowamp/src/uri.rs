//! # URI Syntax
//!
//! A URI is a non-empty sequence of dot-separated segments, each made of
//! ASCII letters, digits and underscores. Hyphens and empty segments are
//! rejected.

use crate::error::Error;
use crate::error::Result;

pub fn is_valid(uri: &str) -> bool {
    !uri.is_empty()
        && uri.split('.').all(|segment| {
            !segment.is_empty()
                && segment.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
        })
}

pub fn validate(uri: &str) -> Result<()> {
    if is_valid(uri) {
        Ok(())
    } else {
        Err(Error::InvalidUri(uri.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_uris() {
        for uri in ["net.example", "net", "wamp.router.subscribe", "a_b.C9"] {
            assert!(is_valid(uri), "{} should be valid", uri);
        }
    }

    #[test]
    fn test_invalid_uris() {
        for uri in ["net.example-1", "", ".", "net..example", "net.", ".net", "net example", "net.exämple"] {
            assert!(!is_valid(uri), "{:?} should be invalid", uri);
        }
    }

    #[test]
    fn test_validate_reports_uri() {
        assert_eq!(validate("net.example-1"), Err(Error::InvalidUri("net.example-1".into())));
        assert_eq!(validate("net.example"), Ok(()));
    }
}
