//! UTD helpers.
//!
//! A UTD (unique task descriptor) is an opaque URI-like string of the form
//! `scheme:[//host][/path][?query]`. The query is not part of a UTD's
//! identity: two descriptors that differ only in their query are the same
//! task address.

use std::fmt;

use data_encoding::BASE32;
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

pub(crate) const WILDCARD: &str = "*";

const AUTH_SEP: &str = "//";
const PATH_SEP: &str = "/";

/// Split a raw UTD into its (scheme, host, path) components.
///
/// A string with no `:` is all scheme. A remainder of `*` is the wildcard
/// host. A remainder beginning with `//` carries an authority up to the
/// next `/`. Any other remainder is the path, normalized to begin with `/`.
pub fn split(s: &str) -> (String, String, String) {
    let (scheme, mut rest) = match s.find(':') {
        None => return (s.to_string(), String::new(), String::new()),
        Some(x) => (&s[..x], &s[x + 1..]),
    };

    let mut host = "";
    if rest == WILDCARD {
        host = WILDCARD;
        rest = "";
    } else if let Some(tail) = rest.strip_prefix(AUTH_SEP) {
        rest = tail;
        if !rest.is_empty() {
            match rest.find(PATH_SEP) {
                None => {
                    host = rest;
                    rest = "";
                }
                Some(x) => {
                    host = &rest[..x];
                    rest = &rest[x..];
                }
            }
        }
    }

    let path = if !rest.is_empty() && !rest.starts_with(PATH_SEP) {
        format!("{PATH_SEP}{rest}")
    } else {
        rest.to_string()
    };

    (scheme.to_string(), host.to_string(), path)
}

/// The identity portion of a UTD: everything before the first `?`.
pub fn identity(utd: &str) -> &str {
    match utd.find('?') {
        Some(x) => &utd[..x],
        None => utd,
    }
}

/// A hashed key for the identity of a UTD, suitable for use where a short
/// fixed-length form is needed. Equivalent to `base32(sha1(identity(utd)))`.
pub fn key(utd: &str) -> String {
    let digest = Sha1::digest(identity(utd).as_bytes());
    BASE32.encode(&digest)
}

/// Split a UTD path into its segments, in order. Empty segments produced by
/// leading, trailing, or doubled separators are dropped.
pub fn split_path(path: &str) -> Vec<String> {
    path.split(PATH_SEP)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// A parsed UTD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utd {
    raw: String,
    scheme: String,
    host: String,
    path: String,
}

impl Utd {
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::Malformed("empty UTD".to_string()));
        }
        let (scheme, host, path) = split(s);
        Ok(Self {
            raw: s.to_string(),
            scheme,
            host,
            path,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn identity(&self) -> &str {
        identity(&self.raw)
    }

    pub fn key(&self) -> String {
        key(&self.raw)
    }
}

impl fmt::Display for Utd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
