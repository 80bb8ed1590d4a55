//! HTTP verb routing discriminators.
//!
//! Verbs are used purely as the first half of a routing key. An exposed
//! method name carries its verb as a prefix (`PostUploadPhoto`), and this
//! module recovers the `(verb, procedure)` pair from it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// One of the nine recognized HTTP method tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    /// `GET`
    Get,
    /// `HEAD`
    Head,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
    /// `CONNECT`
    Connect,
    /// `OPTIONS`
    Options,
    /// `TRACE`
    Trace,
    /// `PATCH`
    Patch,
}

impl Verb {
    /// All verbs, in the order they are tried when stripping a method name.
    pub const ALL: [Self; 9] = [
        Self::Get,
        Self::Head,
        Self::Post,
        Self::Put,
        Self::Delete,
        Self::Connect,
        Self::Options,
        Self::Trace,
        Self::Patch,
    ];

    /// The canonical uppercase token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Connect => "CONNECT",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
            Self::Patch => "PATCH",
        }
    }

    /// Returns true for verbs whose requests carry a body that is merged
    /// into the payload (POST, PUT, PATCH, DELETE).
    #[must_use]
    pub const fn has_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch | Self::Delete)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|verb| verb.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::InvalidVerb(s.to_string()))
    }
}

/// Split an exposed method name into its verb and procedure name.
///
/// The verb prefix is matched case-insensitively, and the character right
/// after it must be an ASCII uppercase letter: `GetFoo` yields
/// `(Verb::Get, "Foo")` while `Getfoo` yields `None`.
#[must_use]
pub fn parse_exposed_name(name: &str) -> Option<(Verb, &str)> {
    Verb::ALL.into_iter().find_map(|verb| {
        let token = verb.as_str();
        let prefix = name.get(..token.len())?;
        let rest = &name[token.len()..];
        let starts_upper = rest.chars().next().is_some_and(|c| c.is_ascii_uppercase());
        (prefix.eq_ignore_ascii_case(token) && starts_upper).then_some((verb, rest))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_verb_prefix() {
        let cases = [
            ("GetFoo", Verb::Get),
            ("HeadFoo", Verb::Head),
            ("PostFoo", Verb::Post),
            ("PutFoo", Verb::Put),
            ("DeleteFoo", Verb::Delete),
            ("ConnectFoo", Verb::Connect),
            ("OptionsFoo", Verb::Options),
            ("TraceFoo", Verb::Trace),
            ("PatchFoo", Verb::Patch),
        ];
        for (name, verb) in cases {
            assert_eq!(parse_exposed_name(name), Some((verb, "Foo")), "{name}");
        }
    }

    #[test]
    fn prefix_is_case_insensitive() {
        assert_eq!(parse_exposed_name("GETFoo"), Some((Verb::Get, "Foo")));
        assert_eq!(parse_exposed_name("pOsTBar"), Some((Verb::Post, "Bar")));
    }

    #[test]
    fn rejects_lowercase_after_verb() {
        assert_eq!(parse_exposed_name("Getfoo"), None);
        assert_eq!(parse_exposed_name("Postal"), None);
    }

    #[test]
    fn rejects_bare_verb_and_unknown_prefix() {
        assert_eq!(parse_exposed_name("Get"), None);
        assert_eq!(parse_exposed_name(""), None);
        assert_eq!(parse_exposed_name("FetchFoo"), None);
        assert_eq!(parse_exposed_name("Fibonacci"), None);
    }

    #[test]
    fn multibyte_names_do_not_panic() {
        assert_eq!(parse_exposed_name("Gé"), None);
        assert_eq!(parse_exposed_name("ÉtatFoo"), None);
    }

    #[test]
    fn verb_from_str() {
        assert_eq!("get".parse::<Verb>().unwrap(), Verb::Get);
        assert_eq!("PATCH".parse::<Verb>().unwrap(), Verb::Patch);
        assert!("BREW".parse::<Verb>().is_err());
    }

    #[test]
    fn body_semantics() {
        assert!(Verb::Post.has_body());
        assert!(Verb::Delete.has_body());
        assert!(!Verb::Get.has_body());
        assert!(!Verb::Connect.has_body());
    }
}
