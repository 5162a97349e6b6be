//! SASL mechanism names and ranking.

use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// SASL mechanisms recognized in `AUTH=` capabilities.
///
/// Only PLAIN and LOGIN have a handshake in this crate; the others are
/// recognized so that they can be ranked and reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// PLAIN (RFC 4616), single message with the credentials inline.
    Plain,
    /// Legacy LOGIN, username and password prompted separately.
    Login,
    /// CRAM-MD5 (RFC 2195).
    CramMd5,
    /// DIGEST-MD5 (RFC 2831).
    DigestMd5,
    /// SCRAM-SHA-1 (RFC 5802).
    ScramSha1,
    /// SCRAM-SHA-256 (RFC 7677).
    ScramSha256,
    /// XOAUTH2 bearer token (Gmail, Outlook).
    XOAuth2,
}

impl AuthMechanism {
    /// Every mechanism, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Plain,
        Self::Login,
        Self::CramMd5,
        Self::DigestMd5,
        Self::ScramSha1,
        Self::ScramSha256,
        Self::XOAuth2,
    ];

    /// Name as it appears after `AUTH=`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
            Self::CramMd5 => "CRAM-MD5",
            Self::DigestMd5 => "DIGEST-MD5",
            Self::ScramSha1 => "SCRAM-SHA-1",
            Self::ScramSha256 => "SCRAM-SHA-256",
            Self::XOAuth2 => "XOAUTH2",
        }
    }

    /// Looks a mechanism up by name, ignoring case.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(name))
    }

    /// Fixed security rank; higher is preferred.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Login => 1,
            Self::Plain => 2,
            Self::CramMd5 => 3,
            Self::DigestMd5 => 4,
            Self::ScramSha1 => 5,
            Self::ScramSha256 => 6,
            Self::XOAuth2 => 7,
        }
    }

    /// Returns true if this crate can run the mechanism's exchange.
    #[must_use]
    pub const fn is_executable(self) -> bool {
        matches!(self, Self::Plain | Self::Login)
    }

    /// Picks the highest-ranked recognized mechanism among `names`.
    ///
    /// Unknown names are skipped. Equal ranks resolve to the mechanism
    /// declared first.
    pub fn strongest<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        Self::best_of(names.into_iter().filter_map(Self::from_name))
    }

    /// Like [`strongest`](Self::strongest), restricted to mechanisms with an
    /// executable handshake.
    pub fn select<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        Self::best_of(
            names
                .into_iter()
                .filter_map(Self::from_name)
                .filter(|m| m.is_executable()),
        )
    }

    fn best_of(candidates: impl Iterator<Item = Self>) -> Option<Self> {
        candidates.min_by_key(|m| (Reverse(m.rank()), *m as u8))
    }
}

impl fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AuthMechanism {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| Error::InvalidRequest(format!("unknown SASL mechanism {s}")))
    }
}
