//! Server capabilities.

use std::fmt;

/// Server capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IMAP4rev1` (RFC 3501)
    Imap4Rev1,
    /// `IMAP4rev2` (RFC 9051)
    Imap4Rev2,
    /// IDLE command support (RFC 2177)
    Idle,
    /// NAMESPACE command support (RFC 2342)
    Namespace,
    /// LITERAL+ extension (RFC 7888)
    LiteralPlus,
    /// STARTTLS support
    StartTls,
    /// LOGIN disabled
    LoginDisabled,
    /// SASL-IR: initial response on AUTHENTICATE (RFC 4959)
    SaslIr,
    /// AUTH mechanism
    Auth(String),
    /// ID extension (RFC 2971)
    Id,
    /// Unknown capability
    Unknown(String),
}

impl Capability {
    /// Parses a capability string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let upper = s.to_uppercase();
        match upper.as_str() {
            "IMAP4REV1" => Self::Imap4Rev1,
            "IMAP4REV2" => Self::Imap4Rev2,
            "IDLE" => Self::Idle,
            "NAMESPACE" => Self::Namespace,
            "LITERAL+" => Self::LiteralPlus,
            "STARTTLS" => Self::StartTls,
            "LOGINDISABLED" => Self::LoginDisabled,
            "SASL-IR" => Self::SaslIr,
            "ID" => Self::Id,
            _ if upper.starts_with("AUTH=") => match s.get(5..) {
                Some(mech) => Self::Auth(mech.to_string()),
                None => Self::Unknown(s.to_string()),
            },
            _ => Self::Unknown(s.to_string()),
        }
    }

    /// Returns the mechanism name if this is an `AUTH=<name>` capability.
    #[must_use]
    pub fn auth_mechanism(&self) -> Option<&str> {
        match self {
            Self::Auth(mech) => Some(mech),
            _ => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Imap4Rev1 => write!(f, "IMAP4rev1"),
            Self::Imap4Rev2 => write!(f, "IMAP4rev2"),
            Self::Idle => write!(f, "IDLE"),
            Self::Namespace => write!(f, "NAMESPACE"),
            Self::LiteralPlus => write!(f, "LITERAL+"),
            Self::StartTls => write!(f, "STARTTLS"),
            Self::LoginDisabled => write!(f, "LOGINDISABLED"),
            Self::SaslIr => write!(f, "SASL-IR"),
            Self::Auth(mech) => write!(f, "AUTH={mech}"),
            Self::Id => write!(f, "ID"),
            Self::Unknown(s) => write!(f, "{s}"),
        }
    }
}

/// Ordered set of capabilities last advertised by the server.
///
/// Replaced wholesale on every refresh, never merged across refreshes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(Vec<Capability>);

impl Capabilities {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Builds a set from every `* CAPABILITY` line in a command response.
    ///
    /// Tokens from multiple lines are unioned; other lines are ignored.
    #[must_use]
    pub fn from_response(lines: &[String]) -> Self {
        lines
            .iter()
            .filter_map(|line| capability_tokens(line))
            .flatten()
            .map(Capability::parse)
            .collect()
    }

    /// Returns true if any line of the response is a `* CAPABILITY` line.
    #[must_use]
    pub fn present_in(lines: &[String]) -> bool {
        lines.iter().any(|line| capability_tokens(line).is_some())
    }

    /// Adds a capability unless it is already present.
    pub fn insert(&mut self, cap: Capability) {
        if !self.0.contains(&cap) {
            self.0.push(cap);
        }
    }

    /// Checks if the server has a specific capability.
    #[must_use]
    pub fn contains(&self, cap: &Capability) -> bool {
        self.0.contains(cap)
    }

    /// Returns true if `AUTH=<mechanism>` was advertised (case-insensitive).
    #[must_use]
    pub fn supports_auth(&self, mechanism: &str) -> bool {
        self.auth_mechanisms()
            .any(|m| m.eq_ignore_ascii_case(mechanism))
    }

    /// Iterates over the advertised `AUTH=` mechanism names.
    pub fn auth_mechanisms(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter_map(Capability::auth_mechanism)
    }

    /// Iterates over the capabilities in advertised order.
    pub fn iter(&self) -> std::slice::Iter<'_, Capability> {
        self.0.iter()
    }

    /// Number of capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no capability is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Removes every capability.
    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        let mut caps = Self::new();
        for cap in iter {
            caps.insert(cap);
        }
        caps
    }
}

impl<'a> IntoIterator for &'a Capabilities {
    type Item = &'a Capability;
    type IntoIter = std::slice::Iter<'a, Capability>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, cap) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{cap}")?;
        }
        Ok(())
    }
}

/// Returns the tokens after `* CAPABILITY` if `line` is a capability line.
fn capability_tokens(line: &str) -> Option<impl Iterator<Item = &str>> {
    let mut tokens = line.split_whitespace();
    if tokens.next() != Some("*") {
        return None;
    }
    if !tokens.next()?.eq_ignore_ascii_case("CAPABILITY") {
        return None;
    }
    Some(tokens)
}
