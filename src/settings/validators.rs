//! Input filters for the free-text network fields.
//!
//! Each validator sees the current text and the text the edit would produce,
//! and either lets the edit through or says why it was refused.

use std::fmt;

const MAX_PORT: u32 = 65_535;
const MAX_PORT_DIGITS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Text would contain a space or tab.
    Whitespace,
    /// Port text is not 0-5 ASCII digits.
    PortPattern,
    /// Port digits are outside 1..=65535.
    PortRange,
    /// The field is not editable in the current state.
    Locked,
}

impl Rejection {
    /// Whether the user should be told, rather than the keystroke being dropped silently.
    pub fn is_user_visible(self) -> bool {
        matches!(self, Rejection::PortRange)
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Rejection::Whitespace => "spaces and tabs are not allowed",
            Rejection::PortPattern => "port must be up to five digits",
            Rejection::PortRange => "port must be between 1 and 65535",
            Rejection::Locked => "field is not editable",
        };
        f.write_str(msg)
    }
}

/// Host IP and extra path fields.
pub fn validate_no_whitespace(_current: &str, proposed: &str) -> Result<(), Rejection> {
    if proposed.contains([' ', '\t']) {
        return Err(Rejection::Whitespace);
    }
    Ok(())
}

/// Empty means "unset" and is always accepted.
pub fn validate_port(_current: &str, proposed: &str) -> Result<(), Rejection> {
    if proposed.len() > MAX_PORT_DIGITS || !proposed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Rejection::PortPattern);
    }
    if proposed.is_empty() {
        return Ok(());
    }
    // At most five digits, so this always fits
    let port: u32 = proposed.parse().map_err(|_| Rejection::PortPattern)?;
    if port == 0 || port > MAX_PORT {
        return Err(Rejection::PortRange);
    }
    Ok(())
}
