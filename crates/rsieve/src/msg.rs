//! Message access interface and address parsing.
//!
//! The engine never touches the mail store directly; everything it may ask
//! about a message goes through the [`Message`] trait.

/// One parsed mailbox from an address header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Address {
    /// Display name, if present.
    pub name: Option<String>,
    /// Local part before the `@`.
    pub mailbox: String,
    /// Domain after the `@`; empty for bare local names.
    pub domain: String,
}

impl Address {
    /// `mailbox@domain`, or just the mailbox when there is no domain.
    #[must_use]
    pub fn email(&self) -> String {
        if self.domain.is_empty() {
            self.mailbox.clone()
        } else {
            format!("{}@{}", self.mailbox, self.domain)
        }
    }
}

/// What the interpreter may query about the message under delivery.
pub trait Message {
    /// All values of a header, in occurrence order. Lookup is
    /// case-insensitive per RFC 5322.
    fn header(&self, name: &str) -> Vec<&str>;

    /// Physical message size in bytes.
    fn size(&self) -> u64;

    /// Envelope sender (SMTP MAIL FROM), if known.
    fn envelope_sender(&self) -> Option<&str> {
        None
    }

    /// Envelope recipient (SMTP RCPT TO), if known.
    fn envelope_recipient(&self) -> Option<&str> {
        None
    }

    /// Raw header block, when the backend can provide it.
    fn raw_headers(&self) -> Option<&[u8]> {
        None
    }
}

/// Parse a comma-separated address header value into mailboxes.
///
/// This is deliberately tolerant: display names (quoted or not), angle
/// brackets, and bare `local@domain` forms are all accepted; comments and
/// obsolete routing syntax are not. Unparsable groups are skipped.
#[must_use]
pub fn parse_addresses(value: &str) -> Vec<Address> {
    let mut out = Vec::new();
    for part in split_addresses(value) {
        if let Some(addr) = parse_one(part.trim()) {
            out.push(addr);
        }
    }
    out
}

/// Split on commas that are not inside quotes or angle brackets.
fn split_addresses(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0usize;
    let mut quoted = false;
    let mut angle = false;
    for (i, c) in value.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '<' if !quoted => angle = true,
            '>' if !quoted => angle = false,
            ',' if !quoted && !angle => {
                parts.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);
    parts
}

fn parse_one(part: &str) -> Option<Address> {
    if part.is_empty() {
        return None;
    }

    // Angle-bracket form: [display-name] '<' addr-spec '>'
    if let Some(open) = find_unquoted(part, '<') {
        let close = part.rfind('>')?;
        if close <= open {
            return None;
        }
        let name = clean_display_name(&part[..open]);
        let spec = &part[open + 1..close];
        let (mailbox, domain) = split_spec(spec)?;
        return Some(Address {
            name,
            mailbox,
            domain,
        });
    }

    // Bare addr-spec.
    let (mailbox, domain) = split_spec(part)?;
    Some(Address {
        name: None,
        mailbox,
        domain,
    })
}

fn find_unquoted(value: &str, needle: char) -> Option<usize> {
    let mut quoted = false;
    for (i, c) in value.char_indices() {
        match c {
            '"' => quoted = !quoted,
            c if c == needle && !quoted => return Some(i),
            _ => {}
        }
    }
    None
}

fn clean_display_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    if unquoted.is_empty() {
        None
    } else {
        Some(unquoted.replace("\\\"", "\"").replace("\\\\", "\\"))
    }
}

fn split_spec(spec: &str) -> Option<(String, String)> {
    let spec = spec.trim();
    if spec.is_empty() {
        return None;
    }
    match spec.rfind('@') {
        Some(at) => {
            let mailbox = spec[..at].trim();
            let domain = spec[at + 1..].trim();
            if mailbox.is_empty() {
                return None;
            }
            Some((mailbox.to_string(), domain.to_string()))
        }
        None => Some((spec.to_string(), String::new())),
    }
}
