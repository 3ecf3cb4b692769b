//! Sender authorization.

/// Why an inbound message was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDenied {
    /// No senders are configured, so nobody is admitted.
    NoAllowlist,
    NotOnAllowlist,
}

impl std::fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAllowlist => write!(f, "no senders are allowed"),
            Self::NotOnAllowlist => write!(f, "sender not on allowlist"),
        }
    }
}

impl std::error::Error for AccessDenied {}

/// Canonical form of a phone number or chat ID: no `+`, spaces, dashes or
/// parentheses, lowercased.
#[must_use]
pub fn normalize_sender(id: &str) -> String {
    id.chars()
        .filter(|c| !matches!(c, '+' | ' ' | '-' | '(' | ')'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Check a sender against the allowlist. Entries are exact IDs or `*` globs.
/// An empty allowlist denies everyone.
pub fn check_access(allowlist: &[String], sender: &str) -> Result<(), AccessDenied> {
    if allowlist.is_empty() {
        return Err(AccessDenied::NoAllowlist);
    }
    let sender = normalize_sender(sender);
    let allowed = allowlist.iter().any(|entry| {
        let pattern = normalize_sender(entry);
        if pattern.contains('*') {
            glob_match(&pattern, &sender)
        } else {
            pattern == sender
        }
    });
    if allowed {
        Ok(())
    } else {
        Err(AccessDenied::NotOnAllowlist)
    }
}

/// `*` matches any run of characters.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let [first, middle @ .., last] = parts.as_slice() else {
        return pattern == text;
    };
    // Anchor both ends first so the middle segments cannot overlap them.
    let Some(mut rest) = text
        .strip_prefix(first)
        .and_then(|rest| rest.strip_suffix(last))
    else {
        return false;
    };
    for part in middle.iter().filter(|p| !p.is_empty()) {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn list(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn empty_allowlist_denies_everyone() {
        assert_eq!(check_access(&[], "611111"), Err(AccessDenied::NoAllowlist));
    }

    #[rstest]
    #[case(&["+61 411-111"], "61411111", true)]
    #[case(&["61411111"], "+61411111", true)]
    #[case(&["61411111"], "61411112", false)]
    #[case(&["614*"], "61499999", true)]
    #[case(&["614*"], "1614", false)]
    #[case(&["*999"], "61499999", true)]
    #[case(&["*"], "anything", true)]
    #[case(&["61*1*9"], "61419", true)]
    #[case(&["61*19"], "619", false)]
    #[case(&["1", "2"], "2", true)]
    fn allowlist_matching(#[case] entries: &[&str], #[case] sender: &str, #[case] allowed: bool) {
        assert_eq!(check_access(&list(entries), sender).is_ok(), allowed);
    }

    #[test]
    fn denial_reason_displays() {
        assert_eq!(
            AccessDenied::NotOnAllowlist.to_string(),
            "sender not on allowlist"
        );
    }
}
