use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub content: String,
    pub existing: usize,
    pub total: usize,
}

impl MergeOutcome {
    pub fn added(&self) -> usize {
        self.total.saturating_sub(self.existing)
    }
}

/// Merges public key lines into existing authorized_keys content as a sorted
/// set union. Repeated merges of the same key set are byte-identical, and the
/// union never drops keys that were already present.
pub fn merge_key_lines(existing: &str, incoming: &[String]) -> MergeOutcome {
    let mut lines: BTreeSet<String> = existing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();
    let existing_count = lines.len();

    for key in incoming {
        let trimmed = key.trim();
        if !trimmed.is_empty() {
            lines.insert(trimmed.to_string());
        }
    }

    let total = lines.len();
    let content = if lines.is_empty() {
        String::new()
    } else {
        let mut joined = lines.into_iter().collect::<Vec<_>>().join("\n");
        joined.push('\n');
        joined
    };

    MergeOutcome {
        content,
        existing: existing_count,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::merge_key_lines;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn merge_into_empty_sorts_and_terminates_with_newline() {
        let outcome = merge_key_lines("", &keys(&["ssh-rsa BBB b@b", "ssh-ed25519 AAA a@a"]));
        assert_eq!(outcome.content, "ssh-ed25519 AAA a@a\nssh-rsa BBB b@b\n");
        assert_eq!(outcome.existing, 0);
        assert_eq!(outcome.total, 2);
        assert_eq!(outcome.added(), 2);
    }

    #[test]
    fn merge_is_idempotent() {
        let first = merge_key_lines("", &keys(&["ssh-ed25519 AAA a@a"]));
        let second = merge_key_lines(&first.content, &keys(&["ssh-ed25519 AAA a@a"]));
        assert_eq!(first.content, second.content);
        assert_eq!(second.added(), 0);
    }

    #[test]
    fn merge_never_shrinks_the_union() {
        let both = merge_key_lines("", &keys(&["ssh-ed25519 AAA a@a", "ssh-rsa BBB b@b"]));
        let narrowed = merge_key_lines(&both.content, &keys(&["ssh-ed25519 AAA a@a"]));
        assert_eq!(narrowed.content, both.content);
        assert_eq!(narrowed.total, 2);
    }

    #[test]
    fn merge_superset_adds_the_missing_key() {
        let first = merge_key_lines("", &keys(&["ssh-ed25519 AAA a@a"]));
        let second = merge_key_lines(
            &first.content,
            &keys(&["ssh-ed25519 AAA a@a", "ssh-rsa BBB b@b"]),
        );
        assert_eq!(second.added(), 1);
        assert!(second.content.contains("ssh-ed25519 AAA a@a"));
        assert!(second.content.contains("ssh-rsa BBB b@b"));
    }

    #[test]
    fn merge_drops_blank_and_comment_lines_from_existing() {
        let existing = "# managed keys\n\n  ssh-ed25519 AAA a@a  \n";
        let outcome = merge_key_lines(existing, &keys(&["ssh-rsa BBB b@b"]));
        assert_eq!(outcome.existing, 1);
        assert_eq!(outcome.content, "ssh-ed25519 AAA a@a\nssh-rsa BBB b@b\n");
    }

    #[test]
    fn merge_ignores_blank_incoming_keys() {
        let outcome = merge_key_lines("", &keys(&["", "   ", "ssh-rsa BBB b@b"]));
        assert_eq!(outcome.total, 1);
    }
}
