use std::fmt::Display;

use lazy_static::lazy_static;
use regex::Regex;

/// A commit named relative to a branch tip: `branch` is the tip itself and
/// `branch~N` is the commit `N` commits before it.
///
/// The name only means something next to the list of ahead-of-main commits it
/// was derived from. It denotes a commit, not a branch, even though it's
/// spelled with a branch name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitRef(String);

impl CommitRef {
    /// Name the commit `distance` commits before the tip of `branch`.
    pub fn new(branch: &str, distance: usize) -> Self {
        if distance == 0 {
            Self(branch.to_owned())
        } else {
            Self(format!("{branch}~{distance}"))
        }
    }

    /// The branch whose tip this reference is relative to.
    pub fn branch_name(&self) -> &str {
        branch_name_from_reference(&self.0)
    }

    /// The reference as it would be passed to Git.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CommitRef {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for CommitRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Display for CommitRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strip a trailing `~<digits>` suffix (and surrounding whitespace) from a
/// reference, leaving the bare branch name. Input without the suffix comes
/// back trimmed.
pub fn branch_name_from_reference(reference: &str) -> &str {
    lazy_static! {
        static ref RELATIVE_REF_RE: Regex = Regex::new(r"^\s*(.*?)(?:~\d+)?\s*$").unwrap();
    }

    match RELATIVE_REF_RE
        .captures(reference)
        .and_then(|captures| captures.get(1))
    {
        Some(name) => name.as_str(),
        None => reference.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_name_from_reference() {
        assert_eq!(branch_name_from_reference("branch1"), "branch1");
        assert_eq!(branch_name_from_reference("branch1~3"), "branch1");
        assert_eq!(branch_name_from_reference("  feature/x~12 "), "feature/x");
        assert_eq!(branch_name_from_reference("weird~name"), "weird~name");
        assert_eq!(branch_name_from_reference("b~1~2"), "b~1");
        assert_eq!(branch_name_from_reference(""), "");
    }

    #[test]
    fn test_commit_ref_new() {
        assert_eq!(CommitRef::new("b5", 0).as_str(), "b5");
        assert_eq!(CommitRef::new("b5", 1).to_string(), "b5~1");
        assert_eq!(CommitRef::new("b5", 7).branch_name(), "b5");
    }
}
