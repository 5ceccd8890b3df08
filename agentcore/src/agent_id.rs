//! Agent identifier parsing and spawn-permission matching.
//!
//! Identifiers are written `publisher/name@version` (fully qualified) or
//! bare `name` (local). `"latest"` is a version wildcard.

/// A parsed agent identifier with optional publisher and version.
///
/// All fields are optional in the lenient parse; the strict parse requires
/// `publisher` and `version` to be present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentId {
    /// Publisher namespace, e.g. `"pub1"`.
    pub publisher: Option<String>,
    /// The bare agent name, e.g. `"alpha"`.
    pub name: String,
    /// Version string, or `None` if unqualified. `"latest"` is a wildcard.
    pub version: Option<String>,
}

impl AgentId {
    /// Parse an identifier leniently: any of `name`, `publisher/name`,
    /// `name@version`, or `publisher/name@version` is accepted.
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Self {
        let (rest, version) = match raw.rsplit_once('@') {
            Some((rest, version)) => (rest, Some(version.to_string())),
            None => (raw, None),
        };

        match rest.split_once('/') {
            Some((publisher, name)) => Self {
                publisher: Some(publisher.to_string()),
                name: name.to_string(),
                version,
            },
            None => Self {
                publisher: None,
                name: rest.to_string(),
                version,
            },
        }
    }

    /// Parse a fully-qualified identifier `publisher/name@version`. Returns
    /// `None` if the identifier omits either qualifier.
    #[must_use]
    pub fn parse_strict(raw: &str) -> Option<Self> {
        let parsed = Self::parse_lenient(raw);
        if parsed.publisher.is_some() && parsed.version.is_some() {
            Some(parsed)
        } else {
            None
        }
    }

    /// Whether `version` is the `"latest"` wildcard.
    #[must_use]
    pub fn is_latest(&self) -> bool {
        self.version.as_deref() == Some("latest")
    }

    /// Render back to `publisher/name@version` / `name` form.
    #[must_use]
    pub fn to_canonical_string(&self) -> String {
        let mut out = String::new();
        if let Some(publisher) = &self.publisher {
            out.push_str(publisher);
            out.push('/');
        }
        out.push_str(&self.name);
        if let Some(version) = &self.version {
            out.push('@');
            out.push_str(version);
        }
        out
    }
}

/// Whether a spawn requesting child identifier `child` is permitted by a
/// single allowed (spawnable) identifier `allowed`.
///
/// Matching is asymmetric: names must be equal, but an unset qualifier on
/// either side never blocks the match. `"latest"` on the child side matches
/// any version on the allowed side and vice versa, since an unset field on
/// either side is already a wildcard; `"latest"` only narrows when compared
/// against a concrete version is not attempted here (ties among multiple
/// qualifying allowed entries are resolved by the caller, which takes the
/// first match in declaration order).
#[must_use]
pub fn matches(allowed: &AgentId, child: &AgentId) -> bool {
    if allowed.name != child.name {
        return false;
    }

    let publisher_ok = allowed.publisher.is_none()
        || child.publisher.is_none()
        || allowed.publisher == child.publisher;

    let version_ok = allowed.version.is_none()
        || child.version.is_none()
        || allowed.is_latest()
        || child.is_latest()
        || allowed.version == child.version;

    publisher_ok && version_ok
}

/// Resolve a spawn request against the parent template's set of spawnable
/// identifiers, per §4.4: the first matching allowed identifier (in
/// declaration order) is used to resolve the template, not the raw child
/// identifier supplied by the caller. `"latest"` ties are broken by taking
/// the first declared match; callers that care about true "most recent
/// published version" semantics must pre-sort `spawnable` accordingly.
#[must_use]
pub fn resolve_spawn<'a>(spawnable: &'a [AgentId], requested: &str) -> Option<&'a AgentId> {
    let child = AgentId::parse_lenient(requested);
    spawnable.iter().find(|allowed| matches(allowed, &child))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_parse_handles_all_forms() {
        assert_eq!(
            AgentId::parse_lenient("alpha"),
            AgentId {
                publisher: None,
                name: "alpha".to_string(),
                version: None
            }
        );
        assert_eq!(
            AgentId::parse_lenient("pub1/alpha@1.0.0"),
            AgentId {
                publisher: Some("pub1".to_string()),
                name: "alpha".to_string(),
                version: Some("1.0.0".to_string())
            }
        );
        assert_eq!(
            AgentId::parse_lenient("alpha@latest"),
            AgentId {
                publisher: None,
                name: "alpha".to_string(),
                version: Some("latest".to_string())
            }
        );
    }

    #[test]
    fn strict_parse_rejects_unqualified() {
        assert!(AgentId::parse_strict("alpha").is_none());
        assert!(AgentId::parse_strict("pub1/alpha@1.0.0").is_some());
    }

    // S4: Parent spawnables = ["pub1/alpha@1.0.0"]; child agent_type = "alpha".
    #[test]
    fn name_only_match_resolves_to_qualified_template() {
        let spawnable = vec![AgentId::parse_lenient("pub1/alpha@1.0.0")];
        let resolved = resolve_spawn(&spawnable, "alpha").expect("should match by name only");
        assert_eq!(resolved.to_canonical_string(), "pub1/alpha@1.0.0");
    }

    #[test]
    fn mismatched_publisher_is_rejected() {
        let spawnable = vec![AgentId::parse_lenient("pub1/alpha@1.0.0")];
        assert!(resolve_spawn(&spawnable, "pub2/alpha").is_none());
    }

    #[test]
    fn mismatched_version_is_rejected_unless_latest() {
        let spawnable = vec![AgentId::parse_lenient("pub1/alpha@1.0.0")];
        assert!(resolve_spawn(&spawnable, "pub1/alpha@2.0.0").is_none());
        assert!(resolve_spawn(&spawnable, "pub1/alpha@latest").is_some());
    }

    #[test]
    fn unrelated_name_never_matches() {
        let spawnable = vec![AgentId::parse_lenient("pub1/alpha@1.0.0")];
        assert!(resolve_spawn(&spawnable, "beta").is_none());
    }
}
