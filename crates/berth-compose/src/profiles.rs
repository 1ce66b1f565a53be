//! Profile activation and per-service deployability.
//!
//! Requested profiles are expanded through the `depends_on` rules declared
//! at the top level, checked against declared `conflicts`, and then used to
//! decide which services take part in a deployment.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::diagnostics::{Issue, Report};
use crate::parser::model::{Document, Service};

/// Requesting this profile activates every profile the document mentions.
pub const ALL_PROFILES: &str = "*";

/// The resolved profile set of one planning run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedProfiles {
    /// Active profiles after auto-adding dependencies.
    pub active: BTreeSet<String>,
    /// Conflict errors, auto-add and unknown-profile warnings.
    pub report: Report,
}

/// Expands `requested` against the profile rules of `document`.
#[must_use]
pub fn resolve_profiles(document: &Document, requested: &[String]) -> ResolvedProfiles {
    let known = document.known_profiles();
    let mut report = Report::default();
    let mut active = BTreeSet::new();
    let mut queue = VecDeque::new();

    for profile in requested.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
        if profile == ALL_PROFILES {
            active.extend(known.iter().cloned());
            queue.extend(known.iter().cloned());
            continue;
        }
        if !known.contains(profile) {
            report.warn(Issue::UnknownProfile {
                profile: profile.to_owned(),
            });
        }
        if active.insert(profile.to_owned()) {
            queue.push_back(profile.to_owned());
        }
    }

    while let Some(profile) = queue.pop_front() {
        let Some(rule) = document.profiles.get(&profile) else {
            continue;
        };
        for dependency in &rule.depends_on {
            if active.insert(dependency.clone()) {
                tracing::info!(profile = %dependency, required_by = %profile, "auto-adding profile");
                report.warn(Issue::ProfileAutoAdded {
                    profile: dependency.clone(),
                    required_by: profile.clone(),
                });
                queue.push_back(dependency.clone());
            }
        }
    }

    let mut conflicts = BTreeSet::new();
    for profile in &active {
        let Some(rule) = document.profiles.get(profile) else {
            continue;
        };
        for other in rule.conflicts.iter().filter(|c| *c != profile) {
            if active.contains(other) {
                let pair = if profile < other {
                    (profile.clone(), other.clone())
                } else {
                    (other.clone(), profile.clone())
                };
                let _ = conflicts.insert(pair);
            }
        }
    }
    for (first, second) in conflicts {
        report.error(Issue::ProfileConflict { first, second });
    }

    ResolvedProfiles { active, report }
}

/// Whether a service takes part in the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Deploy. `matched` lists the active profiles that selected the
    /// service, empty for services without profiles.
    Deploy {
        /// Matching active profiles.
        matched: Vec<String>,
    },
    /// Skip, with a human-readable reason.
    Skip {
        /// Why the service is skipped.
        reason: String,
    },
}

impl Decision {
    /// Returns `true` for [`Decision::Deploy`].
    #[must_use]
    pub fn is_deploy(&self) -> bool {
        matches!(self, Self::Deploy { .. })
    }
}

/// Decides whether `service` deploys under the `active` profiles.
///
/// Services without profiles always deploy; others deploy when at least
/// one of their profiles is active.
#[must_use]
pub fn decide(service: &Service, active: &BTreeSet<String>) -> Decision {
    if service.profiles.is_empty() {
        return Decision::Deploy {
            matched: Vec::new(),
        };
    }
    let matched: Vec<String> = service
        .profiles
        .iter()
        .filter(|p| active.contains(*p))
        .cloned()
        .collect();
    if !matched.is_empty() {
        return Decision::Deploy { matched };
    }
    let active = if active.is_empty() {
        "none".to_owned()
    } else {
        format!("[{}]", active.iter().cloned().collect::<Vec<_>>().join(", "))
    };
    Decision::Skip {
        reason: format!(
            "requires profile(s) [{}]; active: {active}",
            service.profiles.join(", ")
        ),
    }
}

/// Decides every service of `document`.
#[must_use]
pub fn decide_all(document: &Document, active: &BTreeSet<String>) -> BTreeMap<String, Decision> {
    document
        .services
        .iter()
        .map(|(name, service)| (name.clone(), decide(service, active)))
        .collect()
}
