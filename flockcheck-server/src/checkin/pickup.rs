//! Pickup authorization for checkout.
//!
//! A verdict can only be produced by [`verify`]; checkout accepts nothing
//! else, so a client cannot hand in its own verdict.

use flockcheck_shared::api::PickupVerdictKind;
use flockcheck_shared::domain::AuthorizationLevel;

use super::{Actor, CheckinError};

/// Who is standing at the kiosk to collect the child.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresentingPerson {
    pub person_id: Option<i32>,
    pub name: Option<String>,
}

impl PresentingPerson {
    pub fn describe(&self) -> String {
        match (self.person_id, self.name.as_deref()) {
            (Some(id), _) => format!("person:{id}"),
            (None, Some(name)) => format!("name:{name}"),
            (None, None) => "unidentified".to_string(),
        }
    }
}

/// An authorized-pickup row with the name to match free-text presenters against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickupRule {
    pub id: i32,
    pub authorized_person_id: Option<i32>,
    pub name: Option<String>,
    pub relationship: String,
    pub level: AuthorizationLevel,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct PickupRequest<'a> {
    pub child_person_id: i32,
    pub presenting: &'a PresentingPerson,
    pub security_code: Option<&'a str>,
    pub force_override: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickupGrant {
    child_person_id: i32,
    rule_id: i32,
    relationship: String,
    presenting: PresentingPerson,
}

impl PickupGrant {
    pub fn child_person_id(&self) -> i32 {
        self.child_person_id
    }
    pub fn rule_id(&self) -> i32 {
        self.rule_id
    }
    pub fn relationship(&self) -> &str {
        &self.relationship
    }
    pub fn presenting(&self) -> &PresentingPerson {
        &self.presenting
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorOverride {
    child_person_id: i32,
    presenting: PresentingPerson,
    supervisor_username: String,
    supervisor_person_id: Option<i32>,
    denied_because: String,
}

impl SupervisorOverride {
    pub fn child_person_id(&self) -> i32 {
        self.child_person_id
    }
    pub fn presenting(&self) -> &PresentingPerson {
        &self.presenting
    }
    pub fn supervisor_username(&self) -> &str {
        &self.supervisor_username
    }
    pub fn supervisor_person_id(&self) -> Option<i32> {
        self.supervisor_person_id
    }
    pub fn denied_because(&self) -> &str {
        &self.denied_because
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickupVerdict {
    Authorized(PickupGrant),
    Unauthorized { child_person_id: i32, reason: String },
    Override(SupervisorOverride),
}

impl PickupVerdict {
    pub fn kind(&self) -> PickupVerdictKind {
        match self {
            PickupVerdict::Authorized(_) => PickupVerdictKind::Authorized,
            PickupVerdict::Unauthorized { .. } => PickupVerdictKind::Unauthorized,
            PickupVerdict::Override(_) => PickupVerdictKind::Override,
        }
    }

    pub fn child_person_id(&self) -> i32 {
        match self {
            PickupVerdict::Authorized(g) => g.child_person_id,
            PickupVerdict::Unauthorized {
                child_person_id, ..
            } => *child_person_id,
            PickupVerdict::Override(o) => o.child_person_id,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            PickupVerdict::Authorized(_) => None,
            PickupVerdict::Unauthorized { reason, .. } => Some(reason),
            PickupVerdict::Override(o) => Some(&o.denied_because),
        }
    }
}

fn names_match(a: &str, b: &str) -> bool {
    let norm = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    norm(a) == norm(b)
}

fn find_rule<'r>(rules: &'r [PickupRule], presenting: &PresentingPerson) -> Option<&'r PickupRule> {
    let mut active = rules.iter().filter(|r| r.is_active);
    match (presenting.person_id, presenting.name.as_deref()) {
        (Some(id), _) => active.find(|r| r.authorized_person_id == Some(id)),
        (None, Some(name)) => {
            active.find(|r| r.name.as_deref().is_some_and(|n| names_match(n, name)))
        }
        (None, None) => None,
    }
}

/// Why a matched rule still does not permit pickup, if it does not.
fn restriction(
    rule: &PickupRule,
    open_codes: &[String],
    security_code: Option<&str>,
) -> Option<&'static str> {
    match rule.level {
        AuthorizationLevel::Always => None,
        AuthorizationLevel::Restricted => match security_code {
            Some(code) if open_codes.iter().any(|c| c.eq_ignore_ascii_case(code.trim())) => None,
            Some(_) => Some("security code does not match"),
            None => Some("security code required for restricted pickup"),
        },
    }
}

/// Matches the presenting person against the child's pickup rules.
///
/// `open_codes` are the security codes of the child's open attendances,
/// checked for `Restricted` rules. An override requested by a caller whose
/// role may not override fails with `OverrideForbidden`.
pub fn verify(
    rules: &[PickupRule],
    open_codes: &[String],
    request: &PickupRequest<'_>,
    actor: &Actor,
) -> Result<PickupVerdict, CheckinError> {
    let reason = match find_rule(rules, request.presenting) {
        None => "presenting person is not on the authorized pickup list".to_string(),
        Some(rule) => match restriction(rule, open_codes, request.security_code) {
            None => {
                return Ok(PickupVerdict::Authorized(PickupGrant {
                    child_person_id: request.child_person_id,
                    rule_id: rule.id,
                    relationship: rule.relationship.clone(),
                    presenting: request.presenting.clone(),
                }));
            }
            Some(reason) => reason.to_string(),
        },
    };

    if !request.force_override {
        return Ok(PickupVerdict::Unauthorized {
            child_person_id: request.child_person_id,
            reason,
        });
    }
    if !actor.role.can_override() {
        return Err(CheckinError::OverrideForbidden);
    }
    Ok(PickupVerdict::Override(SupervisorOverride {
        child_person_id: request.child_person_id,
        presenting: request.presenting.clone(),
        supervisor_username: actor.username.clone(),
        supervisor_person_id: actor.person_id,
        denied_because: reason,
    }))
}
