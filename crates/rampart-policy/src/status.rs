//! SecurityPolicy status conditions
//!
//! Conditions follow Kubernetes `SetStatusCondition` semantics: one entry per
//! type, replaced in place; the transition time only moves when the status
//! actually changes.

use chrono::Utc;

use rampart_common::crd::{Condition, ConditionStatus, SecurityPolicy, SecurityPolicyStatus};

/// Condition type reporting whether the policy was attached and compiled
pub const CONDITION_ACCEPTED: &str = "Accepted";

/// Condition type reporting that route policies shadow this gateway policy
pub const CONDITION_OVERRIDDEN: &str = "Overridden";

/// Reasons used on SecurityPolicy conditions
pub mod reason {
    /// Policy attached and compiled
    pub const ACCEPTED: &str = "Accepted";
    /// Policy is malformed or could not be compiled
    pub const INVALID: &str = "Invalid";
    /// Target does not exist
    pub const TARGET_NOT_FOUND: &str = "TargetNotFound";
    /// Target already holds another policy
    pub const CONFLICTED: &str = "Conflicted";
    /// Route policies take precedence on some routes
    pub const OVERRIDDEN: &str = "Overridden";
}

/// Message on a successfully accepted policy
pub const ACCEPTED_MESSAGE: &str = "SecurityPolicy has been accepted.";

/// Set (or replace) a condition on the policy status
pub fn set_condition(
    policy: &mut SecurityPolicy,
    type_: &str,
    status: ConditionStatus,
    reason: &str,
    message: &str,
) {
    let generation = policy.metadata.generation;
    let conditions = &mut policy
        .status
        .get_or_insert_with(SecurityPolicyStatus::default)
        .conditions;

    match conditions.iter_mut().find(|c| c.type_ == type_) {
        Some(existing) => {
            if existing.status != status {
                existing.last_transition_time = Utc::now();
            }
            existing.status = status;
            existing.reason = reason.to_string();
            existing.message = message.to_string();
            existing.observed_generation = generation;
        }
        None => conditions.push(
            Condition::new(type_, status, reason, message).with_observed_generation(generation),
        ),
    }
}

/// Mark the policy `Accepted=True`
pub fn set_accepted(policy: &mut SecurityPolicy) {
    set_condition(
        policy,
        CONDITION_ACCEPTED,
        ConditionStatus::True,
        reason::ACCEPTED,
        ACCEPTED_MESSAGE,
    );
}

/// Mark the policy `Accepted=False` with the given reason
pub fn set_rejected(policy: &mut SecurityPolicy, reason: &str, message: &str) {
    set_condition(
        policy,
        CONDITION_ACCEPTED,
        ConditionStatus::False,
        reason,
        message,
    );
}

/// Turn an error message into condition prose: capitalized, ending with `.`
pub fn error_to_condition_message(message: &str) -> String {
    let mut chars = message.chars();
    let mut out = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => return String::new(),
    };
    if !out.ends_with('.') {
        out.push('.');
    }
    out
}
