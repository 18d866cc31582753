use crate::error::{ColabError, ColabResult};
use crate::models::{Role, ThreatModel};

pub fn has_role(threat_model: &ThreatModel, user_id: &str, required: Role) -> bool {
    threat_model
        .role_of(user_id)
        .is_some_and(|role| role >= required)
}

/// Check that `user_id` holds at least `required` on the threat model and
/// return the role actually held.
pub fn ensure_role(threat_model: &ThreatModel, user_id: &str, required: Role) -> ColabResult<Role> {
    match threat_model.role_of(user_id) {
        Some(role) if role >= required => Ok(role),
        _ => Err(ColabError::forbidden(format!(
            "User '{}' requires {} access to threat model '{}'",
            user_id, required, threat_model.id
        ))),
    }
}
