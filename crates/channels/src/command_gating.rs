use rgbot_config::AccessGroupsOffMode;

/// One source of command authorization (an allowlist, a role check, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandAuthorizer {
    /// Whether this authorizer has anything configured at all.
    pub configured: bool,
    /// Whether the sender passed it. Meaningless when not configured.
    pub allowed: bool,
}

/// Combine authorizers into a single decision.
///
/// With access groups on, the sender needs at least one configured
/// authorizer that allows them. With access groups off, `mode` decides:
/// allow everyone, deny everyone, or enforce only configured authorizers
/// (everyone passes when none are configured).
pub fn resolve_command_authorized_from_authorizers(
    use_access_groups: bool,
    authorizers: &[CommandAuthorizer],
    mode: AccessGroupsOffMode,
) -> bool {
    let any_allowed = || authorizers.iter().any(|a| a.configured && a.allowed);
    if use_access_groups {
        return any_allowed();
    }
    match mode {
        AccessGroupsOffMode::Allow => true,
        AccessGroupsOffMode::Deny => false,
        AccessGroupsOffMode::Configured => {
            !authorizers.iter().any(|a| a.configured) || any_allowed()
        },
    }
}
