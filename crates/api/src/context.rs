use tally_auth::Principal;
use tally_core::UserId;

/// Authenticated caller for a request, resolved from the user store by the
/// auth middleware.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    pub fn is_superuser(&self) -> bool {
        self.principal.is_superuser
    }
}
