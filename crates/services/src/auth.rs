/// Authentication signal consumed by the sync engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthStatus {
    #[default]
    Anonymous,
    /// Signed in, email not yet verified.
    Unverified { user_id: String },
    Verified { user_id: String },
}

impl AuthStatus {
    #[must_use]
    pub fn verified(user_id: impl Into<String>) -> Self {
        Self::Verified {
            user_id: user_id.into(),
        }
    }

    #[must_use]
    pub fn unverified(user_id: impl Into<String>) -> Self {
        Self::Unverified {
            user_id: user_id.into(),
        }
    }

    /// Only verified users read from and write to the remote store.
    #[must_use]
    pub fn can_use_remote(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }

    #[must_use]
    pub fn verified_user(&self) -> Option<&str> {
        match self {
            Self::Verified { user_id } => Some(user_id),
            _ => None,
        }
    }
}
