//! Authorization guard.
//!
//! The single place where ownership and publication rules are decided. Pure: no I/O,
//! no side effects.

use crate::{auth::AuthUser, error::ApiError, models::Map};

/// Decision
///
/// `AllowWrite` implies read access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    AllowWrite,
    AllowRead,
    Deny,
}

impl Decision {
    pub fn can_read(self) -> bool {
        matches!(self, Self::AllowWrite | Self::AllowRead)
    }

    pub fn can_write(self) -> bool {
        self == Self::AllowWrite
    }
}

/// decide
///
/// Owners and admins may write; anyone, anonymous callers included, may read a
/// published map; nobody else sees an unpublished one.
pub fn decide(caller: Option<&AuthUser>, owner_id: i64, is_published: bool) -> Decision {
    match caller {
        Some(user) if user.id == owner_id || user.is_admin => Decision::AllowWrite,
        _ if is_published => Decision::AllowRead,
        _ => Decision::Deny,
    }
}

pub fn decide_for(caller: Option<&AuthUser>, map: &Map) -> Decision {
    decide(caller, map.user_id, map.is_published)
}

/// Read gate. A denied read is reported exactly like a missing map.
pub fn require_read(caller: Option<&AuthUser>, map: &Map) -> Result<(), ApiError> {
    if decide_for(caller, map).can_read() {
        Ok(())
    } else {
        Err(ApiError::NotFound)
    }
}

/// Write gate. Callers who cannot even see the map get `NotFound`; callers who can
/// see it but do not own it get `Forbidden`.
pub fn require_write(caller: &AuthUser, map: &Map) -> Result<(), ApiError> {
    match decide_for(Some(caller), map) {
        Decision::AllowWrite => Ok(()),
        Decision::AllowRead => Err(ApiError::Forbidden),
        Decision::Deny => Err(ApiError::NotFound),
    }
}
