//! Account standing snapshot.

use serde::Serialize;

/// Moderation and verification state of an account, fetched fresh per request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStanding {
    pub banned: bool,
    pub frozen: bool,
    pub muted: bool,
    pub country_banned: bool,
    pub deleted: bool,
    pub email_verified: bool,
    /// Stronger verification tier that enables immediate card issuance.
    pub identity_verified: bool,
}

impl AccountStanding {
    /// Whether moderation blocks withdrawals. Only bans and freezes do.
    pub fn is_suspended(&self) -> bool {
        self.banned || self.frozen
    }
}

/// Standing flags that can be toggled by moderation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandingFlag {
    Banned,
    Frozen,
    Muted,
    CountryBanned,
    Deleted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_ban_and_freeze_suspend() {
        let mut standing = AccountStanding {
            muted: true,
            country_banned: true,
            deleted: true,
            ..Default::default()
        };
        assert!(!standing.is_suspended());

        standing.frozen = true;
        assert!(standing.is_suspended());
    }
}
