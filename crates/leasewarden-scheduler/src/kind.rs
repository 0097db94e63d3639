//! The closed set of lifecycle jobs.

use std::str::FromStr;

use leasewarden_core::error::LeaseError;

/// Every job the runner knows. Adding a variant forces every `match` on
/// it (dispatch, schedules, CLI) to be updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// Suspend ACTIVE resources whose lease ran out.
    Expire,
    /// Remove EXPIRED resources past retention.
    Delete,
    /// Queue "expires in N days" reminders.
    ExpiryReminders,
    /// Queue "deletes in N days" reminders.
    DeletionReminders,
    /// Send queued reminders.
    DispatchNotifications,
    /// Compare the deployed version with the latest release.
    VersionCheck,
}

impl JobKind {
    pub const ALL: [JobKind; 6] = [
        JobKind::Expire,
        JobKind::Delete,
        JobKind::ExpiryReminders,
        JobKind::DeletionReminders,
        JobKind::DispatchNotifications,
        JobKind::VersionCheck,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            JobKind::Expire => "expire",
            JobKind::Delete => "delete",
            JobKind::ExpiryReminders => "expiry-reminders",
            JobKind::DeletionReminders => "deletion-reminders",
            JobKind::DispatchNotifications => "dispatch-notifications",
            JobKind::VersionCheck => "version-check",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == s)
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for JobKind {
    type Err = LeaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            let known: Vec<&str> = Self::ALL.iter().map(|k| k.name()).collect();
            LeaseError::Config(format!("unknown job '{s}' (known: {})", known.join(", ")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_roundtrip() {
        for kind in JobKind::ALL {
            assert_eq!(kind.name().parse::<JobKind>().unwrap(), kind);
        }
        assert!("reboot".parse::<JobKind>().is_err());
    }

    #[test]
    fn test_serialized_as_name() {
        let json = serde_json::to_string(&JobKind::DispatchNotifications).unwrap();
        assert_eq!(json, "\"dispatch-notifications\"");
    }
}
