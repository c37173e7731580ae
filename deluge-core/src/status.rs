use serde::{Deserialize, Serialize};

/// Status of a [`DelugeRun`](crate::DelugeRun).
///
/// Variants are declared in merge precedence order; see [`DelugeStatus::merge`].
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum DelugeStatus {
    #[default]
    #[serde(rename = "notStarted")]
    #[strum(serialize = "notStarted")]
    Virgin,
    InProgress,
    DoneSuccess,
    Interrupted,
    DoneError,
}

impl DelugeStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::DoneSuccess | Self::Interrupted | Self::DoneError)
    }

    /// Combines the statuses reported by independent workers for the same run.
    ///
    /// `notStarted < inProgress < doneSuccess < interrupted < doneError`: the higher one wins,
    /// so a single failing worker marks the whole job as failed.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        self.max(other)
    }
}

/// Status of a [`ScenarioRun`](crate::ScenarioRun).
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ScenarioStatus {
    #[default]
    #[serde(rename = "notStarted")]
    #[strum(serialize = "notStarted")]
    Virgin,
    InProgress,
    DoneSuccess,
    Interrupted,
    DoneError,
}

impl ScenarioStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::DoneSuccess | Self::Interrupted | Self::DoneError)
    }

    /// Combines the statuses reported by independent workers for the same scenario.
    ///
    /// Same order as [`DelugeStatus::merge`]: `notStarted < inProgress < doneSuccess <
    /// interrupted < doneError`.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        self.max(other)
    }

    /// Final status of a scenario from the terminal statuses of its users.
    ///
    /// `DoneError` wins over `Interrupted`, which wins over `DoneSuccess`. Users that never
    /// reached a terminal status are ignored; no user at all yields `DoneSuccess`.
    pub fn from_user_statuses(statuses: impl IntoIterator<Item = UserStatus>) -> Self {
        let mut out = Self::DoneSuccess;
        for status in statuses {
            match status {
                UserStatus::DoneError => return Self::DoneError,
                UserStatus::Interrupted => out = Self::Interrupted,
                UserStatus::Virgin | UserStatus::InProgress | UserStatus::DoneSuccess => {}
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "camelCase")]
pub enum UserStatus {
    #[default]
    Virgin,
    InProgress,
    DoneSuccess,
    DoneError,
    Interrupted,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn deluge_merge_prefers_higher_status() {
        use DelugeStatus::*;
        assert_eq!(Virgin.merge(InProgress), InProgress);
        assert_eq!(DoneSuccess.merge(Interrupted), Interrupted);
        assert_eq!(Interrupted.merge(DoneError), DoneError);
        assert_eq!(DoneError.merge(DoneSuccess), DoneError);
        assert_eq!(InProgress.merge(DoneSuccess), DoneSuccess);
    }

    #[test]
    fn scenario_merge_is_commutative() {
        use ScenarioStatus::*;
        let all = [Virgin, InProgress, DoneSuccess, Interrupted, DoneError];
        for a in all {
            for b in all {
                assert_eq!(a.merge(b), b.merge(a));
            }
        }
    }

    #[test]
    fn user_statuses_error_dominates() {
        use UserStatus::*;
        assert_eq!(
            ScenarioStatus::from_user_statuses([DoneSuccess, Interrupted, DoneError]),
            ScenarioStatus::DoneError
        );
        assert_eq!(
            ScenarioStatus::from_user_statuses([DoneSuccess, Interrupted, DoneSuccess]),
            ScenarioStatus::Interrupted
        );
        assert_eq!(
            ScenarioStatus::from_user_statuses([DoneSuccess, DoneSuccess]),
            ScenarioStatus::DoneSuccess
        );
        assert_eq!(
            ScenarioStatus::from_user_statuses([]),
            ScenarioStatus::DoneSuccess
        );
    }

    #[test]
    fn statuses_use_api_vocabulary() {
        assert_eq!(DelugeStatus::Virgin.to_string(), "notStarted");
        assert_eq!(DelugeStatus::DoneError.to_string(), "doneError");
        assert_eq!(
            "inProgress".parse::<ScenarioStatus>().unwrap(),
            ScenarioStatus::InProgress
        );
        assert_eq!(
            serde_json::to_string(&ScenarioStatus::Virgin).unwrap(),
            "\"notStarted\""
        );
        assert_eq!(
            serde_json::from_str::<DelugeStatus>("\"interrupted\"").unwrap(),
            DelugeStatus::Interrupted
        );
    }
}
