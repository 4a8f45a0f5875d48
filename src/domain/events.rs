//! Outbound client events and notification levels.

use serde::Serialize;

/// Event pushed back to the connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum OutboundEvent {
    /// Rejection, error or informational text. `category` is the requested card type.
    WithdrawFeedback { message: String, category: String },
    WithdrawalPending { coins: i64 },
    WithdrawalSuccess { coins: i64 },
    BalanceUpdate { balance: i64 },
}

impl OutboundEvent {
    pub fn feedback(message: impl Into<String>, category: impl Into<String>) -> Self {
        OutboundEvent::WithdrawFeedback {
            message: message.into(),
            category: category.into(),
        }
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::WithdrawFeedback { .. } => "withdrawFeedback",
            OutboundEvent::WithdrawalPending { .. } => "withdrawalPending",
            OutboundEvent::WithdrawalSuccess { .. } => "withdrawalSuccess",
            OutboundEvent::BalanceUpdate { .. } => "balanceUpdate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

impl NotificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationLevel::Info => "Info",
            NotificationLevel::Warning => "Warning",
            NotificationLevel::Error => "Error",
        }
    }
}

impl std::str::FromStr for NotificationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Info" => Ok(NotificationLevel::Info),
            "Warning" => Ok(NotificationLevel::Warning),
            "Error" => Ok(NotificationLevel::Error),
            other => Err(format!("unknown notification level: {}", other)),
        }
    }
}

pub const KIND_PENDING_WITHDRAWAL: &str = "pendingwithdrawal";
pub const KIND_SUCCESS_WITHDRAWAL: &str = "successwithdrawal";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let json = serde_json::to_value(OutboundEvent::WithdrawalPending { coins: 100 }).unwrap();
        assert_eq!(json, serde_json::json!({"event": "withdrawalPending", "payload": {"coins": 100}}));

        let json = serde_json::to_value(OutboundEvent::feedback("nope", "Steam")).unwrap();
        assert_eq!(json["event"], "withdrawFeedback");
        assert_eq!(json["payload"]["category"], "Steam");
    }

    #[test]
    fn test_event_name_matches_serialized_tag() {
        let events = [
            OutboundEvent::feedback("m", "c"),
            OutboundEvent::WithdrawalPending { coins: 1 },
            OutboundEvent::WithdrawalSuccess { coins: 1 },
            OutboundEvent::BalanceUpdate { balance: 1 },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["event"], event.name());
        }
    }
}
