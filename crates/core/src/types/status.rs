//! Status enums for checkout entities.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a recorded order.
///
/// Orders are written as `Received`; later transitions belong to order
/// management tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Received,
    Processing,
    Shipped,
    Cancelled,
}

impl OrderStatus {
    /// Column value used by the durable store.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(Self::Received),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_received() {
        assert_eq!(OrderStatus::default(), OrderStatus::Received);
    }

    #[test]
    fn test_display_matches_parse() {
        for status in [
            OrderStatus::Received,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(status.to_string().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("lost".parse::<OrderStatus>().is_err());
    }
}
