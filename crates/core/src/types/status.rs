//! Status enums for orders and staff.

use serde::{Deserialize, Serialize};

/// Canonical order lifecycle status.
///
/// This is the platform's own vocabulary. Every provider status code or free
/// text is translated into one of these values before it touches a local order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Accepted by the provider, not yet picked up.
    #[default]
    Pending,
    /// Picked up / out for pickup.
    Shipped,
    /// In transit to the customer.
    Delivery,
    /// Delivered to the customer, funds not yet settled.
    Delivered,
    /// Delivered and funds settled to the merchant.
    Completed,
    /// Cancelled before delivery.
    Cancelled,
    /// Returned to the merchant.
    Returned,
}

impl OrderStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::Pending,
        Self::Shipped,
        Self::Delivery,
        Self::Delivered,
        Self::Completed,
        Self::Cancelled,
        Self::Returned,
    ];

    /// Statuses swept by the fast incremental pass.
    pub const FAST_SYNC: [Self; 4] = [Self::Pending, Self::Shipped, Self::Delivery, Self::Returned];

    /// Statuses an unmatched order may be in and still be auto-deleted.
    pub const DELETABLE: [Self; 3] = [Self::Pending, Self::Shipped, Self::Delivery];

    /// Whether entering this status releases reserved stock back to inventory.
    ///
    /// Delivered orders convert reserved stock to sold; only cancellations and
    /// returns give it back.
    #[must_use]
    pub const fn releases_stock(self) -> bool {
        matches!(self, Self::Cancelled | Self::Returned)
    }

    /// Whether an unmatched order in this status may be considered for deletion.
    #[must_use]
    pub const fn is_deletable(self) -> bool {
        matches!(self, Self::Pending | Self::Shipped | Self::Delivery)
    }

    /// Position on the forward delivery path.
    ///
    /// Cancelled and returned orders leave the path and have no rank.
    #[must_use]
    pub const fn progress_rank(self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Shipped => Some(1),
            Self::Delivery => Some(2),
            Self::Delivered => Some(3),
            Self::Completed => Some(4),
            Self::Cancelled | Self::Returned => None,
        }
    }

    /// Stable lowercase name, as stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Shipped => "shipped",
            Self::Delivery => "delivery",
            Self::Delivered => "delivered",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Returned => "returned",
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
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("invalid order status: {s}"))
    }
}

/// Role of the staff member a sync session acts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "staff_role", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    /// Sees and sweeps every owner's provider-linked orders.
    Manager,
    /// Sees and sweeps only their own orders.
    Staff,
}

impl std::fmt::Display for StaffRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manager => write!(f, "manager"),
            Self::Staff => write!(f, "staff"),
        }
    }
}

impl std::str::FromStr for StaffRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manager" => Ok(Self::Manager),
            "staff" => Ok(Self::Staff),
            _ => Err(format!("invalid staff role: {s}")),
        }
    }
}
