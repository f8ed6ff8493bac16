//! Translation of provider status vocabulary into [`OrderStatus`].
//!
//! Providers report status as a code, free text, or both, and the text is
//! inconsistent between endpoints and languages. Resolution:
//!
//! 1. exact match of the code against the provider's status catalog
//! 2. ordered keyword scan over the text
//!
//! The keyword order is significant. A text such as "delivered, funds
//! settled" must resolve to completed before the plain delivered rule sees
//! it, and "returned after delivery attempt" must never resolve to delivery.

use std::collections::HashMap;

use serde::Serialize;

use dispatch_sync_core::OrderStatus;

/// Canonical interpretation of one provider status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusMapping {
    /// Canonical status.
    pub status: OrderStatus,
    /// Whether entering this status gives reserved stock back.
    pub releases_stock: bool,
    /// Whether the status itself asserts the funds were settled.
    pub funds_confirmed: bool,
}

impl StatusMapping {
    /// Mapping for a canonical status with no settlement assertion.
    #[must_use]
    pub const fn of(status: OrderStatus) -> Self {
        Self {
            status,
            releases_stock: status.releases_stock(),
            funds_confirmed: matches!(status, OrderStatus::Completed),
        }
    }
}

/// Keyword rules, checked top to bottom. The first rule with a matching
/// keyword wins.
const RULES: &[(OrderStatus, &[&str])] = &[
    (
        OrderStatus::Completed,
        &[
            "settled",
            "funds received",
            "invoice received",
            "paid to merchant",
            "completed",
            "تم التحاسب",
            "تمت المحاسبة",
            "مكتمل",
        ],
    ),
    (
        OrderStatus::Delivered,
        &["delivered", "تم التسليم", "تم التوصيل", "واصل"],
    ),
    (
        OrderStatus::Cancelled,
        &["cancel", "rejected", "ملغي", "الغاء", "إلغاء", "مرفوض"],
    ),
    (
        OrderStatus::Returned,
        &["return", "راجع", "مرتجع", "ارجاع", "إرجاع"],
    ),
    (
        OrderStatus::Shipped,
        &[
            "shipped",
            "picked up",
            "pickup",
            "pick up",
            "تم الاستلام من",
            "بانتظار الاستلام",
        ],
    ),
    (
        OrderStatus::Delivery,
        &[
            "transit",
            "out for delivery",
            "on the way",
            "with courier",
            "delivering",
            "قيد التوصيل",
            "بالطريق",
            "مع المندوب",
        ],
    ),
];

/// Phrases that contain a delivered keyword but mean the opposite.
const NOT_DELIVERED: &[&str] = &["undelivered", "not delivered", "لم يتم التسليم"];

/// Classify free status text with the ordered keyword scan.
///
/// Unknown or empty text resolves to pending.
#[must_use]
pub fn classify_text(text: &str) -> StatusMapping {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return StatusMapping::of(OrderStatus::Pending);
    }
    let negated_delivery = NOT_DELIVERED.iter().any(|phrase| lower.contains(phrase));

    RULES
        .iter()
        .filter(|(status, _)| {
            !(negated_delivery
                && matches!(status, OrderStatus::Delivered | OrderStatus::Completed))
        })
        .find(|(_, keywords)| keywords.iter().any(|keyword| lower.contains(keyword)))
        .map_or(StatusMapping::of(OrderStatus::Pending), |(status, _)| {
            StatusMapping::of(*status)
        })
}

/// Resolve a remote status to its canonical mapping.
///
/// Pure: the same catalog contents, code and text always give the same
/// result.
#[must_use]
pub fn map_status(
    catalog: &HashMap<String, StatusMapping>,
    code: Option<&str>,
    text: Option<&str>,
) -> StatusMapping {
    if let Some(mapping) = code
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .and_then(|code| catalog.get(code))
    {
        return *mapping;
    }
    classify_text(text.unwrap_or_default())
}
