use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Lifecycle of a physical card shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShipmentStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl ShipmentStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ShipmentStatus::Pending => "pending",
            ShipmentStatus::Processing => "processing",
            ShipmentStatus::Shipped => "shipped",
            ShipmentStatus::Delivered => "delivered",
            ShipmentStatus::Cancelled => "cancelled",
        }
    }

    /// Whether `self -> next` is an allowed move.
    #[must_use]
    pub fn can_transition_to(self, next: ShipmentStatus) -> bool {
        use ShipmentStatus::{Cancelled, Delivered, Pending, Processing, Shipped};
        matches!(
            (self, next),
            (Pending, Processing | Cancelled)
                | (Processing, Shipped | Cancelled)
                | (Shipped, Delivered)
        )
    }

    /// Validate a transition, including the tracking-number requirement for
    /// `shipped`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidShipmentTransition`] when the move is not
    /// allowed or `shipped` is requested without a tracking number.
    pub fn transition(
        self,
        next: ShipmentStatus,
        tracking_number: Option<&str>,
    ) -> Result<ShipmentStatus, CoreError> {
        if !self.can_transition_to(next) {
            return Err(CoreError::InvalidShipmentTransition {
                from: self.as_str(),
                to: next.as_str(),
                reason: "transition not allowed",
            });
        }

        let has_tracking = tracking_number.is_some_and(|t| !t.trim().is_empty());
        if next == ShipmentStatus::Shipped && !has_tracking {
            return Err(CoreError::InvalidShipmentTransition {
                from: self.as_str(),
                to: next.as_str(),
                reason: "tracking number is required",
            });
        }

        Ok(next)
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShipmentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ShipmentStatus::Pending),
            "processing" => Ok(ShipmentStatus::Processing),
            "shipped" => Ok(ShipmentStatus::Shipped),
            "delivered" => Ok(ShipmentStatus::Delivered),
            "cancelled" => Ok(ShipmentStatus::Cancelled),
            other => Err(CoreError::InvalidShipmentStatus(other.to_string())),
        }
    }
}

/// One requested line of a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentLine {
    pub card_id: i64,
    pub quantity: i32,
}

/// Merge duplicate card lines and reject empty or non-positive requests.
///
/// # Errors
///
/// Returns [`CoreError::Validation`] if there are no lines or any quantity
/// is not positive.
pub fn normalize_lines(lines: &[ShipmentLine]) -> Result<Vec<ShipmentLine>, CoreError> {
    if lines.is_empty() {
        return Err(CoreError::Validation(
            "shipment must contain at least one card".to_string(),
        ));
    }

    let mut merged: Vec<ShipmentLine> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity <= 0 {
            return Err(CoreError::Validation(format!(
                "quantity for card {} must be positive, got {}",
                line.card_id, line.quantity
            )));
        }
        match merged.iter_mut().find(|m| m.card_id == line.card_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(line.quantity).ok_or_else(
                    || CoreError::Validation(format!("quantity overflow for card {}", line.card_id)),
                )?;
            }
            None => merged.push(*line),
        }
    }

    merged.sort_by_key(|l| l.card_id);
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_path_is_allowed() {
        let s = ShipmentStatus::Pending
            .transition(ShipmentStatus::Processing, None)
            .unwrap();
        let s = s.transition(ShipmentStatus::Shipped, Some("JP123")).unwrap();
        let s = s.transition(ShipmentStatus::Delivered, None).unwrap();
        assert_eq!(s, ShipmentStatus::Delivered);
    }

    #[test]
    fn shipped_requires_tracking_number() {
        let err = ShipmentStatus::Processing
            .transition(ShipmentStatus::Shipped, Some("  "))
            .unwrap_err();
        assert!(err.to_string().contains("tracking number"), "got: {err}");
    }

    #[test]
    fn cannot_skip_or_reverse() {
        assert!(!ShipmentStatus::Pending.can_transition_to(ShipmentStatus::Shipped));
        assert!(!ShipmentStatus::Shipped.can_transition_to(ShipmentStatus::Pending));
        assert!(!ShipmentStatus::Delivered.can_transition_to(ShipmentStatus::Cancelled));
        assert!(!ShipmentStatus::Shipped.can_transition_to(ShipmentStatus::Cancelled));
    }

    #[test]
    fn cancel_allowed_before_shipping() {
        assert!(ShipmentStatus::Pending.can_transition_to(ShipmentStatus::Cancelled));
        assert!(ShipmentStatus::Processing.can_transition_to(ShipmentStatus::Cancelled));
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            ShipmentStatus::Pending,
            ShipmentStatus::Processing,
            ShipmentStatus::Shipped,
            ShipmentStatus::Delivered,
            ShipmentStatus::Cancelled,
        ] {
            assert_eq!(s.as_str().parse::<ShipmentStatus>().unwrap(), s);
        }
        assert!("lost".parse::<ShipmentStatus>().is_err());
    }

    #[test]
    fn normalize_merges_duplicates() {
        let lines = normalize_lines(&[
            ShipmentLine {
                card_id: 5,
                quantity: 1,
            },
            ShipmentLine {
                card_id: 2,
                quantity: 1,
            },
            ShipmentLine {
                card_id: 5,
                quantity: 2,
            },
        ])
        .unwrap();
        assert_eq!(
            lines,
            vec![
                ShipmentLine {
                    card_id: 2,
                    quantity: 1
                },
                ShipmentLine {
                    card_id: 5,
                    quantity: 3
                },
            ]
        );
    }

    #[test]
    fn normalize_rejects_empty_and_zero() {
        assert!(normalize_lines(&[]).is_err());
        assert!(normalize_lines(&[ShipmentLine {
            card_id: 1,
            quantity: 0
        }])
        .is_err());
    }
}
