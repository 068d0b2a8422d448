use serde::{Deserialize, Serialize};

/// Order status lifecycle. The initial state is fixed at creation time by
/// the payment method; later transitions are unconditional overwrites
/// issued by staff tooling (any status may follow any other).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Seated,
    Done,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Seated => "seated",
            OrderStatus::Done => "done",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "pending" => Some(OrderStatus::Pending),
            "paid" => Some(OrderStatus::Paid),
            "seated" => Some(OrderStatus::Seated),
            "done" => Some(OrderStatus::Done),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    /// Initial status for a freshly created order: immediate-settlement
    /// methods are paid up front, everything else starts pending.
    pub fn initial_for(method: Option<PaymentMethodGroup>) -> Self {
        match method {
            Some(group) if group.is_immediate() => OrderStatus::Paid,
            _ => OrderStatus::Pending,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synonym groups for payment method input. Customers and staff type these
/// in Thai or English with arbitrary casing; each group collapses to one
/// canonical key matched against the database's accepted enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethodGroup {
    Cash,
    Card,
    Transfer,
    Qr,
    PromptPay,
}

impl PaymentMethodGroup {
    pub const ALL: [PaymentMethodGroup; 5] = [
        PaymentMethodGroup::Cash,
        PaymentMethodGroup::Card,
        PaymentMethodGroup::Transfer,
        PaymentMethodGroup::Qr,
        PaymentMethodGroup::PromptPay,
    ];

    /// Canonical group key, matched first against the enum column.
    pub fn key(&self) -> &'static str {
        match self {
            PaymentMethodGroup::Cash => "cash",
            PaymentMethodGroup::Card => "card",
            PaymentMethodGroup::Transfer => "transfer",
            PaymentMethodGroup::Qr => "qr",
            PaymentMethodGroup::PromptPay => "promptpay",
        }
    }

    /// Accepted aliases, lower-cased. Thai spellings come from the
    /// production UI.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            PaymentMethodGroup::Cash => &["cash", "เงินสด"],
            PaymentMethodGroup::Card => &["card", "credit", "บัตร", "บัตรเครดิต"],
            PaymentMethodGroup::Transfer => {
                &["transfer", "โอน", "โอนเงิน", "bank", "bank transfer"]
            }
            PaymentMethodGroup::Qr => &["qr", "qr code", "คิวอาร์", "คิวอาร์โค้ด"],
            PaymentMethodGroup::PromptPay => &["promptpay", "พร้อมเพย์", "pp"],
        }
    }

    /// Maps free-text input to its synonym group, if any.
    pub fn classify(raw: &str) -> Option<Self> {
        let val = raw.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|group| group.aliases().iter().any(|alias| *alias == val))
    }

    /// Cash and card settle at order time; transfers and wallet payments
    /// leave the order pending until confirmed.
    pub fn is_immediate(&self) -> bool {
        matches!(self, PaymentMethodGroup::Cash | PaymentMethodGroup::Card)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cash_and_card_settle_immediately() {
        assert_eq!(
            OrderStatus::initial_for(Some(PaymentMethodGroup::Cash)),
            OrderStatus::Paid
        );
        assert_eq!(
            OrderStatus::initial_for(Some(PaymentMethodGroup::Card)),
            OrderStatus::Paid
        );
        assert_eq!(
            OrderStatus::initial_for(Some(PaymentMethodGroup::Transfer)),
            OrderStatus::Pending
        );
        assert_eq!(OrderStatus::initial_for(None), OrderStatus::Pending);
    }

    #[test]
    fn classify_accepts_thai_aliases() {
        assert_eq!(
            PaymentMethodGroup::classify("เงินสด"),
            Some(PaymentMethodGroup::Cash)
        );
        assert_eq!(
            PaymentMethodGroup::classify("  Bank Transfer "),
            Some(PaymentMethodGroup::Transfer)
        );
        assert_eq!(
            PaymentMethodGroup::classify("PP"),
            Some(PaymentMethodGroup::PromptPay)
        );
        assert_eq!(PaymentMethodGroup::classify("crypto"), None);
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Seated,
            OrderStatus::Done,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("shipped"), None);
    }
}
