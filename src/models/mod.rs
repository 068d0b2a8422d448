pub mod cart;
pub mod order;

pub use cart::{normalize_lines, ItemCategory, NormalizedLine, RawCartLine, UnknownCategoryPolicy};
pub use order::{OrderStatus, PaymentMethodGroup};
