//! Stored cart lines.

use ballerz_core::{CartLineId, LineItem};
use serde::Serialize;

/// A cart line persisted for a signed-in user.
///
/// Stored lines are addressed by their record id; guest lines are addressed
/// by their `(item, size)` key instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    pub id: CartLineId,
    #[serde(flatten)]
    pub item: LineItem,
}

impl CartLine {
    /// Pair form used by merge planning.
    #[must_use]
    pub fn to_pair(&self) -> (CartLineId, LineItem) {
        (self.id, self.item.clone())
    }
}
