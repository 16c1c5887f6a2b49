//! Change notifications for signed-in carts.
//!
//! Every write to a stored cart publishes the owner's email. Open
//! `/api/cart/events` streams filter for their own owner and re-read the
//! cart, so every tab of the same account stays in sync.

use tokio::sync::broadcast;

use ballerz_core::Email;

/// Buffered notifications before slow subscribers start lagging.
const CHANNEL_CAPACITY: usize = 256;

/// A stored cart changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartChange {
    pub owner: Email,
}

/// Broadcast hub for [`CartChange`]s.
#[derive(Clone)]
pub struct CartEvents {
    tx: broadcast::Sender<CartChange>,
}

impl CartEvents {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Announce that `owner`'s cart changed.
    ///
    /// Having no subscribers is not an error.
    pub fn publish(&self, owner: &Email) {
        let receivers = self
            .tx
            .send(CartChange {
                owner: owner.clone(),
            })
            .unwrap_or(0);
        tracing::trace!(receivers, "Published cart change");
    }

    /// Start receiving changes published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CartChange> {
        self.tx.subscribe()
    }
}

impl Default for CartEvents {
    fn default() -> Self {
        Self::new()
    }
}
