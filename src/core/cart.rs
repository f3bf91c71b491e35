//! Cart partitions: ordered lines, one per product, merged by summing quantities.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    core::{
        partition::{MergeOutcome, PartitionKind},
        store::{PartitionedStore, StoreError},
    },
    line::{CartLine, CartLineDraft},
    op::Op,
};

/// Marker for the cart instantiation of [`PartitionedStore`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Cart;

/// Store holding one cart per user.
pub type CartStore = PartitionedStore<Cart>;

/// One user's cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartPartition {
    lines: Vec<CartLine>,
}

impl CartPartition {
    /// Lines in insertion order.
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Line for `product_id`, if present.
    pub fn get(&self, product_id: &str) -> Option<&CartLine> {
        self.lines.iter().find(|line| line.product_id == product_id)
    }

    /// Sum of `unit_price * quantity`, saturating at [`Decimal::MAX`].
    ///
    /// Lines are only added when the total still fits, so saturation is
    /// reachable only through a merge.
    pub fn total(&self) -> Decimal {
        self.checked_total().unwrap_or(Decimal::MAX)
    }

    /// Sum of `unit_price * quantity`, or `None` if it overflows.
    pub fn checked_total(&self) -> Option<Decimal> {
        checked_sum(self.lines.iter())
    }

    /// Sum of quantities.
    pub fn count(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }

    /// True when the cart holds no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total after `product_id`'s line is set to `quantity` units at
    /// `unit_price`, or `None` if that overflows.
    fn checked_total_with(&self, product_id: &str, unit_price: Decimal, quantity: u32) -> Option<Decimal> {
        let changed = unit_price.checked_mul(Decimal::from(quantity))?;
        let rest = checked_sum(self.lines.iter().filter(|line| line.product_id != product_id))?;
        rest.checked_add(changed)
    }

    /// Whether [`absorb`](Self::absorb) can take `line` without the
    /// quantity or the total overflowing.
    fn accepts(&self, line: &CartLine) -> bool {
        let (unit_price, quantity) = match self.get(&line.product_id) {
            Some(existing) => (existing.unit_price, existing.quantity.checked_add(line.quantity)),
            None => (line.unit_price, Some(line.quantity)),
        };
        quantity
            .and_then(|quantity| self.checked_total_with(&line.product_id, unit_price, quantity))
            .is_some()
    }

    fn get_mut(&mut self, product_id: &str) -> Option<&mut CartLine> {
        self.lines.iter_mut().find(|line| line.product_id == product_id)
    }

    /// Adds `line`, summing into an existing line for the same product.
    /// Returns true when the product was already present.
    fn absorb(&mut self, line: CartLine) -> bool {
        match self.get_mut(&line.product_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(line.quantity);
                true
            }
            None => {
                self.lines.push(line);
                false
            }
        }
    }
}

fn checked_sum<'a>(mut lines: impl Iterator<Item = &'a CartLine>) -> Option<Decimal> {
    lines.try_fold(Decimal::ZERO, |acc, line| acc.checked_add(line.checked_line_total()?))
}

/// Permissive shape for persisted lines; accepts the flat layout's field names.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LooseLine {
    #[serde(alias = "id")]
    product_id: String,
    #[serde(default)]
    title: String,
    #[serde(alias = "price")]
    unit_price: Decimal,
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    quantity: Option<i64>,
}

impl LooseLine {
    fn into_line(self) -> Option<CartLine> {
        if self.product_id.is_empty() || self.unit_price < Decimal::ZERO {
            return None;
        }
        let quantity = match self.quantity {
            Some(q) if q >= 1 => u32::try_from(q).unwrap_or(u32::MAX),
            _ => 1,
        };
        Some(CartLine {
            product_id: self.product_id,
            title: self.title,
            unit_price: self.unit_price,
            images: self.images,
            quantity,
        })
    }
}

impl PartitionKind for Cart {
    type Partition = CartPartition;

    const NAME: &'static str = "cart";
    const LEGACY_FIELD: &'static str = "items";

    fn len(partition: &CartPartition) -> usize {
        partition.lines.len()
    }

    fn merge(into: &mut CartPartition, from: CartPartition) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        for line in from.lines {
            outcome.moved += 1;
            if into.absorb(line) {
                outcome.conflicts += 1;
            }
        }
        outcome
    }

    fn decode_lenient(value: &serde_json::Value) -> CartPartition {
        let Some(items) = value.as_array() else {
            if !value.is_null() {
                warn!(kind = Self::NAME, "partition is not an array; treating as empty");
            }
            return CartPartition::default();
        };

        let mut partition = CartPartition::default();
        for (idx, item) in items.iter().enumerate() {
            let Some(line) = LooseLine::deserialize(item).ok().and_then(LooseLine::into_line) else {
                warn!(kind = Self::NAME, index = idx, "dropping unreadable cart line");
                continue;
            };
            if !partition.accepts(&line) {
                warn!(kind = Self::NAME, index = idx, product_id = %line.product_id, "dropping cart line whose total overflows");
                continue;
            }
            partition.absorb(line);
        }
        partition
    }
}

impl PartitionedStore<Cart> {
    /// Adds a product to the active cart, or increments its quantity if present.
    /// Returns the line's resulting quantity.
    pub fn upsert_line(&mut self, draft: CartLineDraft) -> Result<u32, StoreError> {
        if draft.unit_price < Decimal::ZERO {
            return Err(StoreError::NegativePrice(draft.unit_price));
        }

        let added = draft.units();
        let line = draft.into_line();
        if !self.active_partition().accepts(&line) {
            return Err(StoreError::AmountOverflow(line.product_id));
        }

        let user = self.active_user().clone();
        let product_id = line.product_id.clone();
        let partition = self.active_partition_mut();
        partition.absorb(line);
        let quantity = partition.get(&product_id).map_or(added, |line| line.quantity);

        self.record(Op::LineUpserted {
            user,
            product_id,
            added,
            quantity,
        });
        Ok(quantity)
    }

    /// Deletes the line for `product_id`. Returns false if there was none.
    pub fn remove_line(&mut self, product_id: &str) -> bool {
        let Some(partition) = self.existing_active_partition_mut() else {
            return false;
        };
        let Some(pos) = partition.lines.iter().position(|l| l.product_id == product_id) else {
            return false;
        };
        partition.lines.remove(pos);

        let user = self.active_user().clone();
        self.record(Op::LineRemoved {
            user,
            product_id: product_id.to_string(),
        });
        true
    }

    /// Overwrites a line's quantity.
    ///
    /// Quantities below 1, and quantities that would overflow the cart total,
    /// are rejected and leave the line unchanged. Returns `Ok(false)` when the
    /// product is not in the cart or already has that quantity.
    pub fn set_quantity(&mut self, product_id: &str, quantity: u32) -> Result<bool, StoreError> {
        if quantity < 1 {
            return Err(StoreError::InvalidQuantity(quantity));
        }
        let partition = self.active_partition();
        let overflows = partition.get(product_id).is_some_and(|line| {
            partition
                .checked_total_with(product_id, line.unit_price, quantity)
                .is_none()
        });
        if overflows {
            return Err(StoreError::AmountOverflow(product_id.to_string()));
        }
        let Some(line) = self
            .existing_active_partition_mut()
            .and_then(|p| p.get_mut(product_id))
        else {
            return Ok(false);
        };
        if line.quantity == quantity {
            return Ok(false);
        }
        let prev = std::mem::replace(&mut line.quantity, quantity);

        let user = self.active_user().clone();
        self.record(Op::QuantitySet {
            user,
            product_id: product_id.to_string(),
            prev,
            quantity,
        });
        Ok(true)
    }

    /// Lines of the active cart.
    pub fn lines(&self) -> &[CartLine] {
        self.active_partition().lines()
    }

    /// Total of the active cart, saturating at [`Decimal::MAX`].
    pub fn total(&self) -> Decimal {
        self.active_partition().total()
    }

    /// Units in the active cart.
    pub fn count(&self) -> u64 {
        self.active_partition().count()
    }
}
