//! Random rebalancing decisions.
//!
//! One decision per iteration: pick an item uniformly from the store pool,
//! bound the quantity by whichever side (store or own stock) holds more of
//! it, draw a quantity below that bound, and attach a fresh price.

use rand::Rng;

use crate::market::{Catalog, StockRequest};

/// A single stock adjustment chosen for one iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct RebalancePlan {
    /// Index of the item in the store catalog.
    pub index: usize,
    /// Item name.
    pub item: String,
    /// Store count at the index when the plan was made.
    pub store_count: u32,
    /// Own stock count at the index when the plan was made.
    pub own_count: u32,
    /// Quantity to move from the store to the stock.
    pub quantity: u32,
    /// New price, uniform in `[0, 1)`.
    pub price: f64,
}

impl RebalancePlan {
    /// Build the stock request for this plan.
    pub fn to_request(&self, uuid: &str) -> StockRequest {
        StockRequest {
            item: self.item.clone(),
            price: self.price,
            quantity: i64::from(self.quantity),
            uuid: uuid.to_string(),
        }
    }
}

/// Exclusive upper bound for the quantity drawn at one index.
///
/// Uses the store count when the store holds strictly more than the vendor,
/// otherwise the vendor's own count.
pub fn quantity_bound(store_count: u32, own_count: u32) -> u32 {
    if store_count > own_count {
        store_count
    } else {
        own_count
    }
}

/// Draw a quantity uniformly from `[0, bound)`; zero when the bound is zero.
pub fn draw_quantity<R: Rng + ?Sized>(bound: u32, rng: &mut R) -> u32 {
    if bound == 0 {
        0
    } else {
        rng.gen_range(0..bound)
    }
}

/// Plan one rebalance from the vendor's own catalog and its store pool.
///
/// Returns `None` when the store lists no items.
pub fn plan_rebalance<R: Rng + ?Sized>(
    own: &Catalog,
    store: &Catalog,
    rng: &mut R,
) -> Option<RebalancePlan> {
    if store.is_empty() {
        return None;
    }

    let index = rng.gen_range(0..store.len());
    let store_count = store.count(index);
    let own_count = own.count(index);
    let quantity = draw_quantity(quantity_bound(store_count, own_count), rng);
    let item = own.name(index).or_else(|| store.name(index))?.to_string();
    let price: f64 = rng.gen();

    Some(RebalancePlan {
        index,
        item,
        store_count,
        own_count,
        quantity,
        price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn catalog(names: &[&str], counts: &[u32]) -> Catalog {
        Catalog {
            names: names.iter().map(|s| s.to_string()).collect(),
            prices: vec![1.0; names.len()],
            counts: counts.to_vec(),
        }
    }

    #[test]
    fn bound_prefers_larger_side() {
        assert_eq!(quantity_bound(5, 3), 5);
        assert_eq!(quantity_bound(2, 7), 7);
        assert_eq!(quantity_bound(4, 4), 4);
        assert_eq!(quantity_bound(0, 0), 0);
    }

    #[test]
    fn zero_bound_draws_zero() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..10 {
            assert_eq!(draw_quantity(0, &mut rng), 0);
        }
    }

    #[test]
    fn quantities_stay_below_bound() {
        let own = catalog(&["apple", "banana"], &[3, 0]);
        let store = catalog(&["apple", "banana"], &[5, 2]);
        let mut rng = StdRng::seed_from_u64(42);

        let mut seen = [0u32; 2];
        for _ in 0..2000 {
            let plan = plan_rebalance(&own, &store, &mut rng).unwrap();
            seen[plan.index] += 1;
            match plan.index {
                0 => {
                    assert_eq!(plan.item, "apple");
                    assert!(plan.quantity < 5);
                }
                1 => {
                    assert_eq!(plan.item, "banana");
                    assert!(plan.quantity < 2);
                }
                _ => unreachable!(),
            }
            assert!((0.0..1.0).contains(&plan.price));
        }

        // Both indices drawn roughly evenly.
        assert!(seen[0] > 800 && seen[1] > 800, "skewed selection: {seen:?}");
    }

    #[test]
    fn larger_own_stock_sets_the_bound() {
        let own = catalog(&["u16"], &[7]);
        let store = catalog(&["u16"], &[2]);
        let mut rng = StdRng::seed_from_u64(99);

        let mut max_seen = 0;
        for _ in 0..500 {
            let plan = plan_rebalance(&own, &store, &mut rng).unwrap();
            assert_eq!(plan.index, 0);
            assert!(plan.quantity < 7, "quantity {} out of range", plan.quantity);
            max_seen = max_seen.max(plan.quantity);
        }
        assert!(max_seen >= 2, "bound fell back to the store count");
    }

    #[test]
    fn empty_store_yields_no_plan() {
        let own = catalog(&["apple"], &[3]);
        let store = Catalog::default();
        let mut rng = StdRng::seed_from_u64(7);
        assert!(plan_rebalance(&own, &store, &mut rng).is_none());
    }

    #[test]
    fn short_own_catalog_falls_back_to_store() {
        let own = Catalog::default();
        let store = catalog(&["u8"], &[4]);
        let mut rng = StdRng::seed_from_u64(3);

        let plan = plan_rebalance(&own, &store, &mut rng).unwrap();
        assert_eq!(plan.item, "u8");
        assert_eq!(plan.own_count, 0);
        assert!(plan.quantity < 4);

        let request = plan.to_request("abc-1");
        assert_eq!(request.uuid, "abc-1");
        assert_eq!(request.quantity, i64::from(plan.quantity));
    }
}
