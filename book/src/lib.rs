//! In-memory limit order book
//!
//! Prices are discretized into integer tick indices; bid and ask volume
//! live in two flat level arrays so best-level maintenance is array
//! arithmetic, and each live order is reachable in O(1) through a
//! fixed-node chaining map keyed by order id.

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(missing_docs)]

use common::{Error, Result};
use maps::{FixedChainMap, Map};

/// Number of representable price levels.
pub const MAX_LEVELS: usize = 100_000;

/// Smallest price increment; one tick index per multiple.
pub const TICK_SIZE: f64 = 0.01;

/// One resting order.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Order {
    /// Unique order identifier.
    pub order_id: u64,
    /// Limit price.
    pub price: f64,
    /// Remaining quantity.
    pub quantity: i32,
    /// Buy side when true, sell side otherwise.
    pub is_buy: bool,
}

/// Limit order book with O(1) order access and amortized O(1) best-level
/// maintenance.
pub struct OrderBook {
    orders: FixedChainMap<u64, Order>,
    bid_levels: Box<[i64]>,
    ask_levels: Box<[i64]>,
    best_bid: Option<usize>,
    best_ask: Option<usize>,
}

impl OrderBook {
    /// Create an empty book able to hold `max_orders` live orders.
    pub fn new(buckets: usize, max_orders: usize) -> Self {
        Self {
            orders: FixedChainMap::with_node_capacity(buckets, max_orders),
            bid_levels: vec![0; MAX_LEVELS].into_boxed_slice(),
            ask_levels: vec![0; MAX_LEVELS].into_boxed_slice(),
            best_bid: None,
            best_ask: None,
        }
    }

    /// Map a price onto its tick index.
    fn tick_index(price: f64) -> Result<usize> {
        let index = (price / TICK_SIZE).round();
        if !(0.0..MAX_LEVELS as f64).contains(&index) {
            return Err(Error::InvalidArgument("price outside representable levels"));
        }
        Ok(index as usize)
    }

    /// Tick index back to its price.
    fn tick_price(index: usize) -> f64 {
        index as f64 * TICK_SIZE
    }

    /// Add a new order to the book.
    ///
    /// Fails `InvalidArgument` for a duplicate order id (accepting it
    /// would double-count the level volume) and `ResourceExhausted` when
    /// the order store is full.
    pub fn insert(&mut self, order: Order) -> Result<()> {
        let index = Self::tick_index(order.price)?;
        if self.orders.contains(&order.order_id) {
            return Err(Error::InvalidArgument("duplicate order id"));
        }
        self.orders.insert(order.order_id, order)?;
        self.apply_level_delta(order.is_buy, index, i64::from(order.quantity));
        Ok(())
    }

    /// Replace the remaining quantity of a live order.
    pub fn update(&mut self, order_id: u64, new_quantity: i32) -> Result<()> {
        let order = *self.orders.find(&order_id).ok_or(Error::NotFound)?;
        let delta = i64::from(new_quantity) - i64::from(order.quantity);
        self.apply_level_delta(order.is_buy, Self::tick_index(order.price)?, delta);
        self.orders
            .find_mut(&order_id)
            .ok_or(Error::NotFound)?
            .quantity = new_quantity;
        Ok(())
    }

    /// Remove a live order, returning it.
    pub fn cancel(&mut self, order_id: u64) -> Result<Order> {
        let order = *self.orders.find(&order_id).ok_or(Error::NotFound)?;
        self.apply_level_delta(
            order.is_buy,
            Self::tick_index(order.price)?,
            -i64::from(order.quantity),
        );
        self.orders.erase(&order_id);
        Ok(order)
    }

    /// Best bid as `(price, level volume)`, or `None` when the bid side
    /// is empty.
    pub fn best_bid(&self) -> Option<(f64, i64)> {
        self.best_bid
            .map(|index| (Self::tick_price(index), self.bid_levels[index]))
    }

    /// Best ask as `(price, level volume)`, or `None` when the ask side
    /// is empty.
    pub fn best_ask(&self) -> Option<(f64, i64)> {
        self.best_ask
            .map(|index| (Self::tick_price(index), self.ask_levels[index]))
    }

    /// Number of live orders.
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Level volume at an exact price, for inspection and tests.
    pub fn level_volume(&self, price: f64, is_buy: bool) -> Result<i64> {
        let index = Self::tick_index(price)?;
        Ok(if is_buy {
            self.bid_levels[index]
        } else {
            self.ask_levels[index]
        })
    }

    /// Top `count` occupied levels of one side, best first, as
    /// `(price, volume)` pairs.
    pub fn depth(&self, is_buy: bool, count: usize) -> Vec<(f64, i64)> {
        let mut levels = Vec::with_capacity(count);
        if is_buy {
            let Some(best) = self.best_bid else {
                return levels;
            };
            for index in (0..=best).rev() {
                if self.bid_levels[index] > 0 {
                    levels.push((Self::tick_price(index), self.bid_levels[index]));
                    if levels.len() == count {
                        break;
                    }
                }
            }
        } else {
            let Some(best) = self.best_ask else {
                return levels;
            };
            for index in best..MAX_LEVELS {
                if self.ask_levels[index] > 0 {
                    levels.push((Self::tick_price(index), self.ask_levels[index]));
                    if levels.len() == count {
                        break;
                    }
                }
            }
        }
        levels
    }

    /// Apply a volume delta and keep the best index honest: a level
    /// gaining volume may become the new best, and draining the best
    /// level scans away from it for the next occupied one (clearing the
    /// side when none remains).
    fn apply_level_delta(&mut self, is_buy: bool, index: usize, delta: i64) {
        if is_buy {
            self.bid_levels[index] += delta;
            if self.bid_levels[index] > 0 {
                match self.best_bid {
                    Some(best) if index <= best => {}
                    _ => self.best_bid = Some(index),
                }
            } else if self.best_bid == Some(index) {
                self.best_bid = (0..index).rev().find(|&i| self.bid_levels[i] > 0);
            }
        } else {
            self.ask_levels[index] += delta;
            if self.ask_levels[index] > 0 {
                match self.best_ask {
                    Some(best) if index >= best => {}
                    _ => self.best_ask = Some(index),
                }
            } else if self.best_ask == Some(index) {
                self.best_ask = (index + 1..MAX_LEVELS).find(|&i| self.ask_levels[i] > 0);
            }
        }
    }
}
