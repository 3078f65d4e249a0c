//! Book mirror.
//!
//! The wire protocol sends an initial book snapshot followed by single-level
//! updates `[price, count, amount]`, where `count == 0` removes the level and
//! the sign of `amount` selects the side (positive = bid, negative = ask).
//! The mirror maintains the current book so the transport can hand the
//! normalizer a full `{asks, bids}` view on every update.
//!
//! - Bids are sorted **descending** by price (best bid first).
//! - Asks are sorted **ascending** by price (best ask first).

/// Tolerance for floating-point price comparison.
const PRICE_EPS: f64 = 1e-10;

/// One mirrored level, kept in raw wire form.
type RawLevel = (f64, i64, f64);

/// Current book for one subscription, trimmed to the subscribed depth.
pub struct BookMirror {
    bids: Vec<RawLevel>,
    asks: Vec<RawLevel>,
    max_levels: usize,
}

impl BookMirror {
    pub fn new(max_levels: usize) -> Self {
        Self {
            bids: Vec::with_capacity(max_levels),
            asks: Vec::with_capacity(max_levels),
            max_levels,
        }
    }

    /// Drop all levels (a fresh snapshot is about to arrive).
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }

    /// Apply one `[price, count, amount]` level.
    ///
    /// `count == 0` removes the level at `price`; the sign of `amount` says
    /// which side it was on. Otherwise the level is inserted or updated at
    /// its sorted position, and the worst level is trimmed once the side
    /// exceeds the subscribed depth.
    pub fn apply(&mut self, price: f64, count: i64, amount: f64) {
        if count <= 0 {
            let side = if amount >= 0.0 { &mut self.bids } else { &mut self.asks };
            if let Some(idx) = side.iter().position(|l| (l.0 - price).abs() < PRICE_EPS) {
                side.remove(idx);
            }
            return;
        }

        if amount > 0.0 {
            upsert(&mut self.bids, price, count, amount, self.max_levels, |a, b| a > b);
        } else {
            upsert(&mut self.asks, price, count, amount, self.max_levels, |a, b| a < b);
        }
    }

    /// Replace the book with snapshot levels.
    pub fn apply_snapshot(&mut self, levels: &[RawLevel]) {
        self.clear();
        for &(price, count, amount) in levels {
            self.apply(price, count, amount);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Full current view as the raw payload shape the normalizer expects:
    /// `{"asks": [[price, count, amount], …], "bids": …}`.
    pub fn view(&self) -> serde_json::Value {
        let render = |levels: &[RawLevel]| -> Vec<serde_json::Value> {
            levels
                .iter()
                .map(|&(p, c, a)| serde_json::json!([p, c, a]))
                .collect()
        };
        serde_json::json!({ "asks": render(&self.asks), "bids": render(&self.bids) })
    }
}

/// Insert or update a level on one side, keeping the side sorted best-first
/// per `better(candidate, existing)` and trimmed to `max_levels`.
fn upsert(
    levels: &mut Vec<RawLevel>,
    price: f64,
    count: i64,
    amount: f64,
    max_levels: usize,
    better: fn(f64, f64) -> bool,
) {
    if let Some(idx) = levels.iter().position(|l| (l.0 - price).abs() < PRICE_EPS) {
        levels[idx] = (price, count, amount);
        return;
    }
    let pos = levels.iter().position(|l| better(price, l.0)).unwrap_or(levels.len());
    levels.insert(pos, (price, count, amount));
    if levels.len() > max_levels {
        levels.pop(); // worst level falls off
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_sorts_both_sides() {
        let mut book = BookMirror::new(25);
        book.apply_snapshot(&[
            (99.0, 2, 1.0),
            (100.0, 1, 2.0),
            (101.0, 1, -1.0),
            (102.0, 3, -2.0),
        ]);
        let view = book.view();
        assert_eq!(view["bids"][0][0], 100.0);
        assert_eq!(view["bids"][1][0], 99.0);
        assert_eq!(view["asks"][0][0], 101.0);
        assert_eq!(view["asks"][1][0], 102.0);
    }

    #[test]
    fn update_replaces_and_inserts() {
        let mut book = BookMirror::new(25);
        book.apply_snapshot(&[(100.0, 1, 1.0), (99.0, 1, 2.0)]);
        book.apply(100.0, 2, 5.0);
        book.apply(100.5, 1, 3.0);
        let view = book.view();
        assert_eq!(view["bids"][0][0], 100.5);
        assert_eq!(view["bids"][1][2], 5.0);
        assert_eq!(view["bids"][1][1], 2);
    }

    #[test]
    fn zero_count_removes_by_side() {
        let mut book = BookMirror::new(25);
        book.apply_snapshot(&[(100.0, 1, 1.0), (101.0, 1, -1.0)]);
        book.apply(100.0, 0, 1.0);
        book.apply(101.0, 0, -1.0);
        assert!(book.is_empty());
    }

    #[test]
    fn depth_is_trimmed_to_subscribed_length() {
        let mut book = BookMirror::new(2);
        book.apply_snapshot(&[(100.0, 1, 1.0), (99.0, 1, 1.0), (98.0, 1, 1.0)]);
        let view = book.view();
        assert_eq!(view["bids"].as_array().unwrap().len(), 2);
        assert_eq!(view["bids"][1][0], 99.0);
    }
}
