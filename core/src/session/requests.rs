//! Query request keys, result caching and staleness checks.
//!
//! A view issues a request keyed by (shape, filter, dataset generation),
//! remembers the ticket, and only applies the result if no newer request was
//! issued in the meantime. Results that arrive out of order are dropped.

use hashbrown::HashMap;

use marketlens_types::{Dimension, FilterSelection};

/// What a request computes, independent of the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryShape {
    Kpis,
    Trend,
    Ranking { dimension: Dimension, limit: usize },
    Breakdown { dimension: Dimension },
    Preview { limit: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub shape: QueryShape,
    pub filter: FilterSelection,
    /// Dataset generation the request was issued against
    pub generation: u64,
}

impl RequestKey {
    pub fn new(shape: QueryShape, filter: &FilterSelection, generation: u64) -> Self {
        Self {
            shape,
            filter: filter.clone(),
            generation,
        }
    }
}

/// Proof of issue for one request against a [`ViewSlot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    seq: u64,
    key: RequestKey,
}

impl Ticket {
    pub fn key(&self) -> &RequestKey {
        &self.key
    }
}

/// Latest applied value of one view, guarded against stale completions.
#[derive(Debug)]
pub struct ViewSlot<T> {
    issued: u64,
    value: Option<(RequestKey, T)>,
}

impl<T> Default for ViewSlot<T> {
    fn default() -> Self {
        Self {
            issued: 0,
            value: None,
        }
    }
}

impl<T> ViewSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new request; any ticket issued before becomes stale.
    pub fn begin(&mut self, key: RequestKey) -> Ticket {
        self.issued += 1;
        Ticket {
            seq: self.issued,
            key,
        }
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        ticket.seq == self.issued
    }

    /// Apply a result if its ticket is still the latest. Returns whether it was applied.
    pub fn complete(&mut self, ticket: Ticket, value: T) -> bool {
        if !self.is_current(&ticket) {
            tracing::debug!(
                shape = ?ticket.key.shape,
                seq = ticket.seq,
                latest = self.issued,
                "discarding stale result"
            );
            return false;
        }
        self.value = Some((ticket.key, value));
        true
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref().map(|(_, v)| v)
    }

    /// Key of the request that produced the current value
    pub fn key(&self) -> Option<&RequestKey> {
        self.value.as_ref().map(|(k, _)| k)
    }

    pub fn clear(&mut self) {
        self.value = None;
    }
}

/// Results by request key. Entries for older dataset generations are never
/// valid again and are purged when the generation moves on.
#[derive(Debug)]
pub struct QueryCache<T> {
    generation: u64,
    entries: HashMap<RequestKey, T>,
}

impl<T> Default for QueryCache<T> {
    fn default() -> Self {
        Self {
            generation: 0,
            entries: HashMap::new(),
        }
    }
}

impl<T: Clone> QueryCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &RequestKey) -> Option<T> {
        self.entries.get(key).cloned()
    }

    pub fn insert(&mut self, key: RequestKey, value: T) {
        if key.generation < self.generation {
            return;
        }
        if key.generation > self.generation {
            self.retain_generation(key.generation);
        }
        self.entries.insert(key, value);
    }

    /// Drop every entry not belonging to `generation`.
    pub fn retain_generation(&mut self, generation: u64) {
        self.generation = generation;
        self.entries.retain(|k, _| k.generation == generation);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
