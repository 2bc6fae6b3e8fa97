use crate::{Error, HlsResult};
use std::collections::BTreeMap;

/// Merges two values that were enqueued under the same key.
pub type Resolver<V> = Box<dyn Fn(V, V) -> V>;

/// A min-priority queue with one entry per key. Enqueueing under a key that is
/// already present combines both values with the configured [Resolver].
pub struct PriorityQueue<V> {
    entries: BTreeMap<i64, V>,
    resolve: Option<Resolver<V>>,
}

impl<V> Default for PriorityQueue<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            resolve: None,
        }
    }
}

impl<V> PriorityQueue<V> {
    /// A queue without a resolver. Any key collision is an error.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolver<F>(resolve: F) -> Self
    where
        F: Fn(V, V) -> V + 'static,
    {
        Self {
            entries: BTreeMap::new(),
            resolve: Some(Box::new(resolve)),
        }
    }

    pub fn set_resolver<F>(&mut self, resolve: F)
    where
        F: Fn(V, V) -> V + 'static,
    {
        self.resolve = Some(Box::new(resolve));
    }

    pub fn enqueue(&mut self, key: i64, value: V) -> HlsResult<()> {
        let value = match self.entries.remove(&key) {
            None => value,
            Some(existing) => match &self.resolve {
                Some(resolve) => resolve(existing, value),
                None => {
                    self.entries.insert(key, existing);
                    return Err(Error::NoResolver);
                }
            },
        };
        self.entries.insert(key, value);
        Ok(())
    }

    /// Removes the entry with the lowest key.
    pub fn dequeue(&mut self) -> HlsResult<(i64, V)> {
        self.entries.pop_first().ok_or(Error::EmptyQueue)
    }

    pub fn peek(&self) -> HlsResult<(i64, &V)> {
        self.entries
            .first_key_value()
            .map(|(k, v)| (*k, v))
            .ok_or(Error::EmptyQueue)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    #[test]
    fn colliding_keys_are_resolved() {
        let mut pq = PriorityQueue::with_resolver(|a: i32, b: i32| a + b);
        pq.enqueue(5, 10).unwrap();
        pq.enqueue(5, 3).unwrap();
        assert_eq!(pq.len(), 1);
        assert_eq!(pq.dequeue().unwrap(), (5, 13));
        assert!(pq.is_empty());
    }

    #[test]
    fn missing_resolver_fails_fast() {
        let mut pq = PriorityQueue::new();
        pq.enqueue(1, "a").unwrap();
        assert!(matches!(pq.enqueue(1, "b"), Err(Error::NoResolver)));
        assert_eq!(pq.peek().unwrap(), (1, &"a"));
        pq.set_resolver(|_, newer| newer);
        pq.enqueue(1, "b").unwrap();
        assert_eq!(pq.dequeue().unwrap(), (1, "b"));
    }

    #[test]
    fn empty_queue() {
        let mut pq: PriorityQueue<()> = PriorityQueue::new();
        assert!(matches!(pq.dequeue(), Err(Error::EmptyQueue)));
        assert!(matches!(pq.peek(), Err(Error::EmptyQueue)));
    }

    #[test]
    fn ready_sets_merge() {
        let mut pq = PriorityQueue::with_resolver(
            |mut a: BTreeSet<u32>, b: BTreeSet<u32>| {
                a.extend(b);
                a
            },
        );
        pq.enqueue(-2, BTreeSet::from([1])).unwrap();
        pq.enqueue(0, BTreeSet::from([4])).unwrap();
        pq.enqueue(-2, BTreeSet::from([3, 1])).unwrap();
        let (key, ready) = pq.dequeue().unwrap();
        assert_eq!(key, -2);
        assert_eq!(ready.into_iter().collect::<Vec<_>>(), vec![1, 3]);
    }

    proptest! {
        #[test]
        fn dequeued_keys_never_decrease(
            ops in prop::collection::vec((any::<bool>(), -20i64..20), 0..100)
        ) {
            let mut pq = PriorityQueue::with_resolver(|a: i64, b: i64| a.max(b));
            let mut last = i64::MIN;
            for (push, key) in ops {
                if push {
                    pq.enqueue(key, key).unwrap();
                    if key < last {
                        last = i64::MIN;
                    }
                } else if let Ok((k, _)) = pq.dequeue() {
                    prop_assert!(k >= last);
                    last = k;
                }
            }
            while let Ok((k, _)) = pq.dequeue() {
                prop_assert!(k >= last);
                last = k;
            }
        }
    }
}
