use std::cmp::Ordering;

use super::GenericKey;

/// Three-way key comparison used for every search inside tree pages.
pub trait KeyComparator<K>: Send + Sync {
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

/// Natural `Ord` ordering.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrdComparator;

impl<K: Ord> KeyComparator<K> for OrdComparator {
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

/// Orders generic keys by their signed integer value.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerComparator;

impl<const N: usize> KeyComparator<GenericKey<N>> for IntegerComparator {
    fn compare(&self, a: &GenericKey<N>, b: &GenericKey<N>) -> Ordering {
        a.to_integer().cmp(&b.to_integer())
    }
}

/// Orders generic keys lexicographically by their raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytewiseComparator;

impl<const N: usize> KeyComparator<GenericKey<N>> for BytewiseComparator {
    fn compare(&self, a: &GenericKey<N>, b: &GenericKey<N>) -> Ordering {
        a.as_bytes().cmp(b.as_bytes())
    }
}

impl<K, F> KeyComparator<K> for F
where
    F: Fn(&K, &K) -> Ordering + Send + Sync,
{
    fn compare(&self, a: &K, b: &K) -> Ordering {
        self(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::FromInteger;

    #[test]
    fn test_integer_vs_bytewise() {
        let neg = GenericKey::<8>::from_integer(-1);
        let one = GenericKey::<8>::from_integer(1);

        assert_eq!(IntegerComparator.compare(&neg, &one), Ordering::Less);
        // 0xff.. sorts after 0x01.. bytewise
        assert_eq!(BytewiseComparator.compare(&neg, &one), Ordering::Greater);
    }

    #[test]
    fn test_closure_comparator() {
        let reverse = |a: &i32, b: &i32| b.cmp(a);
        assert_eq!(reverse.compare(&1, &2), Ordering::Greater);
        assert_eq!(OrdComparator.compare(&1, &2), Ordering::Less);
    }
}
