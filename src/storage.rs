use std::marker::PhantomData;

/// Append-only slot storage.
///
/// Every value gets its own slot; dropping a value leaves an empty slot behind
/// that is never handed out again. Handles of type `K` are converted from and
/// to slot indices.
#[derive(Debug, Clone)]
pub struct Arena<K, T> {
    data: Vec<Option<T>>,
    /// Number of occupied slots.
    real_size: usize,
    _key: PhantomData<K>,
}

impl<K, T> Default for Arena<K, T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            real_size: 0,
            _key: PhantomData,
        }
    }
}

impl<K, T> Arena<K, T>
where
    K: Copy + From<usize> + Into<usize>,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of slots, occupied or not.
    pub fn size(&self) -> usize {
        self.data.len()
    }
    /// Number of occupied slots.
    pub fn real_size(&self) -> usize {
        self.real_size
    }

    pub fn is_occupied(&self, key: K) -> bool {
        matches!(self.data.get(key.into()), Some(Some(_)))
    }

    pub fn add(&mut self, value: T) -> K {
        let index = self.data.len();
        self.data.push(Some(value));
        self.real_size += 1;
        K::from(index)
    }

    pub fn get(&self, key: K) -> Option<&T> {
        self.data.get(key.into()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        self.data.get_mut(key.into()).and_then(Option::as_mut)
    }

    /// Removes the value at `key`, returning it if the slot was occupied.
    pub fn drop(&mut self, key: K) -> Option<T> {
        let value = self.data.get_mut(key.into()).and_then(Option::take);
        if value.is_some() {
            self.real_size -= 1;
        }
        value
    }

    /// Iterates over occupied slots.
    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> {
        self.data
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (K::from(i), v)))
    }

    /// Keys of all occupied slots.
    pub fn keys(&self) -> Vec<K> {
        self.iter().map(|(k, _)| k).collect()
    }
}
