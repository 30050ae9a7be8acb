use anyhow::Result;
use serde::{Serialize, Serializer};

/// Slot for a related entity or collection
///
/// Starts out `NotLoaded`. A lazy loader fills it on first access; an eager
/// query fills it while hydrating rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Relation<T> {
    NotLoaded,
    Loaded(T),
}

impl<T> Default for Relation<T> {
    fn default() -> Self {
        Relation::NotLoaded
    }
}

impl<T> Relation<T> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Relation::Loaded(_))
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Relation::Loaded(value) => Some(value),
            Relation::NotLoaded => None,
        }
    }

    /// Fill the slot with `init()` unless it is already loaded
    pub fn get_or_insert_with<F>(&mut self, init: F) -> &mut T
    where
        F: FnOnce() -> T,
    {
        if let Relation::NotLoaded = self {
            *self = Relation::Loaded(init());
        }
        match self {
            Relation::Loaded(value) => value,
            Relation::NotLoaded => unreachable!("slot was just filled"),
        }
    }

    /// Return the loaded value, running `load` first if needed
    ///
    /// A failed load leaves the slot `NotLoaded`.
    pub fn get_or_load<F>(&mut self, load: F) -> Result<&mut T>
    where
        F: FnOnce() -> Result<T>,
    {
        if let Relation::NotLoaded = self {
            *self = Relation::Loaded(load()?);
        }
        match self {
            Relation::Loaded(value) => Ok(value),
            Relation::NotLoaded => unreachable!("slot was just filled"),
        }
    }
}

// Not-loaded relations serialize as null
impl<T: Serialize> Serialize for Relation<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.get().serialize(serializer)
    }
}
