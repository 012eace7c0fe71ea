//! Per (consumer, format) cache of interface instances.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use super::ConsumerId;
#[cfg(feature = "compress")]
use crate::format::OutArchiveFormat;
use crate::format::{ArchiveFormat, InArchiveFormat};
#[cfg(feature = "compress")]
use crate::native::OutArchive;
use crate::native::{InArchive, NativeObject};

/// consumer -> (format -> instance, absent until first requested).
#[derive(Debug)]
pub(crate) struct FormatMap<F, I> {
    consumers: HashMap<ConsumerId, HashMap<F, Option<I>>>,
}

impl<F, I> Default for FormatMap<F, I> {
    fn default() -> Self {
        Self {
            consumers: HashMap::new(),
        }
    }
}

impl<F: Copy + Eq + Hash, I> FormatMap<F, I> {
    fn contains(&self, consumer: ConsumerId, format: F) -> bool {
        self.consumers
            .get(&consumer)
            .is_some_and(|formats| formats.contains_key(&format))
    }

    /// Adds an empty entry. Returns false if the key already existed.
    fn insert(&mut self, consumer: ConsumerId, format: F) -> bool {
        let formats = self.consumers.entry(consumer).or_default();
        if formats.contains_key(&format) {
            return false;
        }
        formats.insert(format, None);
        true
    }

    /// Removes the key, pruning the consumer once it has no formats left.
    fn remove(&mut self, consumer: ConsumerId, format: F) -> Option<Option<I>> {
        let formats = self.consumers.get_mut(&consumer)?;
        let slot = formats.remove(&format)?;
        if formats.is_empty() {
            self.consumers.remove(&consumer);
        }
        Some(slot)
    }

    /// The instance slot for a registered key.
    pub(crate) fn slot_mut(&mut self, consumer: ConsumerId, format: F) -> Option<&mut Option<I>> {
        self.consumers.get_mut(&consumer)?.get_mut(&format)
    }

    fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    fn len(&self) -> usize {
        self.consumers.values().map(HashMap::len).sum()
    }

    fn drain(&mut self) -> impl Iterator<Item = I> + '_ {
        self.consumers
            .drain()
            .flat_map(|(_, formats)| formats.into_values().flatten())
    }
}

/// Input and output registries plus the shared reference counter.
#[derive(Default)]
pub(crate) struct InterfaceRegistry {
    pub(crate) inputs: FormatMap<InArchiveFormat, Arc<dyn InArchive>>,
    #[cfg(feature = "compress")]
    pub(crate) outputs: FormatMap<OutArchiveFormat, Arc<dyn OutArchive>>,
    references: usize,
}

impl InterfaceRegistry {
    pub(crate) fn contains(&self, consumer: ConsumerId, format: ArchiveFormat) -> bool {
        match format {
            ArchiveFormat::In(f) => self.inputs.contains(consumer, f),
            #[cfg(feature = "compress")]
            ArchiveFormat::Out(f) => self.outputs.contains(consumer, f),
        }
    }

    /// Registers a key. Each new key counts exactly once.
    pub(crate) fn register(&mut self, consumer: ConsumerId, format: ArchiveFormat) -> bool {
        let inserted = match format {
            ArchiveFormat::In(f) => self.inputs.insert(consumer, f),
            #[cfg(feature = "compress")]
            ArchiveFormat::Out(f) => self.outputs.insert(consumer, f),
        };
        if inserted {
            self.references += 1;
        }
        inserted
    }

    /// Removes a key. The outer `None` means the key was not registered.
    pub(crate) fn unregister(
        &mut self,
        consumer: ConsumerId,
        format: ArchiveFormat,
    ) -> Option<Option<NativeObject>> {
        let removed = match format {
            ArchiveFormat::In(f) => self
                .inputs
                .remove(consumer, f)
                .map(|slot| slot.map(NativeObject::In)),
            #[cfg(feature = "compress")]
            ArchiveFormat::Out(f) => self
                .outputs
                .remove(consumer, f)
                .map(|slot| slot.map(NativeObject::Out)),
        };
        if removed.is_some() {
            self.references = self.references.saturating_sub(1);
        }
        removed
    }

    pub(crate) fn is_empty(&self) -> bool {
        #[cfg(feature = "compress")]
        let outputs_empty = self.outputs.is_empty();
        #[cfg(not(feature = "compress"))]
        let outputs_empty = true;
        self.inputs.is_empty() && outputs_empty
    }

    pub(crate) fn references(&self) -> usize {
        self.references
    }

    /// Number of registered keys across both maps.
    pub(crate) fn len(&self) -> usize {
        #[cfg(feature = "compress")]
        let outputs = self.outputs.len();
        #[cfg(not(feature = "compress"))]
        let outputs = 0;
        self.inputs.len() + outputs
    }

    /// Empties both maps and returns every created instance.
    pub(crate) fn drain(&mut self) -> Vec<NativeObject> {
        let mut objects: Vec<NativeObject> = self.inputs.drain().map(NativeObject::In).collect();
        #[cfg(feature = "compress")]
        objects.extend(self.outputs.drain().map(NativeObject::Out));
        self.references = 0;
        objects
    }
}
