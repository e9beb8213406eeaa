//! Dirty fields: single-writer cells with dependency tracking.
//!
//! Every piece of derived state in the pipeline (a computed style value, a
//! layout coordinate, the child list of a block) lives in a [`Field`]. The
//! value is stored inline in its owner; the bookkeeping (dirty flag, edge
//! lists, generation) lives in one [`DirtyGraph`] per frame, addressed by
//! [`FieldId`].
//!
//! Edges are recorded when a field is computed from another one:
//! `source.read(graph, target.id())` returns the source value and records
//! that `target` must be recomputed whenever `source` changes. Writing a new
//! value with [`Field::set`] clears the field's own dirty flag and marks
//! every dependent; [`DirtyGraph::mark`] then walks the dependents
//! transitively.
//!
//! Reading a dirty field is a bug in the caller and panics.

use crate::LayoutId;

/// Handle to a field's bookkeeping slot.
///
/// Slots are recycled; the generation makes a handle to a released field
/// distinguishable from the slot's next occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldId {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    live: bool,
    dirty: bool,
    label: &'static str,
    /// Layout node whose geometry this field belongs to, if any.
    owner: Option<LayoutId>,
    /// Fields that read this one.
    dependents: Vec<FieldId>,
    /// Fields this one read. Kept so `set_dependencies` can drop old edges.
    dependencies: Vec<FieldId>,
}

/// Dependency bookkeeping for every field of one frame.
#[derive(Debug, Default)]
pub struct DirtyGraph {
    slots: Vec<Slot>,
    free: Vec<u32>,
    /// Layout owners of fields marked since the last [`Self::take_dirty_owners`].
    dirty_owners: Vec<LayoutId>,
}

impl DirtyGraph {
    /// An empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, label: &'static str, owner: Option<LayoutId>) -> FieldId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.live = true;
            slot.dirty = true;
            slot.label = label;
            slot.owner = owner;
            slot.dependents.clear();
            slot.dependencies.clear();
            return FieldId {
                index,
                generation: slot.generation,
            };
        }
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            live: true,
            dirty: true,
            label,
            owner,
            dependents: Vec::new(),
            dependencies: Vec::new(),
        });
        FieldId {
            index,
            generation: 0,
        }
    }

    fn slot(&self, id: FieldId) -> Option<&Slot> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.live && slot.generation == id.generation)
    }

    fn slot_mut(&mut self, id: FieldId) -> Option<&mut Slot> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.live && slot.generation == id.generation)
    }

    /// Whether `id` still names a live field.
    #[must_use]
    pub fn is_live(&self, id: FieldId) -> bool {
        self.slot(id).is_some()
    }

    /// Whether the field is dirty.
    ///
    /// # Panics
    ///
    /// Panics if the field has been released.
    #[must_use]
    pub fn is_dirty(&self, id: FieldId) -> bool {
        match self.slot(id) {
            Some(slot) => slot.dirty,
            None => panic!("use of released field {id:?}"),
        }
    }

    /// The debug label given to the field at creation.
    #[must_use]
    pub fn label(&self, id: FieldId) -> &'static str {
        self.slot(id).map_or("<released>", |slot| slot.label)
    }

    /// Mark a field dirty, then every field that transitively depends on it.
    ///
    /// Idempotent: a field that is already dirty stops the walk. Released
    /// fields are skipped.
    pub fn mark(&mut self, id: FieldId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(slot) = self.slot_mut(current) else {
                continue;
            };
            if slot.dirty {
                continue;
            }
            slot.dirty = true;
            let owner = slot.owner;
            stack.extend(slot.dependents.iter().copied());
            if let Some(owner) = owner {
                self.dirty_owners.push(owner);
            }
        }
    }

    /// Mark every dependent of `id` (but not `id` itself).
    pub fn notify(&mut self, id: FieldId) {
        let dependents = match self.slot_mut(id) {
            Some(slot) => std::mem::take(&mut slot.dependents),
            None => return,
        };
        let live: Vec<FieldId> = dependents
            .into_iter()
            .filter(|dep| self.is_live(*dep))
            .collect();
        for dep in &live {
            self.mark(*dep);
        }
        if let Some(slot) = self.slot_mut(id) {
            slot.dependents = live;
        }
    }

    /// Record that `dependent` reads `source`.
    pub fn add_dependent(&mut self, source: FieldId, dependent: FieldId) {
        if source == dependent || !self.is_live(dependent) {
            return;
        }
        let Some(slot) = self.slot_mut(source) else {
            return;
        };
        if slot.dependents.contains(&dependent) {
            return;
        }
        slot.dependents.push(dependent);
        if let Some(slot) = self.slot_mut(dependent) {
            slot.dependencies.push(source);
        }
    }

    /// Replace the set of fields `id` depends on.
    ///
    /// Edges from the old sources are removed; edges from `sources` are
    /// added. Used when a layout node rebuilds its children and the old
    /// child fields are about to be released.
    pub fn set_dependencies(&mut self, id: FieldId, sources: &[FieldId]) {
        let old = match self.slot_mut(id) {
            Some(slot) => std::mem::take(&mut slot.dependencies),
            None => return,
        };
        for source in old {
            if let Some(slot) = self.slot_mut(source) {
                slot.dependents.retain(|dep| *dep != id);
            }
        }
        for source in sources {
            self.add_dependent(*source, id);
        }
    }

    /// Clear the dirty flag. Only [`Field::set`] calls this.
    fn clean(&mut self, id: FieldId) {
        match self.slot_mut(id) {
            Some(slot) => slot.dirty = false,
            None => panic!("write to released field {id:?}"),
        }
    }

    /// Release a field's slot. Later uses of `id` are detected as stale.
    pub fn release(&mut self, id: FieldId) {
        let dependencies = match self.slot_mut(id) {
            Some(slot) => {
                slot.live = false;
                slot.generation = slot.generation.wrapping_add(1);
                slot.dependents.clear();
                slot.owner = None;
                std::mem::take(&mut slot.dependencies)
            }
            None => return,
        };
        for source in dependencies {
            if let Some(slot) = self.slot_mut(source) {
                slot.dependents.retain(|dep| *dep != id);
            }
        }
        self.free.push(id.index);
    }

    /// Drain the layout owners of fields marked since the last call.
    pub fn take_dirty_owners(&mut self) -> Vec<LayoutId> {
        std::mem::take(&mut self.dirty_owners)
    }

    /// Number of live fields.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.live).count()
    }

    /// Number of live dirty fields.
    #[must_use]
    pub fn dirty_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.live && slot.dirty).count()
    }

    /// Labels of all live dirty fields, for diagnostics.
    #[must_use]
    pub fn dirty_labels(&self) -> Vec<&'static str> {
        self.slots
            .iter()
            .filter(|slot| slot.live && slot.dirty)
            .map(|slot| slot.label)
            .collect()
    }

    /// The fields that read `id`.
    #[must_use]
    pub fn dependents(&self, id: FieldId) -> Vec<FieldId> {
        self.slot(id)
            .map(|slot| {
                slot.dependents
                    .iter()
                    .copied()
                    .filter(|dep| self.is_live(*dep))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A dependency-tracked value.
///
/// A fresh field is dirty and holds no value.
#[derive(Debug)]
pub struct Field<T> {
    id: FieldId,
    value: Option<T>,
}

impl<T> Field<T> {
    /// Create a dirty field with no owner.
    pub fn new(graph: &mut DirtyGraph, label: &'static str) -> Self {
        Self {
            id: graph.alloc(label, None),
            value: None,
        }
    }

    /// Create a dirty field belonging to layout node `owner`.
    ///
    /// Marking an owned field records the owner so the layout tree can flag
    /// its ancestors as having dirty descendants.
    pub fn owned(graph: &mut DirtyGraph, label: &'static str, owner: LayoutId) -> Self {
        Self {
            id: graph.alloc(label, Some(owner)),
            value: None,
        }
    }

    /// The field's handle in the graph.
    #[must_use]
    pub const fn id(&self) -> FieldId {
        self.id
    }

    /// Whether the field needs recomputing.
    #[must_use]
    pub fn is_dirty(&self, graph: &DirtyGraph) -> bool {
        graph.is_dirty(self.id)
    }

    /// The current value.
    ///
    /// # Panics
    ///
    /// Panics if the field is dirty or was never set.
    #[must_use]
    pub fn get(&self, graph: &DirtyGraph) -> &T {
        assert!(
            !graph.is_dirty(self.id),
            "read of dirty field '{}'",
            graph.label(self.id)
        );
        match &self.value {
            Some(value) => value,
            None => panic!("read of unset field '{}'", graph.label(self.id)),
        }
    }

    /// Record `notify` as a dependent of this field and return the value.
    ///
    /// # Panics
    ///
    /// Panics if the field is dirty.
    pub fn read(&self, graph: &mut DirtyGraph, notify: FieldId) -> &T {
        graph.add_dependent(self.id, notify);
        self.get(graph)
    }

    /// The last written value, dirty or not. For diffing old and new styles.
    #[must_use]
    pub const fn peek(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Mark this field and its dependents dirty.
    pub fn mark(&self, graph: &mut DirtyGraph) {
        graph.mark(self.id);
    }

    /// Replace the fields this one depends on.
    pub fn set_dependencies(&self, graph: &mut DirtyGraph, sources: &[FieldId]) {
        graph.set_dependencies(self.id, sources);
    }

    /// Drop the field's bookkeeping.
    pub fn release(self, graph: &mut DirtyGraph) {
        graph.release(self.id);
    }
}

impl<T> Field<T> {
    /// Store a freshly computed value, clear the dirty flag and mark every
    /// dependent dirty.
    pub fn set(&mut self, graph: &mut DirtyGraph, value: T) {
        self.value = Some(value);
        graph.clean(self.id);
        graph.notify(self.id);
    }
}

impl<T: PartialEq> Field<T> {
    /// [`set`](Self::set), unless the field is clean and already holds
    /// `value`. Returns whether it wrote.
    ///
    /// A dirty field is always written: marking is transitive, so its
    /// dependents are dirty already and the notification changes nothing.
    pub fn update(&mut self, graph: &mut DirtyGraph, value: T) -> bool {
        if !graph.is_dirty(self.id) && self.value.as_ref() == Some(&value) {
            return false;
        }
        self.set(graph, value);
        true
    }
}

impl<T: Clone> Field<T> {
    /// `self.set(other.read(self))`.
    pub fn copy(&mut self, graph: &mut DirtyGraph, other: &Self) {
        let value = other.read(graph, self.id).clone();
        self.set(graph, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_field_is_dirty() {
        let mut graph = DirtyGraph::new();
        let field: Field<u32> = Field::new(&mut graph, "fresh");
        assert!(field.is_dirty(&graph));
    }

    #[test]
    #[should_panic(expected = "read of dirty field 'width'")]
    fn test_get_while_dirty_panics() {
        let mut graph = DirtyGraph::new();
        let field: Field<f32> = Field::new(&mut graph, "width");
        let _ = field.get(&graph);
    }

    #[test]
    fn test_set_marks_dependents() {
        let mut graph = DirtyGraph::new();
        let mut source = Field::new(&mut graph, "source");
        let mut target = Field::new(&mut graph, "target");
        source.set(&mut graph, 1);
        let v = *source.read(&mut graph, target.id());
        target.set(&mut graph, v * 2);
        assert!(!target.is_dirty(&graph));

        source.set(&mut graph, 5);
        assert!(target.is_dirty(&graph));
        target.copy(&mut graph, &source);
        assert_eq!(*target.get(&graph), 5);
    }

    #[test]
    fn test_identical_set_still_marks_dependents() {
        let mut graph = DirtyGraph::new();
        let mut source = Field::new(&mut graph, "source");
        let mut target = Field::new(&mut graph, "target");
        source.set(&mut graph, 3);
        target.copy(&mut graph, &source);
        source.set(&mut graph, 3);
        assert!(target.is_dirty(&graph));
    }

    #[test]
    fn test_update_skips_identical_writes_to_clean_fields() {
        let mut graph = DirtyGraph::new();
        let mut source = Field::new(&mut graph, "source");
        let mut target = Field::new(&mut graph, "target");
        assert!(source.update(&mut graph, 3));
        target.copy(&mut graph, &source);

        assert!(!source.update(&mut graph, 3));
        assert!(!target.is_dirty(&graph));

        assert!(source.update(&mut graph, 4));
        assert!(target.is_dirty(&graph));
        target.copy(&mut graph, &source);
        assert_eq!(*target.get(&graph), 4);
    }

    #[test]
    fn test_update_cleans_a_marked_field_with_the_same_value() {
        let mut graph = DirtyGraph::new();
        let mut source = Field::new(&mut graph, "source");
        let mut target = Field::new(&mut graph, "target");
        source.set(&mut graph, 3);
        target.copy(&mut graph, &source);

        source.mark(&mut graph);
        assert!(target.is_dirty(&graph));
        assert!(source.update(&mut graph, 3));
        assert!(!source.is_dirty(&graph));
        // The dependent was marked with the source and still needs its own
        // recompute.
        assert!(target.is_dirty(&graph));
        target.copy(&mut graph, &source);
        assert_eq!(graph.dirty_count(), 0);
    }

    #[test]
    fn test_mark_is_transitive() {
        let mut graph = DirtyGraph::new();
        let mut a = Field::new(&mut graph, "a");
        let mut b = Field::new(&mut graph, "b");
        let mut c = Field::new(&mut graph, "c");
        a.set(&mut graph, 1);
        b.copy(&mut graph, &a);
        c.copy(&mut graph, &b);

        a.mark(&mut graph);
        assert!(a.is_dirty(&graph));
        assert!(b.is_dirty(&graph));
        assert!(c.is_dirty(&graph));
        assert_eq!(graph.dirty_count(), 3);
    }

    #[test]
    fn test_set_dependencies_replaces_edges() {
        let mut graph = DirtyGraph::new();
        let mut old = Field::new(&mut graph, "old");
        let mut new = Field::new(&mut graph, "new");
        let mut sum: Field<i32> = Field::new(&mut graph, "sum");
        old.set(&mut graph, 1);
        new.set(&mut graph, 2);
        sum.set_dependencies(&mut graph, &[old.id()]);
        sum.set(&mut graph, 1);

        sum.set_dependencies(&mut graph, &[new.id()]);
        old.set(&mut graph, 10);
        assert!(!sum.is_dirty(&graph));
        new.set(&mut graph, 20);
        assert!(sum.is_dirty(&graph));
    }

    #[test]
    fn test_released_field_is_skipped() {
        let mut graph = DirtyGraph::new();
        let mut source = Field::new(&mut graph, "source");
        let mut child = Field::new(&mut graph, "child");
        source.set(&mut graph, 1);
        child.copy(&mut graph, &source);
        let stale = child.id();
        child.release(&mut graph);

        // The recycled slot must not be marked through the stale edge.
        let mut reused: Field<i32> = Field::new(&mut graph, "reused");
        reused.set(&mut graph, 0);
        assert_eq!(reused.id().index, stale.index);
        source.set(&mut graph, 2);
        assert!(!reused.is_dirty(&graph));
        assert!(!graph.is_live(stale));
    }

    #[test]
    fn test_owned_marks_are_reported() {
        let mut graph = DirtyGraph::new();
        let mut field = Field::owned(&mut graph, "x", LayoutId(7));
        field.set(&mut graph, 1.0_f32);
        let _ = graph.take_dirty_owners();
        field.mark(&mut graph);
        assert_eq!(graph.take_dirty_owners(), vec![LayoutId(7)]);
        assert!(graph.take_dirty_owners().is_empty());
    }
}
