//! The hierarchical scene graph of 3D labels.
//!
//! Labels are arena-indexed entities: the [`LabelArena`] owns every drawable
//! label and all parent/child links are stable integer ids, never pointers.
//! The parent/child relation always forms a forest; [`LabelArena::add_child`]
//! detaches a child from any prior parent before attaching it, and
//! [`LabelArena::remove_child`] reverses an attach exactly.
//!
//! Per frame the arena is resynchronized from a read-only [`StoreSnapshot`];
//! transform deltas flow in from the interactive controller and finalized
//! geometry flows back out as [`ShapeCommit`] intents.

use crate::camera::PinholeCamera;
use crate::snapshot::{LabelKind, ShapeCommit, ShapeKind, StoreSnapshot, NO_ID};
use log::debug;
use nalgebra::{Point3, UnitQuaternion, Vector3};
use std::collections::HashMap;

pub mod cuboid;
pub mod plane;
pub mod shape;

pub use cuboid::BoxLabel;
pub use plane::PlaneLabel;
pub use shape::Shape;

#[derive(thiserror::Error, Debug)]
pub enum LabelError {
    #[error("Label accessed before init or update_state")]
    Uninitialized,
    #[error("Label {0} not found in arena")]
    NotFound(i64),
    #[error("Label {0} missing from store snapshot")]
    MissingLabel(i64),
    #[error("Shape {0} missing from store snapshot")]
    MissingShape(i64),
    #[error("Label {0} has no shapes in store snapshot")]
    EmptyShapeList(i64),
    #[error("Shape kind mismatch: expected {expected:?}, got {actual:?}")]
    ShapeKindMismatch {
        expected: ShapeKind,
        actual: ShapeKind,
    },
    #[error("Label kind mismatch: expected {expected:?}, got {actual:?}")]
    LabelKindMismatch {
        expected: LabelKind,
        actual: LabelKind,
    },
    #[error("Item index {0} out of range")]
    ItemOutOfRange(usize),
    #[error("Attaching label {child} under {parent} would create a cycle")]
    CycleDetected { parent: i64, child: i64 },
}

/// Distinct display colors cycled by id; visual identity only.
const PALETTE: [[f32; 3]; 10] = [
    [0.122, 0.467, 0.706],
    [1.000, 0.498, 0.055],
    [0.173, 0.627, 0.173],
    [0.839, 0.153, 0.157],
    [0.580, 0.404, 0.741],
    [0.549, 0.337, 0.294],
    [0.890, 0.467, 0.761],
    [0.498, 0.498, 0.498],
    [0.737, 0.741, 0.133],
    [0.090, 0.745, 0.812],
];

/// Deterministic label color: keyed by track id when the label belongs to a
/// track, otherwise by label id.
pub fn get_color_by_id(label_id: i64, track_id: i64) -> [f32; 4] {
    let key = if track_id >= 0 { track_id } else { label_id };
    let [r, g, b] = PALETTE[(key.max(0) as usize) % PALETTE.len()];
    [r, g, b, 1.0]
}

/// Identity, hierarchy, and selection state shared by every label variant.
#[derive(Debug, Clone)]
pub struct LabelCore {
    id: i64,
    track: i64,
    item: usize,
    category: Vec<usize>,
    attributes: HashMap<u64, Vec<u64>>,
    sensors: Vec<usize>,
    parent: i64,
    children: Vec<i64>,
    selected: bool,
    highlighted: bool,
    temporary: bool,
    color: [f32; 4],
    initialized: bool,
}

impl LabelCore {
    fn new() -> Self {
        LabelCore {
            id: NO_ID,
            track: NO_ID,
            item: 0,
            category: Vec::new(),
            attributes: HashMap::new(),
            sensors: Vec::new(),
            parent: NO_ID,
            children: Vec::new(),
            selected: false,
            highlighted: false,
            temporary: false,
            color: [0.0, 0.0, 0.0, 1.0],
            initialized: false,
        }
    }

    /// Store id; [`NO_ID`] before the label is committed.
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn track(&self) -> i64 {
        self.track
    }

    pub fn item(&self) -> usize {
        self.item
    }

    pub fn category(&self) -> &[usize] {
        &self.category
    }

    pub fn attributes(&self) -> &HashMap<u64, Vec<u64>> {
        &self.attributes
    }

    pub fn sensors(&self) -> &[usize] {
        &self.sensors
    }

    /// Parent label id, [`NO_ID`] for roots.
    pub fn parent(&self) -> i64 {
        self.parent
    }

    /// Child label ids, ordered and unique.
    pub fn children(&self) -> &[i64] {
        &self.children
    }

    pub fn selected(&self) -> bool {
        self.selected
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    pub fn highlighted(&self) -> bool {
        self.highlighted
    }

    pub fn set_highlighted(&mut self, highlighted: bool) {
        self.highlighted = highlighted;
    }

    /// Whether the label is in-progress and not yet committed to the store.
    pub fn temporary(&self) -> bool {
        self.temporary
    }

    pub fn color(&self) -> [f32; 4] {
        self.color
    }

    fn init(&mut self, item: usize, category: usize, sensors: &[usize], temporary: bool) {
        self.id = NO_ID;
        self.track = NO_ID;
        self.item = item;
        self.category = vec![category];
        self.sensors = sensors.to_vec();
        self.temporary = temporary;
        self.color = get_color_by_id(self.id, self.track);
        self.initialized = true;
    }

    fn sync(
        &mut self,
        snapshot: &StoreSnapshot,
        item: usize,
        label_id: i64,
    ) -> Result<(), LabelError> {
        let label = snapshot
            .label(item, label_id)
            .ok_or(LabelError::MissingLabel(label_id))?;
        self.id = label.id;
        self.track = label.track;
        self.item = item;
        self.category = label.category.clone();
        self.attributes = label.attributes.clone();
        self.sensors = label.sensors.clone();
        self.parent = label.parent;
        self.children = label.children.clone();
        self.temporary = false;
        self.color = get_color_by_id(self.id, self.track);
        self.initialized = true;
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<(), LabelError> {
        if self.initialized {
            Ok(())
        } else {
            Err(LabelError::Uninitialized)
        }
    }
}

/// Capability interface implemented by every label variant.
pub trait Drawable {
    fn core(&self) -> &LabelCore;

    fn core_mut(&mut self) -> &mut LabelCore;

    /// Allocates a fresh in-memory label and shape, not yet in the store.
    fn init(
        &mut self,
        item: usize,
        category: usize,
        center: Option<Point3<f64>>,
        sensors: &[usize],
        temporary: bool,
    );

    /// Resyncs the label from an authoritative store snapshot. Idempotent:
    /// calling twice with the same snapshot yields the same visible state.
    fn update_state(
        &mut self,
        snapshot: &StoreSnapshot,
        item: usize,
        label_id: i64,
    ) -> Result<(), LabelError>;

    /// Owned geometry, for hit-testing and rendering.
    fn shapes(&self) -> Vec<&Shape>;

    fn shapes_mut(&mut self) -> Vec<&mut Shape>;

    /// Shape ids, kinds, and snapshots for the persistence round-trip.
    fn shape_states(&self) -> Result<ShapeCommit, LabelError>;

    fn translate(&mut self, delta: &Vector3<f64>);

    fn rotate(&mut self, delta: &UnitQuaternion<f64>);

    fn scale(&mut self, factor: &Vector3<f64>, anchor: &Point3<f64>);

    fn center(&self) -> Point3<f64>;

    fn orientation(&self) -> UnitQuaternion<f64>;
}

/// Closed tagged-variant set of label types.
#[derive(Debug, Clone)]
pub enum Label {
    Plane(PlaneLabel),
    Box(BoxLabel),
}

impl Label {
    pub fn kind(&self) -> LabelKind {
        match self {
            Label::Plane(_) => LabelKind::Plane3d,
            Label::Box(_) => LabelKind::Box3d,
        }
    }

    fn from_kind(kind: LabelKind) -> Self {
        match kind {
            LabelKind::Plane3d => Label::Plane(PlaneLabel::new()),
            LabelKind::Box3d => Label::Box(BoxLabel::new()),
        }
    }

    pub fn as_plane(&self) -> Option<&PlaneLabel> {
        match self {
            Label::Plane(p) => Some(p),
            _ => None,
        }
    }
}

impl Drawable for Label {
    fn core(&self) -> &LabelCore {
        match self {
            Label::Plane(p) => p.core(),
            Label::Box(b) => b.core(),
        }
    }

    fn core_mut(&mut self) -> &mut LabelCore {
        match self {
            Label::Plane(p) => p.core_mut(),
            Label::Box(b) => b.core_mut(),
        }
    }

    fn init(
        &mut self,
        item: usize,
        category: usize,
        center: Option<Point3<f64>>,
        sensors: &[usize],
        temporary: bool,
    ) {
        match self {
            Label::Plane(p) => p.init(item, category, center, sensors, temporary),
            Label::Box(b) => b.init(item, category, center, sensors, temporary),
        }
    }

    fn update_state(
        &mut self,
        snapshot: &StoreSnapshot,
        item: usize,
        label_id: i64,
    ) -> Result<(), LabelError> {
        match self {
            Label::Plane(p) => p.update_state(snapshot, item, label_id),
            Label::Box(b) => b.update_state(snapshot, item, label_id),
        }
    }

    fn shapes(&self) -> Vec<&Shape> {
        match self {
            Label::Plane(p) => p.shapes(),
            Label::Box(b) => b.shapes(),
        }
    }

    fn shapes_mut(&mut self) -> Vec<&mut Shape> {
        match self {
            Label::Plane(p) => p.shapes_mut(),
            Label::Box(b) => b.shapes_mut(),
        }
    }

    fn shape_states(&self) -> Result<ShapeCommit, LabelError> {
        match self {
            Label::Plane(p) => p.shape_states(),
            Label::Box(b) => b.shape_states(),
        }
    }

    fn translate(&mut self, delta: &Vector3<f64>) {
        match self {
            Label::Plane(p) => p.translate(delta),
            Label::Box(b) => b.translate(delta),
        }
    }

    fn rotate(&mut self, delta: &UnitQuaternion<f64>) {
        match self {
            Label::Plane(p) => p.rotate(delta),
            Label::Box(b) => b.rotate(delta),
        }
    }

    fn scale(&mut self, factor: &Vector3<f64>, anchor: &Point3<f64>) {
        match self {
            Label::Plane(p) => p.scale(factor, anchor),
            Label::Box(b) => b.scale(factor, anchor),
        }
    }

    fn center(&self) -> Point3<f64> {
        match self {
            Label::Plane(p) => p.center(),
            Label::Box(b) => b.center(),
        }
    }

    fn orientation(&self) -> UnitQuaternion<f64> {
        match self {
            Label::Plane(p) => p.orientation(),
            Label::Box(b) => b.orientation(),
        }
    }
}

/// Arena of all drawable labels for the current frame.
#[derive(Debug, Default)]
pub struct LabelArena {
    labels: HashMap<i64, Label>,
    selection: Vec<i64>,
    next_temporary_id: i64,
}

impl LabelArena {
    pub fn new() -> Self {
        LabelArena {
            labels: HashMap::new(),
            selection: Vec::new(),
            // -1 is reserved for "uncommitted"; temporaries count down from -2.
            next_temporary_id: -2,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.labels.contains_key(&id)
    }

    pub fn get(&self, id: i64) -> Result<&Label, LabelError> {
        self.labels.get(&id).ok_or(LabelError::NotFound(id))
    }

    pub fn get_mut(&mut self, id: i64) -> Result<&mut Label, LabelError> {
        self.labels.get_mut(&id).ok_or(LabelError::NotFound(id))
    }

    pub fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.labels.keys().copied()
    }

    /// Inserts a committed label under its store id.
    pub fn insert(&mut self, label: Label) -> i64 {
        let id = label.core().id();
        self.labels.insert(id, label);
        id
    }

    /// Inserts an uncommitted label under a fresh negative id.
    pub fn insert_temporary(&mut self, mut label: Label) -> i64 {
        let id = self.next_temporary_id;
        self.next_temporary_id -= 1;
        label.core_mut().id = id;
        for shape in label.shapes_mut() {
            shape.set_label_id(id);
        }
        self.labels.insert(id, label);
        id
    }

    /// Removes a label: detaches it from its parent and orphans its children.
    pub fn remove(&mut self, id: i64) -> Option<Label> {
        let removed = self.labels.remove(&id)?;
        let parent = removed.core().parent();
        if parent != NO_ID {
            if let Some(parent_label) = self.labels.get_mut(&parent) {
                parent_label.core_mut().children.retain(|c| *c != id);
            }
        }
        for child in removed.core().children().to_vec() {
            if let Some(child_label) = self.labels.get_mut(&child) {
                child_label.core_mut().parent = NO_ID;
            }
        }
        self.selection.retain(|s| *s != id);
        Some(removed)
    }

    /// Attaches `child` under `parent`, maintaining the forest invariant:
    /// the child is detached from any prior parent first, the child's parent
    /// id and the parent's child list stay consistent, and an attachment
    /// that would close a cycle is rejected outright.
    pub fn add_child(&mut self, parent: i64, child: i64) -> Result<(), LabelError> {
        if !self.contains(parent) {
            return Err(LabelError::NotFound(parent));
        }
        let old_parent = self.get(child)?.core().parent();
        if old_parent == parent {
            return Ok(());
        }
        // Walk the ancestor chain of the new parent; finding the child there
        // (or the parent being the child itself) would make the link cyclic.
        let mut ancestor = parent;
        while ancestor != NO_ID {
            if ancestor == child {
                return Err(LabelError::CycleDetected { parent, child });
            }
            ancestor = self
                .labels
                .get(&ancestor)
                .map(|label| label.core().parent())
                .unwrap_or(NO_ID);
        }
        if old_parent != NO_ID {
            self.remove_child(old_parent, child)?;
        }
        let parent_label = self.get_mut(parent)?;
        if !parent_label.core().children().contains(&child) {
            parent_label.core_mut().children.push(child);
        }
        self.get_mut(child)?.core_mut().parent = parent;
        Ok(())
    }

    /// Detaches `child` from `parent`. Exact inverse of [`Self::add_child`].
    pub fn remove_child(&mut self, parent: i64, child: i64) -> Result<(), LabelError> {
        self.get_mut(parent)?.core_mut().children.retain(|c| *c != child);
        let child_label = self.get_mut(child)?;
        if child_label.core().parent() == parent {
            child_label.core_mut().parent = NO_ID;
        }
        Ok(())
    }

    pub fn selection(&self) -> &[i64] {
        &self.selection
    }

    pub fn set_selected(&mut self, id: i64, selected: bool) -> Result<(), LabelError> {
        self.get_mut(id)?.core_mut().set_selected(selected);
        self.selection.retain(|s| *s != id);
        if selected {
            self.selection.push(id);
        }
        Ok(())
    }

    /// The currently selected plane label, if any; the homography engine's
    /// reference plane comes from here.
    pub fn selected_plane(&self) -> Option<&PlaneLabel> {
        self.selection
            .iter()
            .filter_map(|id| self.labels.get(id))
            .find_map(|label| label.as_plane())
    }

    /// Resynchronizes the whole arena from a store snapshot: committed labels
    /// absent from the snapshot are dropped, missing drawables are created by
    /// kind, and every committed label is resynced. Temporary labels survive
    /// untouched. Selection is rebuilt from the snapshot when it targets
    /// `item`.
    pub fn update_state(
        &mut self,
        snapshot: &StoreSnapshot,
        item: usize,
    ) -> Result<(), LabelError> {
        let item_snapshot = snapshot
            .items
            .get(item)
            .ok_or(LabelError::ItemOutOfRange(item))?;

        let stale: Vec<i64> = self
            .labels
            .iter()
            .filter(|(id, label)| {
                !label.core().temporary() && !item_snapshot.labels.contains_key(id)
            })
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            debug!("dropping stale label {id}");
            self.remove(id);
        }

        let mut ids: Vec<i64> = item_snapshot.labels.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let kind = item_snapshot.labels[&id].kind;
            let entry = self
                .labels
                .entry(id)
                .or_insert_with(|| Label::from_kind(kind));
            if entry.kind() != kind {
                return Err(LabelError::LabelKindMismatch {
                    expected: entry.kind(),
                    actual: kind,
                });
            }
            entry.update_state(snapshot, item, id)?;
        }

        if snapshot.select.item == item {
            for label in self.labels.values_mut() {
                label.core_mut().set_selected(false);
            }
            self.selection.clear();
            for id in &snapshot.select.labels {
                if let Some(label) = self.labels.get_mut(id) {
                    label.core_mut().set_selected(true);
                    self.selection.push(*id);
                }
            }
        }
        Ok(())
    }

    /// The label plus every descendant. The forest invariant guarantees
    /// termination.
    fn subtree(&self, id: i64) -> Vec<i64> {
        let mut order = Vec::new();
        let mut queue = vec![id];
        while let Some(current) = queue.pop() {
            if let Some(label) = self.labels.get(&current) {
                order.push(current);
                queue.extend_from_slice(label.core().children());
            }
        }
        order
    }

    /// Translates a label and its attached descendants.
    pub fn translate(&mut self, id: i64, delta: &Vector3<f64>) -> Result<(), LabelError> {
        if !self.contains(id) {
            return Err(LabelError::NotFound(id));
        }
        for member in self.subtree(id) {
            if let Some(label) = self.labels.get_mut(&member) {
                label.translate(delta);
            }
        }
        Ok(())
    }

    /// Rotates a label in place; attached descendants orbit the label's
    /// center so the assembly turns as one rigid unit.
    pub fn rotate(&mut self, id: i64, delta: &UnitQuaternion<f64>) -> Result<(), LabelError> {
        let pivot = self.get(id)?.center();
        for member in self.subtree(id) {
            if let Some(label) = self.labels.get_mut(&member) {
                let offset = label.center() - pivot;
                let swing = delta * offset - offset;
                label.rotate(delta);
                label.translate(&swing);
            }
        }
        Ok(())
    }

    /// Anchor-relative scale of a label and its attached descendants.
    pub fn scale(
        &mut self,
        id: i64,
        factor: &Vector3<f64>,
        anchor: &Point3<f64>,
    ) -> Result<(), LabelError> {
        if !self.contains(id) {
            return Err(LabelError::NotFound(id));
        }
        for member in self.subtree(id) {
            if let Some(label) = self.labels.get_mut(&member) {
                label.scale(factor, anchor);
            }
        }
        Ok(())
    }

    /// Direct-manipulation entry point. A selected plane label spawns a
    /// temporary box child anchored to its grid and forwards the event to it.
    pub fn on_mouse_down(
        &mut self,
        id: i64,
        x: f64,
        y: f64,
        camera: &PinholeCamera,
    ) -> Result<bool, LabelError> {
        match self.get(id)? {
            Label::Plane(plane) => {
                plane.core().ensure_initialized()?;
                if !plane.core().selected() {
                    return Ok(false);
                }
                let item = plane.core().item();
                let sensors = plane.core().sensors().to_vec();
                let grid_center = plane.center();
                let grid_rotation = plane.orientation();

                let mut drawn = BoxLabel::new();
                drawn.init(item, 0, Some(grid_center), &sensors, true);
                let temp_id = self.insert_temporary(Label::Box(drawn));
                self.add_child(id, temp_id)?;
                if let Label::Box(b) = self.get_mut(temp_id)? {
                    b.set_pose(grid_center, grid_rotation);
                }
                if let Label::Plane(plane) = self.get_mut(id)? {
                    plane.set_temporary_child(Some(temp_id));
                }
                debug!("plane {id} spawned temporary box {temp_id}");
                self.on_mouse_down(temp_id, x, y, camera)
            }
            Label::Box(_) => {
                if let Label::Box(b) = self.get_mut(id)? {
                    Ok(b.on_mouse_down(x, y, camera))
                } else {
                    unreachable!()
                }
            }
        }
    }

    pub fn on_mouse_move(
        &mut self,
        id: i64,
        x: f64,
        y: f64,
        camera: &PinholeCamera,
    ) -> Result<bool, LabelError> {
        match self.get(id)? {
            Label::Plane(plane) => match plane.temporary_child() {
                Some(child) => self.on_mouse_move(child, x, y, camera),
                None => Ok(false),
            },
            Label::Box(_) => {
                if let Label::Box(b) = self.get_mut(id)? {
                    Ok(b.on_mouse_move(x, y, camera))
                } else {
                    unreachable!()
                }
            }
        }
    }

    /// Finalizes an in-progress draw: the temporary reference is cleared;
    /// committing the drawn label to the store is a collaborator concern.
    pub fn on_mouse_up(&mut self, id: i64) -> Result<(), LabelError> {
        let forward = match self.get(id)? {
            Label::Plane(plane) => plane.temporary_child(),
            Label::Box(_) => None,
        };
        if let Some(child) = forward {
            self.on_mouse_up(child)?;
            if let Label::Plane(plane) = self.get_mut(id)? {
                plane.set_temporary_child(None);
            }
        } else if let Label::Box(b) = self.get_mut(id)? {
            b.on_mouse_up();
        }
        Ok(())
    }
}
