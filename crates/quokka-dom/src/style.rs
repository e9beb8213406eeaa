//! Per-node computed style storage.
//!
//! The recognised CSS properties form a closed set, so a node's computed
//! style is a fixed array of [`Field`]s indexed by [`Property`] rather than
//! a name-to-value map.

use strum::{EnumCount, IntoEnumIterator};
use strum_macros::{AsRefStr, Display, EnumCount as EnumCountMacro, EnumIter, EnumString};

use crate::dirty::{DirtyGraph, Field, FieldId};

/// Every CSS property the pipeline understands.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    EnumString,
    AsRefStr,
    EnumCountMacro,
    Display,
)]
#[strum(serialize_all = "kebab-case")]
pub enum Property {
    /// `font-family` (inherited)
    FontFamily,
    /// `font-size` (inherited)
    FontSize,
    /// `font-weight` (inherited)
    FontWeight,
    /// `font-style` (inherited)
    FontStyle,
    /// `color` (inherited)
    Color,
    /// `opacity`
    Opacity,
    /// `transition`
    Transition,
    /// `transform`
    Transform,
    /// `mix-blend-mode`
    MixBlendMode,
    /// `border-radius`
    BorderRadius,
    /// `overflow`
    Overflow,
    /// `outline`
    Outline,
    /// `background-color`
    BackgroundColor,
    /// `image-rendering`
    ImageRendering,
}

impl Property {
    /// Properties whose value flows from parent to child.
    pub const INHERITED: [Self; 5] = [
        Self::FontFamily,
        Self::FontSize,
        Self::FontWeight,
        Self::FontStyle,
        Self::Color,
    ];

    /// Whether the property inherits.
    #[must_use]
    pub fn is_inherited(self) -> bool {
        Self::INHERITED.contains(&self)
    }

    /// Value used when nothing in the cascade sets the property and (for
    /// inherited properties) there is no parent.
    #[must_use]
    pub const fn initial_value(self, dark_mode: bool) -> &'static str {
        match self {
            Self::FontFamily | Self::Transition | Self::MixBlendMode => "",
            Self::FontSize => "16px",
            Self::FontWeight | Self::FontStyle => "normal",
            Self::Color => {
                if dark_mode {
                    "white"
                } else {
                    "black"
                }
            }
            Self::Opacity => "1",
            Self::Transform | Self::Outline => "none",
            Self::BorderRadius => "0px",
            Self::Overflow => "visible",
            Self::BackgroundColor => "transparent",
            Self::ImageRendering => "auto",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// The computed style of one node: one dirty field per [`Property`].
#[derive(Debug)]
pub struct StyleCells {
    cells: Vec<Field<String>>,
}

impl StyleCells {
    /// Fresh (dirty) cells for every property.
    pub fn new(graph: &mut DirtyGraph) -> Self {
        let cells = Property::iter()
            .map(|property| Field::new(graph, property_label(property)))
            .collect();
        Self { cells }
    }

    /// The cell for `property`.
    #[must_use]
    pub fn field(&self, property: Property) -> &Field<String> {
        &self.cells[property.index()]
    }

    /// The cell for `property`, mutably.
    pub fn field_mut(&mut self, property: Property) -> &mut Field<String> {
        &mut self.cells[property.index()]
    }

    /// The clean value of `property`.
    ///
    /// # Panics
    ///
    /// Panics if the cell is dirty.
    #[must_use]
    pub fn get<'a>(&'a self, graph: &DirtyGraph, property: Property) -> &'a str {
        self.field(property).get(graph)
    }

    /// Read `property` on behalf of `notify`, recording the dependency.
    pub fn read<'a>(&'a self, graph: &mut DirtyGraph, property: Property, notify: FieldId) -> &'a str {
        self.field(property).read(graph, notify)
    }

    /// Whether any cell needs recomputing.
    #[must_use]
    pub fn any_dirty(&self, graph: &DirtyGraph) -> bool {
        self.cells.iter().any(|cell| cell.is_dirty(graph))
    }

    /// Mark every cell (and everything computed from them) dirty.
    pub fn mark_all(&self, graph: &mut DirtyGraph) {
        for cell in &self.cells {
            cell.mark(graph);
        }
    }

    /// Last written values, dirty or not. `None` before the first style pass.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(Property, Option<String>)> {
        Property::iter()
            .map(|property| (property, self.field(property).peek().cloned()))
            .collect()
    }

    /// Release all cells.
    pub fn release(self, graph: &mut DirtyGraph) {
        for cell in self.cells {
            cell.release(graph);
        }
    }
}

const fn property_label(property: Property) -> &'static str {
    match property {
        Property::FontFamily => "style.font-family",
        Property::FontSize => "style.font-size",
        Property::FontWeight => "style.font-weight",
        Property::FontStyle => "style.font-style",
        Property::Color => "style.color",
        Property::Opacity => "style.opacity",
        Property::Transition => "style.transition",
        Property::Transform => "style.transform",
        Property::MixBlendMode => "style.mix-blend-mode",
        Property::BorderRadius => "style.border-radius",
        Property::Overflow => "style.overflow",
        Property::Outline => "style.outline",
        Property::BackgroundColor => "style.background-color",
        Property::ImageRendering => "style.image-rendering",
    }
}

/// Number of recognised properties.
pub const PROPERTY_COUNT: usize = Property::COUNT;

/// Interpolates a numeric property over a fixed number of frames.
///
/// Driven by the `transition` property: when a style pass changes a
/// transitioned value, an animation is installed and the scheduler calls
/// [`NumericAnimation::animate`] once per frame.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericAnimation {
    old_value: f64,
    new_value: f64,
    num_frames: u32,
    frame_count: u32,
    change_per_frame: f64,
}

impl NumericAnimation {
    /// An animation from `old_value` to `new_value` over `num_frames` frames.
    #[must_use]
    pub fn new(old_value: f64, new_value: f64, num_frames: u32) -> Self {
        let num_frames = num_frames.max(1);
        Self {
            old_value,
            new_value,
            num_frames,
            frame_count: 0,
            change_per_frame: (new_value - old_value) / f64::from(num_frames),
        }
    }

    /// Advance one frame and return the value to store, formatted with six
    /// decimals. Returns `None` once the final value has been produced.
    pub fn animate(&mut self) -> Option<String> {
        if self.frame_count >= self.num_frames {
            return None;
        }
        self.frame_count += 1;
        let value = if self.frame_count == self.num_frames {
            self.new_value
        } else {
            self.old_value + self.change_per_frame * f64::from(self.frame_count)
        };
        Some(format!("{value:.6}"))
    }

    /// The value the animation ends at.
    #[must_use]
    pub const fn target(&self) -> f64 {
        self.new_value
    }

    /// Whether the final value has been produced.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.frame_count >= self.num_frames
    }
}
