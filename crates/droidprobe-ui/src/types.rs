use std::fmt;

use serde::{Deserialize, Serialize};

/// Screen rectangle in device pixels, `[left,top][right,bottom]` in the dump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Tap point for the element.
    pub fn center(&self) -> (i32, i32) {
        ((self.left + self.right) / 2, (self.top + self.bottom) / 2)
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// Physical (or overridden) display size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Y coordinate at which the bottom band starts, for a band start ratio
    /// such as 0.85 (bottom 15% of the screen).
    pub fn band_start(&self, ratio: f64) -> f64 {
        f64::from(self.height) * ratio
    }
}

/// One node of a UI hierarchy dump.
///
/// Missing attributes are empty strings, matching how uiautomator reports them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiElement {
    pub class_name: String,
    pub resource_id: String,
    pub text: String,
    pub content_desc: String,
    pub package: String,
    pub clickable: bool,
    pub bounds: Bounds,
}

impl UiElement {
    pub fn signature(&self) -> ElementSignature {
        ElementSignature {
            class_name: self.class_name.clone(),
            resource_id: self.resource_id.clone(),
            text: self.text.clone(),
            content_desc: self.content_desc.clone(),
        }
    }

    /// Human-readable label: visible text, falling back to the description.
    pub fn label(&self) -> &str {
        if self.text.is_empty() {
            &self.content_desc
        } else {
            &self.text
        }
    }
}

/// Identity of a UI element across separate hierarchy dumps.
///
/// Two visually distinct elements with identical class, id, text and
/// description collide. That approximation is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementSignature {
    pub class_name: String,
    pub resource_id: String,
    pub text: String,
    pub content_desc: String,
}

impl fmt::Display for ElementSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[id={:?}, text={:?}, desc={:?}]",
            self.class_name, self.resource_id, self.text, self.content_desc
        )
    }
}
