/// Actions emitted by the exploration engine, one per successful step.
use std::fmt;

use serde::{Deserialize, Serialize};

use droidprobe_ui::types::ElementSignature;

/// The priority handler that produced an action, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    PermissionPopup,
    TextInput,
    BottomNavigation,
    Tab,
    Clickable,
    IdleBack,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandlerKind::PermissionPopup => "permission_popup",
            HandlerKind::TextInput => "text_input",
            HandlerKind::BottomNavigation => "bottom_navigation",
            HandlerKind::Tab => "tab",
            HandlerKind::Clickable => "clickable",
            HandlerKind::IdleBack => "idle_back",
        };
        f.write_str(name)
    }
}

/// A single UI action taken by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExploreAction {
    /// Clicked the "allow" button of a permission dialog.
    PermissionAllowed { element: ElementSignature },
    /// Focused a text field, typed into it and, if one was on screen,
    /// clicked a confirmation button.
    TextEntered {
        element: ElementSignature,
        text: String,
        confirmed: Option<ElementSignature>,
    },
    /// Opened a bottom-navigation destination.
    BottomNavOpened { element: ElementSignature },
    /// Opened a tab.
    TabOpened { element: ElementSignature },
    /// Clicked any other clickable element.
    Clicked { element: ElementSignature },
    /// Nothing new to do for too long: sent "back" and forgot
    /// `forgotten` visited elements.
    BackPressed { forgotten: usize },
}

impl ExploreAction {
    pub fn kind(&self) -> HandlerKind {
        match self {
            ExploreAction::PermissionAllowed { .. } => HandlerKind::PermissionPopup,
            ExploreAction::TextEntered { .. } => HandlerKind::TextInput,
            ExploreAction::BottomNavOpened { .. } => HandlerKind::BottomNavigation,
            ExploreAction::TabOpened { .. } => HandlerKind::Tab,
            ExploreAction::Clicked { .. } => HandlerKind::Clickable,
            ExploreAction::BackPressed { .. } => HandlerKind::IdleBack,
        }
    }

    /// The element acted on, if the action targeted one.
    pub fn element(&self) -> Option<&ElementSignature> {
        match self {
            ExploreAction::PermissionAllowed { element }
            | ExploreAction::TextEntered { element, .. }
            | ExploreAction::BottomNavOpened { element }
            | ExploreAction::TabOpened { element }
            | ExploreAction::Clicked { element } => Some(element),
            ExploreAction::BackPressed { .. } => None,
        }
    }
}
