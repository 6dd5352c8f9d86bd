//! UI hierarchy model shared by the exploration engine and the change detector.
//!
//! A hierarchy dump is parsed into flat [`types::UiElement`]s, filtered with
//! [`selector::Selector`]s and reduced to a [`fingerprint::UiFingerprint`] for
//! change detection.

pub mod fingerprint;
pub mod parse;
pub mod selector;
pub mod types;
