//! In-memory device driven by a script of hierarchy dumps.
//!
//! Used to exercise the engine, the detector and the session orchestrator
//! without hardware. Every interaction is recorded for later assertions.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use regex::Regex;

use droidprobe_ui::parse::{parse_hierarchy, parse_hierarchy_spans};
use droidprobe_ui::types::{ElementSignature, ScreenSize, UiElement};

use crate::device::{AppManager, Device, DeviceError, SystemProxy};

/// An interaction observed by a [`ScriptedDevice`].
#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    Click(ElementSignature),
    SetText(ElementSignature, String),
    Back,
    Screenshot(PathBuf),
    Install(PathBuf),
    Uninstall(String),
    Launch(String),
    ProxySet(String),
    ProxyCleared,
}

#[derive(Debug, Default)]
struct ScriptState {
    /// Upcoming dumps. The last entry sticks once the others are consumed;
    /// `None` entries simulate a failed dump.
    screens: VecDeque<Option<String>>,
    /// Screen to switch to when an element with the given text is clicked.
    navigation: HashMap<String, String>,
    /// Elements (by text) that show up in dumps but vanish when acted on.
    stale_texts: HashSet<String>,
    interactions: Vec<Interaction>,
    dumps: u64,
    fail_screenshots: bool,
    fail_install: bool,
    fail_launch: bool,
}

pub struct ScriptedDevice {
    screen_size: ScreenSize,
    state: Mutex<ScriptState>,
}

impl ScriptedDevice {
    pub fn new(screen_size: ScreenSize) -> Self {
        Self {
            screen_size,
            state: Mutex::new(ScriptState::default()),
        }
    }

    /// A device that always shows `xml`.
    pub fn with_screen(screen_size: ScreenSize, xml: impl Into<String>) -> Self {
        let device = Self::new(screen_size);
        device.set_screen(xml);
        device
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the script with a single, permanent screen.
    pub fn set_screen(&self, xml: impl Into<String>) {
        let mut state = self.state();
        state.screens.clear();
        state.screens.push_back(Some(xml.into()));
    }

    /// Append a dump to the script.
    pub fn push_screen(&self, xml: impl Into<String>) {
        self.state().screens.push_back(Some(xml.into()));
    }

    /// Append a failed dump to the script.
    pub fn push_missing_dump(&self) {
        self.state().screens.push_back(None);
    }

    /// Clicking an element whose text is `text` switches to `next`.
    pub fn navigate_on_click(&self, text: impl Into<String>, next: impl Into<String>) {
        self.state().navigation.insert(text.into(), next.into());
    }

    /// Elements with `text` disappear between being found and being acted on.
    pub fn mark_stale(&self, text: impl Into<String>) {
        self.state().stale_texts.insert(text.into());
    }

    pub fn fail_screenshots(&self, fail: bool) {
        self.state().fail_screenshots = fail;
    }

    pub fn fail_install(&self, fail: bool) {
        self.state().fail_install = fail;
    }

    pub fn fail_launch(&self, fail: bool) {
        self.state().fail_launch = fail;
    }

    pub fn interactions(&self) -> Vec<Interaction> {
        self.state().interactions.clone()
    }

    /// Signatures of clicked elements, in order.
    pub fn clicks(&self) -> Vec<ElementSignature> {
        self.state()
            .interactions
            .iter()
            .filter_map(|i| match i {
                Interaction::Click(sig) => Some(sig.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn back_presses(&self) -> usize {
        self.count(|i| matches!(i, Interaction::Back))
    }

    pub fn screenshots(&self) -> usize {
        self.count(|i| matches!(i, Interaction::Screenshot(_)))
    }

    /// Number of hierarchy dumps served so far.
    pub fn dump_count(&self) -> u64 {
        self.state().dumps
    }

    fn count(&self, pred: impl Fn(&Interaction) -> bool) -> usize {
        self.state().interactions.iter().filter(|i| pred(i)).count()
    }

    fn record(&self, interaction: Interaction) {
        self.state().interactions.push(interaction);
    }

    fn current_screen(&self) -> Option<String> {
        self.state().screens.front().cloned().flatten()
    }

    fn check_not_stale(&self, element: &UiElement) -> Result<(), DeviceError> {
        if self.state().stale_texts.contains(&element.text) {
            return Err(DeviceError::StaleElement {
                signature: element.signature().to_string(),
            });
        }
        Ok(())
    }
}

impl Device for ScriptedDevice {
    fn dump_hierarchy(&self) -> Result<String, DeviceError> {
        let mut state = self.state();
        state.dumps += 1;
        let next = if state.screens.len() > 1 {
            state.screens.pop_front().flatten()
        } else {
            state.screens.front().cloned().flatten()
        };
        next.ok_or_else(|| DeviceError::NoHierarchy {
            reason: "scripted dump failure".to_string(),
        })
    }

    fn exists(&self, element: &UiElement) -> bool {
        if self.check_not_stale(element).is_err() {
            return false;
        }
        self.current_screen()
            .and_then(|xml| parse_hierarchy(&xml).ok())
            .map(|elements| elements.iter().any(|e| e == element))
            .unwrap_or(false)
    }

    fn click(&self, element: &UiElement) -> Result<(), DeviceError> {
        self.check_not_stale(element)?;
        self.record(Interaction::Click(element.signature()));
        let next = self.state().navigation.get(&element.text).cloned();
        if let Some(next) = next {
            self.set_screen(next);
        }
        Ok(())
    }

    /// Replaces the field's text on the current screen, so later dumps show
    /// the typed value.
    fn set_text(&self, element: &UiElement, text: &str) -> Result<(), DeviceError> {
        self.check_not_stale(element)?;
        self.record(Interaction::SetText(element.signature(), text.to_string()));
        let mut state = self.state();
        if let Some(Some(xml)) = state.screens.front_mut() {
            if let Some(updated) = replace_node_text(xml, element, text) {
                *xml = updated;
            }
        }
        Ok(())
    }

    fn screenshot(&self, path: &Path) -> Result<(), DeviceError> {
        if self.state().fail_screenshots {
            return Err(DeviceError::Command {
                command: "screencap".to_string(),
                output: "scripted screenshot failure".to_string(),
            });
        }
        std::fs::write(path, b"\x89PNG\r\n\x1a\n")?;
        self.record(Interaction::Screenshot(path.to_path_buf()));
        Ok(())
    }

    fn screen_size(&self) -> Result<ScreenSize, DeviceError> {
        Ok(self.screen_size)
    }

    fn press_back(&self) -> Result<(), DeviceError> {
        self.record(Interaction::Back);
        Ok(())
    }
}

impl AppManager for ScriptedDevice {
    fn install(&self, apk: &Path) -> Result<(), DeviceError> {
        if self.state().fail_install {
            return Err(DeviceError::Command {
                command: "install".to_string(),
                output: "Failure [INSTALL_FAILED_INVALID_APK]".to_string(),
            });
        }
        self.record(Interaction::Install(apk.to_path_buf()));
        Ok(())
    }

    fn uninstall(&self, package: &str) -> Result<(), DeviceError> {
        self.record(Interaction::Uninstall(package.to_string()));
        Ok(())
    }

    fn launch(&self, package: &str) -> Result<(), DeviceError> {
        if self.state().fail_launch {
            return Err(DeviceError::Command {
                command: "monkey".to_string(),
                output: "No activities found to run".to_string(),
            });
        }
        self.record(Interaction::Launch(package.to_string()));
        Ok(())
    }
}

impl SystemProxy for ScriptedDevice {
    fn set_http_proxy(&self, host: &str, port: u16) -> Result<(), DeviceError> {
        self.record(Interaction::ProxySet(format!("{host}:{port}")));
        Ok(())
    }

    fn clear_http_proxy(&self) -> Result<(), DeviceError> {
        self.record(Interaction::ProxyCleared);
        Ok(())
    }
}

fn text_attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\stext="[^"]*""#).expect("text attribute pattern"))
}

/// `xml` with the `text` attribute of the node equal to `element` set to
/// `text`, or None if no such node is on screen.
fn replace_node_text(xml: &str, element: &UiElement, text: &str) -> Option<String> {
    let (span, _) = parse_hierarchy_spans(xml)
        .ok()?
        .into_iter()
        .find(|(_, e)| e == element)?;
    let tag = &xml[span.clone()];
    let attr = format!(r#" text="{}""#, escape_attribute(text));
    let tag = match text_attr_re().find(tag) {
        Some(m) => format!("{}{attr}{}", &tag[..m.start()], &tag[m.end()..]),
        None => tag.replacen("<node", &format!("<node{attr}"), 1),
    };
    Some(format!("{}{tag}{}", &xml[..span.start], &xml[span.end..]))
}

fn escape_attribute(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
