//! The exploration decision engine.
//!
//! Each [`ExplorationEngine::step`] evaluates the handlers in a fixed
//! priority order and performs at most one UI action:
//!
//! 1. permission popup "allow" button
//! 2. unvisited text field (type a pool value, then confirm)
//! 3. unvisited bottom-navigation tab in the bottom band of the screen
//! 4. unvisited tab-like widget
//! 5. any other unvisited clickable element
//! 6. idle fallback: "back" and forget the visited set
//!
//! The first handler that finds a candidate owns the step. If its
//! interaction fails (the element went stale), the step is a no-op and the
//! next call starts again from handler 1.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use droidprobe_device::device::Device;
use droidprobe_ui::selector::Selector;
use droidprobe_ui::types::{ElementSignature, UiElement};

use crate::action::{ExploreAction, HandlerKind};
use crate::clock::{Clock, SystemClock};
use crate::policy::{ExplorePolicy, KeywordPolicy, PolicyConfig};
use crate::trace::{ActionTrace, ExploreSummary};

/// Engine tuning. Matching keywords live in `policy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExploreConfig {
    /// Seconds without a successful action before the idle fallback fires.
    pub idle_for_back_press_secs: f64,
    /// Wait between focusing a text field and typing into it.
    pub focus_settle_secs: f64,
    /// Wait between typing and looking for a confirmation button.
    pub confirm_settle_secs: f64,
    /// Fraction of the screen height where the bottom-navigation band starts.
    pub bottom_band_start: f64,
    pub policy: PolicyConfig,
}

impl ExploreConfig {
    pub fn idle_for_back_press(&self) -> Duration {
        Duration::from_secs_f64(self.idle_for_back_press_secs)
    }

    pub fn focus_settle(&self) -> Duration {
        Duration::from_secs_f64(self.focus_settle_secs)
    }

    pub fn confirm_settle(&self) -> Duration {
        Duration::from_secs_f64(self.confirm_settle_secs)
    }
}

impl Default for ExploreConfig {
    fn default() -> Self {
        Self {
            idle_for_back_press_secs: 15.0,
            focus_settle_secs: 0.5,
            confirm_settle_secs: 1.0,
            bottom_band_start: 0.85,
            policy: PolicyConfig::default(),
        }
    }
}

/// Mutable exploration state, owned by exactly one engine.
#[derive(Debug, Clone)]
pub struct ExplorationState {
    visited: HashSet<ElementSignature>,
    last_action: Instant,
    idle_threshold: Duration,
}

impl ExplorationState {
    fn new(now: Instant, idle_threshold: Duration) -> Self {
        Self {
            visited: HashSet::new(),
            last_action: now,
            idle_threshold,
        }
    }

    pub fn is_visited(&self, signature: &ElementSignature) -> bool {
        self.visited.contains(signature)
    }

    pub fn visited_len(&self) -> usize {
        self.visited.len()
    }

    pub fn last_action(&self) -> Instant {
        self.last_action
    }

    pub fn idle_threshold(&self) -> Duration {
        self.idle_threshold
    }

    fn is_idle(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_action) > self.idle_threshold
    }
}

/// Result of evaluating a single handler.
enum Handled {
    /// No candidate; try the next handler.
    Pass,
    /// Candidate found and acted on.
    Acted(ExploreAction),
    /// Candidate found but the interaction failed; end the step.
    NoOp,
}

enum Interaction<'t> {
    Click,
    SetText(&'t str),
}

type Handler<D, P, C> = fn(&mut ExplorationEngine<D, P, C>, &[UiElement]) -> Handled;

pub struct ExplorationEngine<D: Device, P: ExplorePolicy = KeywordPolicy, C: Clock = SystemClock> {
    device: Arc<D>,
    policy: P,
    clock: C,
    config: ExploreConfig,
    state: ExplorationState,
    trace: ActionTrace,
    step_counter: u64,
}

impl<D: Device> ExplorationEngine<D, KeywordPolicy, SystemClock> {
    /// Engine with the keyword policy from `config` and the wall clock.
    pub fn from_config(
        device: Arc<D>,
        config: ExploreConfig,
    ) -> Result<Self, crate::policy::PolicyError> {
        let policy = KeywordPolicy::from_config(&config.policy)?;
        Ok(Self::new(device, policy, SystemClock, config))
    }
}

impl<D: Device, P: ExplorePolicy, C: Clock> ExplorationEngine<D, P, C> {
    pub fn new(device: Arc<D>, policy: P, clock: C, config: ExploreConfig) -> Self {
        let state = ExplorationState::new(clock.now(), config.idle_for_back_press());
        Self {
            device,
            policy,
            clock,
            config,
            state,
            trace: ActionTrace::new(),
            step_counter: 0,
        }
    }

    pub fn state(&self) -> &ExplorationState {
        &self.state
    }

    pub fn trace(&self) -> &ActionTrace {
        &self.trace
    }

    pub fn summary(&self) -> ExploreSummary {
        let by_handler = self.trace.counts();
        ExploreSummary {
            steps: self.step_counter,
            actions: self.trace.len() as u64,
            back_presses: by_handler.get(&HandlerKind::IdleBack).copied().unwrap_or(0),
            by_handler,
            visited: self.state.visited_len(),
        }
    }

    /// Perform at most one UI action. Returns the action taken, if any.
    pub fn step(&mut self) -> Option<ExploreAction> {
        self.step_counter += 1;

        let elements = match self.device.find_elements(&Selector::new()) {
            Ok(elements) => elements,
            Err(e) => {
                debug!(error = %e, "no hierarchy this step");
                Vec::new()
            }
        };

        let handlers: [Handler<D, P, C>; 5] = [
            Self::handle_permission_popup,
            Self::handle_text_input,
            Self::handle_bottom_navigation,
            Self::handle_tab,
            Self::handle_clickable,
        ];

        for handler in handlers {
            match handler(self, &elements) {
                Handled::Pass => continue,
                Handled::Acted(action) => return Some(self.finish(action)),
                Handled::NoOp => return None,
            }
        }

        self.handle_idle().map(|action| self.finish(action))
    }

    fn finish(&mut self, action: ExploreAction) -> ExploreAction {
        self.trace.record(self.step_counter, action.clone());
        action
    }

    fn unvisited(&self, element: &UiElement) -> bool {
        !self.state.is_visited(&element.signature())
    }

    /// Re-check, act, and on success mark the element visited.
    fn perform(&mut self, element: &UiElement, interaction: Interaction<'_>) -> bool {
        if !self.device.exists(element) {
            debug!(element = %element.signature(), "element went stale before acting");
            return false;
        }

        let result = match interaction {
            Interaction::Click => self.device.click(element),
            Interaction::SetText(text) => self.device.set_text(element, text),
        };

        match result {
            Ok(()) => {
                self.state.visited.insert(element.signature());
                self.state.last_action = self.clock.now();
                true
            }
            Err(e) if e.is_stale() => {
                debug!(error = %e, "element went stale while acting");
                false
            }
            Err(e) => {
                warn!(error = %e, element = %element.signature(), "interaction failed");
                false
            }
        }
    }

    fn click_outcome(
        &mut self,
        element: &UiElement,
        action: impl FnOnce(ElementSignature) -> ExploreAction,
    ) -> Handled {
        if self.perform(element, Interaction::Click) {
            Handled::Acted(action(element.signature()))
        } else {
            Handled::NoOp
        }
    }

    fn handle_permission_popup(&mut self, elements: &[UiElement]) -> Handled {
        let Some(allow) = elements
            .iter()
            .find(|e| e.clickable && self.policy.is_permission_allow(e))
        else {
            return Handled::Pass;
        };

        info!(element = %allow.signature(), "permission popup detected, allowing");
        self.click_outcome(allow, |element| ExploreAction::PermissionAllowed { element })
    }

    fn handle_text_input(&mut self, elements: &[UiElement]) -> Handled {
        let Some(field) = elements
            .iter()
            .find(|e| self.policy.is_text_input(e) && self.unvisited(e))
        else {
            return Handled::Pass;
        };

        let pool = self.policy.input_pool();
        let text = match pool.len() {
            0 => String::new(),
            n => pool[self.state.visited_len() % n].clone(),
        };
        info!(element = %field.signature(), text = %text, "filling text field");

        // Focus first; some fields ignore input until focused.
        if let Err(e) = self.device.click(field) {
            debug!(error = %e, "could not focus text field");
            return Handled::NoOp;
        }
        self.clock.sleep(self.config.focus_settle());

        if !self.perform(field, Interaction::SetText(&text)) {
            return Handled::NoOp;
        }
        self.clock.sleep(self.config.confirm_settle());

        let confirmed = self.click_confirm();
        Handled::Acted(ExploreAction::TextEntered {
            element: field.signature(),
            text,
            confirmed,
        })
    }

    /// Click the first confirmation button on the current screen, if any.
    /// Confirmation buttons are not deduplicated.
    fn click_confirm(&mut self) -> Option<ElementSignature> {
        let elements = self.device.find_elements(&Selector::new().clickable(true)).ok()?;
        let button = elements.iter().find(|e| self.policy.is_confirm(e))?;
        info!(element = %button.signature(), "clicking confirmation button");
        match self.device.click(button) {
            Ok(()) => Some(button.signature()),
            Err(e) => {
                debug!(error = %e, "confirmation click failed");
                None
            }
        }
    }

    /// Y coordinate where the bottom band starts, if the screen size is known.
    fn band_start(&self) -> Option<f64> {
        match self.device.screen_size() {
            Ok(size) => Some(size.band_start(self.config.bottom_band_start)),
            Err(e) => {
                debug!(error = %e, "screen size unavailable");
                None
            }
        }
    }

    fn handle_bottom_navigation(&mut self, elements: &[UiElement]) -> Handled {
        let Some(band_start) = self.band_start() else {
            return Handled::Pass;
        };

        // Keyword order first, document order within a keyword.
        let target = elements
            .iter()
            .filter(|e| e.clickable && f64::from(e.bounds.top) >= band_start)
            .filter_map(|e| self.policy.bottom_nav_rank(e).map(|rank| (rank, e)))
            .filter(|(_, e)| self.unvisited(e))
            .min_by_key(|(rank, _)| *rank)
            .map(|(_, e)| e);

        let Some(tab) = target else {
            return Handled::Pass;
        };

        info!(element = %tab.signature(), "opening bottom navigation tab");
        self.click_outcome(tab, |element| ExploreAction::BottomNavOpened { element })
    }

    fn handle_tab(&mut self, elements: &[UiElement]) -> Handled {
        let Some(tab) = elements
            .iter()
            .find(|e| e.clickable && self.policy.is_tab(e) && self.unvisited(e))
        else {
            return Handled::Pass;
        };

        info!(element = %tab.signature(), "opening tab");
        self.click_outcome(tab, |element| ExploreAction::TabOpened { element })
    }

    fn handle_clickable(&mut self, elements: &[UiElement]) -> Handled {
        // Bottom-nav labels already in the band are handler 3's business.
        let band_start = self.band_start();
        let in_nav_band = |e: &UiElement| match band_start {
            Some(start) => f64::from(e.bounds.top) > start,
            None => false,
        };

        let Some(target) = elements.iter().find(|e| {
            e.clickable
                && !self.policy.is_text_input(e)
                && !self.policy.is_system_ui(e)
                && !(self.policy.bottom_nav_rank(e).is_some() && in_nav_band(e))
                && self.unvisited(e)
        }) else {
            return Handled::Pass;
        };

        info!(element = %target.signature(), "clicking element");
        self.click_outcome(target, |element| ExploreAction::Clicked { element })
    }

    fn handle_idle(&mut self) -> Option<ExploreAction> {
        let now = self.clock.now();
        if !self.state.is_idle(now) {
            return None;
        }

        info!(
            idle_secs = now.saturating_duration_since(self.state.last_action).as_secs_f64(),
            "nothing new to explore, pressing back"
        );
        if let Err(e) = self.device.press_back() {
            warn!(error = %e, "back press failed");
            return None;
        }

        let forgotten = self.state.visited.len();
        self.state.visited.clear();
        self.state.last_action = now;
        Some(ExploreAction::BackPressed { forgotten })
    }
}
