//! Matching policies for the exploration handlers.
//!
//! The engine only asks "does this element satisfy handler N's predicate";
//! which keywords and patterns answer that lives here, so new locales or
//! targets extend a [`PolicyConfig`] (or implement [`ExplorePolicy`])
//! without touching the engine.

use serde::{Deserialize, Serialize};

use droidprobe_ui::selector::TextMatch;
use droidprobe_ui::types::UiElement;

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("invalid {field} pattern: {source}")]
    Pattern {
        field: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("input pool must contain at least one value")]
    EmptyInputPool,
}

/// Predicates backing each priority handler of the exploration engine.
pub trait ExplorePolicy: Send {
    /// Handler 1: the "allow" button of a system permission dialog.
    fn is_permission_allow(&self, element: &UiElement) -> bool;

    /// Handler 2: a text-entry field.
    fn is_text_input(&self, element: &UiElement) -> bool;

    /// Handler 2: a button that confirms a form after text entry.
    fn is_confirm(&self, element: &UiElement) -> bool;

    /// Handler 3: position of the element's label in the bottom-navigation
    /// keyword list, or None if it is not a navigation label.
    fn bottom_nav_rank(&self, element: &UiElement) -> Option<usize>;

    /// Handler 4: a tab-like widget.
    fn is_tab(&self, element: &UiElement) -> bool;

    /// Handler 5 exclusion: element belongs to the system UI.
    fn is_system_ui(&self, element: &UiElement) -> bool;

    /// Candidate values for text fields, cycled by visited-set size.
    fn input_pool(&self) -> &[String];
}

/// Keywords and patterns for [`KeywordPolicy`]. Patterns match whole values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub permission_allow_id: String,
    pub text_input_class: String,
    pub confirm_text: String,
    pub tab_class: String,
    pub bottom_nav_keywords: Vec<String>,
    pub system_ui_package: String,
    pub input_pool: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            permission_allow_id: ".*permission_allow_button.*".to_string(),
            text_input_class: "android.widget.EditText".to_string(),
            confirm_text: "(?i)登录|确定|下一步|完成|同意|搜索|发布|login|ok|next|done|agree|confirm|search|submit"
                .to_string(),
            tab_class: "(?i).*tab.*".to_string(),
            bottom_nav_keywords: [
                "首页", "钱包", "客服", "我的", "发现", "消息", "通讯录", "社区", "Home", "About",
                "Profile", "Wallet", "Community", "Message",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            system_ui_package: "com.android.systemui".to_string(),
            input_pool: ["testuser", "123456", "test@example.com", "My Test Note"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Regex/keyword policy for Android apps with Chinese or English UIs.
#[derive(Debug, Clone)]
pub struct KeywordPolicy {
    permission_allow_id: TextMatch,
    text_input_class: String,
    confirm_text: TextMatch,
    tab_class: TextMatch,
    bottom_nav_keywords: Vec<String>,
    system_ui_package: String,
    input_pool: Vec<String>,
}

impl KeywordPolicy {
    pub fn from_config(config: &PolicyConfig) -> Result<Self, PolicyError> {
        let compile = |field: &'static str, pattern: &str| {
            TextMatch::pattern(pattern).map_err(|source| PolicyError::Pattern { field, source })
        };

        if config.input_pool.is_empty() {
            return Err(PolicyError::EmptyInputPool);
        }

        Ok(Self {
            permission_allow_id: compile("permission_allow_id", &config.permission_allow_id)?,
            text_input_class: config.text_input_class.clone(),
            confirm_text: compile("confirm_text", &config.confirm_text)?,
            tab_class: compile("tab_class", &config.tab_class)?,
            bottom_nav_keywords: config.bottom_nav_keywords.clone(),
            system_ui_package: config.system_ui_package.clone(),
            input_pool: config.input_pool.clone(),
        })
    }
}

impl Default for KeywordPolicy {
    fn default() -> Self {
        Self::from_config(&PolicyConfig::default()).expect("default policy patterns are valid")
    }
}

impl ExplorePolicy for KeywordPolicy {
    fn is_permission_allow(&self, element: &UiElement) -> bool {
        self.permission_allow_id.is_match(&element.resource_id)
    }

    fn is_text_input(&self, element: &UiElement) -> bool {
        element.class_name == self.text_input_class
    }

    fn is_confirm(&self, element: &UiElement) -> bool {
        self.confirm_text.is_match(&element.text)
    }

    fn bottom_nav_rank(&self, element: &UiElement) -> Option<usize> {
        self.bottom_nav_keywords
            .iter()
            .position(|keyword| *keyword == element.text)
    }

    fn is_tab(&self, element: &UiElement) -> bool {
        self.tab_class.is_match(&element.class_name)
    }

    fn is_system_ui(&self, element: &UiElement) -> bool {
        !self.system_ui_package.is_empty() && element.package.contains(&self.system_ui_package)
    }

    fn input_pool(&self) -> &[String] {
        &self.input_pool
    }
}
