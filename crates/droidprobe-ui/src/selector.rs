use regex::Regex;

use crate::types::UiElement;

/// How a selector field compares against an element attribute.
#[derive(Debug, Clone)]
pub enum TextMatch {
    Exact(String),
    /// Whole-value regex match, like uiautomator's `*Matches` selectors.
    Pattern(Regex),
}

impl TextMatch {
    pub fn exact(value: impl Into<String>) -> Self {
        TextMatch::Exact(value.into())
    }

    /// Compile `pattern` anchored at both ends.
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(TextMatch::Pattern(Regex::new(&format!("^(?:{pattern})$"))?))
    }

    pub fn is_match(&self, value: &str) -> bool {
        match self {
            TextMatch::Exact(expected) => expected == value,
            TextMatch::Pattern(re) => re.is_match(value),
        }
    }
}

/// Element query. Unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct Selector {
    pub class_name: Option<TextMatch>,
    pub resource_id: Option<TextMatch>,
    pub text: Option<TextMatch>,
    pub clickable: Option<bool>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class_name(mut self, m: TextMatch) -> Self {
        self.class_name = Some(m);
        self
    }

    pub fn resource_id(mut self, m: TextMatch) -> Self {
        self.resource_id = Some(m);
        self
    }

    pub fn text(mut self, m: TextMatch) -> Self {
        self.text = Some(m);
        self
    }

    pub fn clickable(mut self, clickable: bool) -> Self {
        self.clickable = Some(clickable);
        self
    }

    pub fn matches(&self, element: &UiElement) -> bool {
        let field_ok = |m: &Option<TextMatch>, value: &str| {
            m.as_ref().map(|m| m.is_match(value)).unwrap_or(true)
        };

        field_ok(&self.class_name, &element.class_name)
            && field_ok(&self.resource_id, &element.resource_id)
            && field_ok(&self.text, &element.text)
            && self.clickable.map(|c| c == element.clickable).unwrap_or(true)
    }

    /// Filter `elements` down to the matches, preserving order.
    pub fn filter<'a>(&self, elements: &'a [UiElement]) -> Vec<&'a UiElement> {
        elements.iter().filter(|e| self.matches(e)).collect()
    }
}
