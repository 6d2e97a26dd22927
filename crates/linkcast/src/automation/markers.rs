//! UI markers used to drive the generation service.
//!
//! The service has no API, so every step keys off text or CSS markers in
//! its (Japanese-locale) UI. They live in configuration so a UI change can
//! be absorbed without a rebuild.

use serde::{Deserialize, Serialize};

use crate::jobs::MediaKind;

/// W3C WebDriver locator strategy and value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub using: &'static str,
    pub value: String,
}

/// How to find an element on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    Css(String),
    /// Element whose own text equals the value, whitespace-normalized.
    Text(String),
    /// Element whose own text contains the value.
    ContainsText(String),
    Xpath(String),
}

impl Selector {
    pub fn css(s: &str) -> Self {
        Selector::Css(s.to_string())
    }

    pub fn text(s: &str) -> Self {
        Selector::Text(s.to_string())
    }

    pub fn contains_text(s: &str) -> Self {
        Selector::ContainsText(s.to_string())
    }

    pub fn to_locator(&self) -> Locator {
        match self {
            Selector::Css(css) => Locator {
                using: "css selector",
                value: css.clone(),
            },
            Selector::Text(text) => Locator {
                using: "xpath",
                value: format!(
                    ".//*[normalize-space(text())={}]",
                    xpath_literal(text.trim())
                ),
            },
            Selector::ContainsText(text) => Locator {
                using: "xpath",
                value: format!(".//*[contains(text(),{})]", xpath_literal(text)),
            },
            Selector::Xpath(xpath) => Locator {
                using: "xpath",
                value: xpath.clone(),
            },
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Css(s) => write!(f, "css `{}`", s),
            Selector::Text(s) => write!(f, "text \"{}\"", s),
            Selector::ContainsText(s) => write!(f, "text containing \"{}\"", s),
            Selector::Xpath(s) => write!(f, "xpath `{}`", s),
        }
    }
}

/// Quotes a string as an XPath 1.0 literal.
///
/// XPath has no escape sequences, so a value containing both quote kinds
/// is assembled with `concat()`.
pub fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        return format!("'{}'", s);
    }
    if !s.contains('"') {
        return format!("\"{}\"", s);
    }
    let parts: Vec<String> = s.split('\'').map(|p| format!("'{}'", p)).collect();
    format!("concat({})", parts.join(", \"'\", "))
}

/// Markers for one kind of generated media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationMarkers {
    /// Button that starts generation.
    pub trigger: Selector,
    /// Shown while generation runs; its disappearance means done.
    pub in_progress: Selector,
    /// Finished artifact entry holding the download action.
    pub artifact_card: Selector,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiMarkers {
    pub home_url: String,
    /// Host the service redirects to when the browser profile is signed out.
    pub sign_in_host: String,
    pub create_workspace: Selector,
    pub source_type_website: Selector,
    pub source_url_input: Selector,
    pub source_submit: Selector,
    /// Appears once the attached source has been ingested.
    pub source_ready: Selector,
    /// Searched within an artifact card.
    pub download_action: Selector,
    pub audio: GenerationMarkers,
    pub video: GenerationMarkers,
}

impl UiMarkers {
    pub fn generation(&self, kind: MediaKind) -> &GenerationMarkers {
        match kind {
            MediaKind::Audio => &self.audio,
            MediaKind::Video => &self.video,
        }
    }
}

fn artifact_card(label: &str) -> Selector {
    Selector::Xpath(format!(
        "//*[contains(@class,'artifact')][.//*[contains(text(),{})]]",
        xpath_literal(label)
    ))
}

impl Default for UiMarkers {
    fn default() -> Self {
        Self {
            home_url: "https://notebooklm.google.com".to_string(),
            sign_in_host: "accounts.google.com".to_string(),
            create_workspace: Selector::css("button[aria-label=\"ノートブックを新規作成\"]"),
            source_type_website: Selector::text("ウェブサイト"),
            source_url_input: Selector::css("textarea.mat-mdc-input-element"),
            source_submit: Selector::Xpath(
                "//button[contains(normalize-space(.),'挿入')]".to_string(),
            ),
            source_ready: Selector::text("1 ソース"),
            download_action: Selector::text("ダウンロード"),
            audio: GenerationMarkers {
                trigger: Selector::text("音声解説"),
                in_progress: Selector::contains_text("音声解説を生成しています"),
                artifact_card: artifact_card("音声解説"),
            },
            video: GenerationMarkers {
                trigger: Selector::text("動画解説"),
                in_progress: Selector::contains_text("動画解説を生成しています"),
                artifact_card: artifact_card("動画解説"),
            },
        }
    }
}
