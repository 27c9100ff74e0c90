//! Block Kit views opened by the bot.
//!
//! Only the two block types the bot needs are modelled.

use crate::config::APP_NAME;
use serde::Serialize;

/// Surface a view is rendered on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    /// Dialog opened from an interaction
    Modal,
    /// App Home tab
    Home,
}

/// Text composition object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    /// Unformatted text
    PlainText {
        /// Content
        text: String,
    },
    /// Slack markdown
    Mrkdwn {
        /// Content
        text: String,
    },
}

impl TextObject {
    fn plain(text: &str) -> Self {
        Self::PlainText {
            text: text.to_string(),
        }
    }

    fn mrkdwn(text: &str) -> Self {
        Self::Mrkdwn {
            text: text.to_string(),
        }
    }
}

/// Layout block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    /// Paragraph of text
    Section {
        /// Body
        text: TextObject,
    },
    /// Small secondary text
    Context {
        /// Items shown side by side
        elements: Vec<TextObject>,
    },
}

/// A modal or home view payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct View {
    /// Surface type
    #[serde(rename = "type")]
    pub kind: ViewKind,
    /// Modal title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<TextObject>,
    /// Modal close button label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close: Option<TextObject>,
    /// Content
    pub blocks: Vec<Block>,
}

impl View {
    fn modal(blocks: Vec<Block>) -> Self {
        Self {
            kind: ViewKind::Modal,
            title: Some(TextObject::plain(APP_NAME)),
            close: Some(TextObject::plain("Close")),
            blocks,
        }
    }

    fn home(blocks: Vec<Block>) -> Self {
        Self {
            kind: ViewKind::Home,
            title: None,
            close: None,
            blocks,
        }
    }
}

fn section(text: &str) -> Block {
    Block::Section {
        text: TextObject::mrkdwn(text),
    }
}

/// Home tab for a user with a registered key
#[must_use]
pub fn home_configured() -> View {
    View::home(vec![section(
        "You have configured the Reality Defender app already. You can use this app to analyze \
         certain file types for content authenticity. If for any reason the app does not work as \
         expected, you can always re-add your API key using the /setup-rd command.",
    )])
}

/// Home tab for a user without a key
#[must_use]
pub fn home_first_boot() -> View {
    View::home(vec![section(
        "Use the /setup-rd command to add your Reality Defender API key and start using the app.",
    )])
}

/// Modal shown when the requester has no key
#[must_use]
pub fn user_unavailable() -> View {
    View::modal(vec![section(
        "You need to add your Reality Defender API key before you can use this bot.",
    )])
}

/// Modal confirming the media was submitted
#[must_use]
pub fn analysis_acknowledged() -> View {
    View::modal(vec![
        section(
            "Your content is being analyzed by Reality Defender and the results will be sent to \
             you shortly.",
        ),
        Block::Context {
            elements: vec![TextObject::mrkdwn(
                "This runs in the background and you can continue using Slack while it's \
                 processing.",
            )],
        },
    ])
}

/// Modal shown when the message has nothing to analyse
#[must_use]
pub fn unsupported_content() -> View {
    View::modal(vec![section(
        "There are no supported file types for analysis attached to this message. Please try \
         again with a different file type.",
    )])
}

/// Modal shown when a download or submission failed
#[must_use]
pub fn analysis_failed() -> View {
    View::modal(vec![section(
        "There has been an error while uploading a file for analysis.",
    )])
}
