//! Outgoing reply messages

use serde::Serialize;

/// A reply message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutgoingMessage {
    /// Plain text
    Text {
        /// Message body
        text: String,
    },
    /// Rich template
    Template {
        /// Fallback text for clients that cannot render templates
        #[serde(rename = "altText")]
        alt_text: String,
        /// Template body
        template: Template,
    },
}

impl OutgoingMessage {
    /// Plain text message.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Template body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Template {
    /// Horizontally paged columns
    Carousel(CarouselTemplate),
}

/// Carousel template
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CarouselTemplate {
    /// Columns in display order
    pub columns: Vec<CarouselColumn>,
}

/// One carousel page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarouselColumn {
    /// Image shown on top of the column
    pub thumbnail_image_url: String,
    /// Bold title line
    pub title: String,
    /// Body text
    pub text: String,
    /// Buttons: view source, accept, reject
    pub actions: [TemplateAction; 3],
}

/// Button attached to a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TemplateAction {
    /// Opens a URL
    Uri {
        /// Button label
        label: String,
        /// Target URL
        uri: String,
    },
    /// Sends opaque data back as a postback event
    Postback {
        /// Button label
        label: String,
        /// Echoed data
        data: String,
        /// Text shown in the chat on tap
        #[serde(rename = "displayText", skip_serializing_if = "Option::is_none")]
        display_text: Option<String>,
    },
    /// Sends a text message as the user
    Message {
        /// Button label
        label: String,
        /// Message text
        text: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_carousel_wire_shape() -> Result<(), serde_json::Error> {
        let message = OutgoingMessage::Template {
            alt_text: "alt".to_string(),
            template: Template::Carousel(CarouselTemplate {
                columns: vec![CarouselColumn {
                    thumbnail_image_url: "https://t".to_string(),
                    title: "title".to_string(),
                    text: "text".to_string(),
                    actions: [
                        TemplateAction::Uri {
                            label: "open".to_string(),
                            uri: "https://s".to_string(),
                        },
                        TemplateAction::Postback {
                            label: "ok".to_string(),
                            data: "d".to_string(),
                            display_text: None,
                        },
                        TemplateAction::Message {
                            label: "ng".to_string(),
                            text: "ng".to_string(),
                        },
                    ],
                }],
            }),
        };

        assert_eq!(
            serde_json::to_value(&message)?,
            json!({
                "type": "template",
                "altText": "alt",
                "template": {
                    "type": "carousel",
                    "columns": [{
                        "thumbnailImageUrl": "https://t",
                        "title": "title",
                        "text": "text",
                        "actions": [
                            {"type": "uri", "label": "open", "uri": "https://s"},
                            {"type": "postback", "label": "ok", "data": "d"},
                            {"type": "message", "label": "ng", "text": "ng"}
                        ]
                    }]
                }
            })
        );
        Ok(())
    }

    #[test]
    fn test_text_wire_shape() -> Result<(), serde_json::Error> {
        assert_eq!(
            serde_json::to_value(OutgoingMessage::text("hi"))?,
            json!({"type": "text", "text": "hi"})
        );
        Ok(())
    }
}
