//! Builds the upstream chat messages for a generation request.
//!
//! The composer is pure: URLs are embedded as `url` content parts for the
//! upstream to fetch, nothing is fetched here.

use crate::request::{Material, Platform};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Text { text: String },
    Url { url: String },
}

impl ChatMessage {
    fn user(content: MessageContent) -> Self {
        Self {
            role: "user".to_string(),
            content,
        }
    }

    fn with_urls(text: String, urls: &[String]) -> Self {
        let mut parts = vec![ContentPart::Text { text }];
        parts.extend(
            Material::non_empty_urls(urls)
                .into_iter()
                .map(|url| ContentPart::Url { url }),
        );
        Self::user(MessageContent::Parts(parts))
    }
}

fn source_instructions(platform: Platform) -> String {
    let name = platform.label();
    format!(
        "You are an intelligent and helpful assistant specialized in generating post for a {name} account. \
Your task is to create a post based on a given document. The post should be engaging, concise, and optimized for {name}'s format."
    )
}

const STYLE_FROM_URLS: &str = "Source Y: Analyze the urls content user's persona, format the previously generated post according the user's content persona and you must follow this specific rules \
If the urls content have lots of emojis and short sentences, your post should also have emojis and short sentences else remove all of the emoji and short sentences. \
If the urls content have long sentences, your post should also have long sentences. \
Also match the content punctuation, if user use a lot of punctuation follow along the use the punctuation.";

/// Compose the ordered message list: one source message, then at most one style message.
pub fn compose(platform: Platform, source: &Material, style: Option<&Material>) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);

    messages.push(match source {
        Material::Text(text) => ChatMessage::user(MessageContent::Text(format!(
            "{} Here is the content: {text}",
            source_instructions(platform)
        ))),
        Material::Urls(urls) => ChatMessage::with_urls(
            format!(
                "Source N: {} Please analyze the SOURCE url, YOU MUST NOT FOLLOW the post format, only get the content and generate the post.",
                source_instructions(platform)
            ),
            urls,
        ),
    });

    match style {
        Some(Material::Urls(urls)) if !Material::non_empty_urls(urls).is_empty() => {
            messages.push(ChatMessage::with_urls(STYLE_FROM_URLS.to_string(), urls));
        }
        Some(Material::Text(text)) if !text.trim().is_empty() => {
            messages.push(ChatMessage::user(MessageContent::Text(format!(
                "Source Y: Analyze the following text content's style and format. \
Format the previously generated post according to this style and format. \
Match elements like sentence length, emoji usage, punctuation style, and overall tone. \
Here's the reference text: {text}"
            ))));
        }
        _ => {}
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_source_is_a_single_plain_message() {
        let msgs = compose(Platform::Twitter, &Material::Text("my article".to_string()), None);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].role, "user");
        let MessageContent::Text(text) = &msgs[0].content else {
            panic!("expected plain text content");
        };
        assert!(text.contains("Twitter"));
        assert!(text.ends_with("my article"));
    }

    #[test]
    fn url_source_embeds_each_url_as_a_part() {
        let urls = vec!["https://a.example".to_string(), "https://b.example".to_string()];
        let msgs = compose(Platform::Blog, &Material::Urls(urls), None);
        let MessageContent::Parts(parts) = &msgs[0].content else {
            panic!("expected multi-part content");
        };
        assert_eq!(parts.len(), 3);
        assert!(matches!(&parts[0], ContentPart::Text { text } if text.starts_with("Source N:")));
        assert_eq!(
            parts[2],
            ContentPart::Url {
                url: "https://b.example".to_string()
            }
        );
    }

    #[test]
    fn style_message_cases() {
        let source = Material::Text("body".to_string());

        let with_urls = compose(
            Platform::Facebook,
            &source,
            Some(&Material::Urls(vec!["https://me.example".to_string()])),
        );
        assert_eq!(with_urls.len(), 2);
        assert!(matches!(with_urls[1].content, MessageContent::Parts(_)));

        let with_text = compose(Platform::Facebook, &source, Some(&Material::Text("terse".to_string())));
        assert_eq!(with_text.len(), 2);
        assert!(matches!(&with_text[1].content, MessageContent::Text(t) if t.ends_with("terse")));

        assert_eq!(compose(Platform::Facebook, &source, Some(&Material::Text(" ".into()))).len(), 1);
        assert_eq!(compose(Platform::Facebook, &source, Some(&Material::Urls(vec![]))).len(), 1);
        assert_eq!(compose(Platform::Facebook, &source, None).len(), 1);
    }

    #[test]
    fn wire_shape() {
        let msgs = compose(
            Platform::Linkedin,
            &Material::Urls(vec!["https://a.example".to_string()]),
            None,
        );
        let v = serde_json::to_value(&msgs).unwrap();
        assert_eq!(v[0]["content"][0]["type"], "text");
        assert_eq!(v[0]["content"][1]["type"], "url");
        assert_eq!(v[0]["content"][1]["url"], "https://a.example");
    }
}
