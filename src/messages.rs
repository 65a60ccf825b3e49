//! Conversational template wrapping each puzzle

use crate::example::{DecodingExample, ImageData};
use crate::mapping::CharMapping;
use crate::prompt::{space_characters, PromptFormatter};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One item of a message's content list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Image { image: ImageData },
    Text { text: String },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(image: ImageData) -> Self {
        Self::Image { image }
    }

    /// Value of the `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Image { .. } => "image",
            Self::Text { .. } => "text",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Image { .. } => None,
            Self::Text { text } => Some(text),
        }
    }

    pub fn as_image(&self) -> Option<&ImageData> {
        match self {
            Self::Image { image } => Some(image),
            Self::Text { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

impl Message {
    pub fn new(role: Role, content: Vec<ContentPart>) -> Self {
        Self { role, content }
    }
}

/// A fully formatted output row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct R1Record {
    pub messages: Vec<Message>,
    /// Coded message with characters separated by spaces.
    pub coded_message: String,
    pub mapping: CharMapping,
    /// Plain answer, not spaced: the model should reply with real words.
    pub decoded_message: String,
    pub task: String,
}

impl R1Record {
    fn parts(&self) -> impl Iterator<Item = &ContentPart> + '_ {
        self.messages.iter().flat_map(|m| m.content.iter())
    }

    /// The first image of the conversation, if any.
    pub fn image(&self) -> Option<&ImageData> {
        self.parts().find_map(ContentPart::as_image)
    }

    /// Rough on-disk payload size, used to cut parquet shards.
    pub fn payload_bytes(&self) -> usize {
        let text: usize = self.parts().filter_map(ContentPart::as_text).map(str::len).sum();
        let images: usize = self
            .parts()
            .filter_map(ContentPart::as_image)
            .map(ImageData::byte_len)
            .sum();
        let mapping: usize = self.mapping.iter().map(|(k, v)| k.len() + v.len()).sum();
        images
            + text
            + mapping
            + self.coded_message.len()
            + self.decoded_message.len()
            + self.task.len()
    }
}

/// Wrap a source example in the system / user / assistant conversation.
pub fn generate_r1_messages<P: PromptFormatter>(
    example: &DecodingExample,
    prompt_formatter: &P,
) -> R1Record {
    let coded_message = space_characters(&example.coded_message);
    let instruction = prompt_formatter.format_instruction(&coded_message);

    let messages = vec![
        Message::new(
            Role::System,
            vec![ContentPart::text(prompt_formatter.system_prompt())],
        ),
        Message::new(
            Role::User,
            vec![
                ContentPart::image(example.image.clone()),
                ContentPart::text(instruction),
            ],
        ),
        Message::new(
            Role::Assistant,
            vec![ContentPart::text(prompt_formatter.assistant_prefix())],
        ),
    ];

    R1Record {
        messages,
        coded_message,
        mapping: example.mapping.clone(),
        decoded_message: example.decoded_message.clone(),
        task: example.task.clone(),
    }
}
