//! Instruction text for the decoding task

use itertools::Itertools;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant. You first think about the \
reasoning process in the mind and then provide the user with the answer.";

/// Task statement. The missing space after the first sentence is part of the
/// published dataset text and is kept verbatim.
pub const TASK_INSTRUCTION: &str = "Use the decoder in the image to decode a coded message.\
The decoded message will be one or more words. Underscore characters \
(\"_\") in the coded message should be mapped to a space (\" \") when decoding.";

pub const ASSISTANT_PREFIX: &str = "Let me solve this step by step.\n<think>";

/// Formats the prompt parts of a conversation.
pub trait PromptFormatter {
    fn system_prompt(&self) -> String;

    /// Full user instruction for a (spaced) coded message.
    fn format_instruction(&self, coded_message: &str) -> String;

    /// Opening of the assistant turn that the model continues from.
    fn assistant_prefix(&self) -> String;
}

/// R1-style template: think, chars and answer tags.
#[derive(Debug, Default, Clone, Copy)]
pub struct R1PromptFormatter;

impl PromptFormatter for R1PromptFormatter {
    fn system_prompt(&self) -> String {
        SYSTEM_PROMPT.to_string()
    }

    fn format_instruction(&self, coded_message: &str) -> String {
        let ending = format!(
            "Show your work in <think> </think> tags and return the answer in <answer> </answer> tags. \
            While thinking, you must include a section with the decoded characters using <chars></chars> tags. \
            The <chars> section should include the decoded characters in the order they are decoded. It should include the \
            underscore character wherever there is a space in the decoded message. For example, if the coded message is \
            a b c _ d e f, the chars section might be <chars> c a t _ d o g </chars>. You can think about the problem for \
            as long as you'd like. While thinking, you should robustly verify your solution. Once you are done thinking, \
            provide your answer in the <answer> section, e.g. <answer> cat dog </answer>. The coded message is: {coded_message}."
        );
        format!("{TASK_INSTRUCTION} {ending}")
    }

    fn assistant_prefix(&self) -> String {
        ASSISTANT_PREFIX.to_string()
    }
}

/// Put a single space between characters so tokenizers see one symbol per token.
pub fn space_characters(text: &str) -> String {
    text.chars().join(" ")
}
