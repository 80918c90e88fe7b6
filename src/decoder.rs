//! Reasoning block extraction from raw assistant replies
//!
//! The RAG prompt instructs the model to wrap its chain-of-thought inside
//! `<reasoning>...</reasoning>` tags ahead of the final answer. The decoder
//! splits the raw reply into the visible answer and the hidden reasoning
//! text. Decoding is deliberately lenient: a malformed block (opening tag
//! with no close) passes through untouched so a bad model reply can never
//! stall the message pipeline.

const REASONING_OPEN: &str = "<reasoning>";
const REASONING_CLOSE: &str = "</reasoning>";

/// A raw assistant reply split into visible answer and hidden reasoning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedReply {
    pub visible: String,
    pub reasoning: Option<String>,
}

/// Split a raw assistant reply into visible content and reasoning
///
/// At most one well-formed `<reasoning>...</reasoning>` block is
/// extracted; its trimmed inner text becomes `reasoning` and the trimmed
/// remainder becomes `visible`. Without a matched pair the input is
/// returned trimmed with `reasoning = None`. This function never fails.
pub fn decode(raw: &str) -> DecodedReply {
    let Some(open) = raw.find(REASONING_OPEN) else {
        return DecodedReply {
            visible: raw.trim().to_string(),
            reasoning: None,
        };
    };

    let inner_start = open + REASONING_OPEN.len();
    let Some(close) = raw[inner_start..].find(REASONING_CLOSE) else {
        // Unmatched opening tag: pass the text through unmodified.
        return DecodedReply {
            visible: raw.trim().to_string(),
            reasoning: None,
        };
    };

    let reasoning = raw[inner_start..inner_start + close].trim().to_string();
    let tail_start = inner_start + close + REASONING_CLOSE.len();
    let visible = format!("{}{}", &raw[..open], &raw[tail_start..])
        .trim()
        .to_string();

    DecodedReply {
        visible,
        reasoning: Some(reasoning),
    }
}
