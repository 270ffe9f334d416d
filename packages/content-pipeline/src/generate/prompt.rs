//! Prompt rendering with a deterministic character budget.

use crate::types::generation::{GenerationRequest, ModelParams};
use crate::types::record::ExtractionRecord;

/// Template used when a target carries no override.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "\
You are an assistant that writes concise, factual summaries of web pages \
for sales research.

Page title: {title}
Source: {url}

Content:
{body}

Write a concise summary of the page above. Stick to what the content \
states explicitly; do not speculate.";

const BODY_PLACEHOLDER: &str = "{body}";

/// Render a completion request from a record and template.
///
/// Placeholders: `{title}`, `{url}`, `{body}`, `{field:NAME}`. When the
/// rendered prompt would exceed `budget` characters, the body substitution
/// is cut so the final prompt is exactly `budget` characters long and the
/// request is marked truncated. Cuts are by character count, never by
/// word boundary, so rendering is deterministic.
pub fn build_request(
    record: &ExtractionRecord,
    template: &str,
    params: ModelParams,
    budget: usize,
) -> GenerationRequest {
    let mut scaffold = template
        .replace("{title}", &record.title)
        .replace("{url}", &record.source_url);
    for field in &record.fields {
        scaffold = scaffold.replace(&format!("{{field:{}}}", field.name), &field.value);
    }

    let slots = scaffold.matches(BODY_PLACEHOLDER).count();
    if slots == 0 {
        let (prompt, truncated) = cap_chars(scaffold, budget);
        return GenerationRequest {
            prompt,
            params,
            truncated,
        };
    }

    let scaffold_chars =
        scaffold.chars().count() - slots * BODY_PLACEHOLDER.chars().count();
    let available = budget.saturating_sub(scaffold_chars) / slots;

    let body_chars = record.body.chars().count();
    let (body_slice, body_cut) = if body_chars > available {
        (record.body.chars().take(available).collect(), true)
    } else {
        (record.body.clone(), false)
    };

    let prompt = scaffold.replace(BODY_PLACEHOLDER, &body_slice);
    // The scaffold alone can exceed the budget; the cap keeps the final
    // length invariant regardless.
    let (prompt, capped) = cap_chars(prompt, budget);

    GenerationRequest {
        prompt,
        params,
        truncated: body_cut || capped,
    }
}

fn cap_chars(text: String, budget: usize) -> (String, bool) {
    if text.chars().count() <= budget {
        (text, false)
    } else {
        (text.chars().take(budget).collect(), true)
    }
}
